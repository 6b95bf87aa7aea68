mod baking;
mod bones;
mod lock;
mod shape_keys;
mod skeleton;
mod types;
mod validation;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ConvertError, ValidationError};
use crate::logging::send_event;
use crate::scene::{MeshId, SceneHost, SkeletonId};
use crate::{log_info, log_warn};

// Re-export public types for callers of this module.
pub use baking::{BakedMesh, bake_pose_into_mesh, finalize_baked_mesh};
pub use bones::{DetectionReport, detect_bones, find_joint_by_keywords, locate_roles};
pub use lock::{SkeletonGuard, SkeletonLocks};
pub use shape_keys::{
    CapturedPose, capture_pose_delta, promote_shape_to_base, rebuild_after_commit,
    unique_shape_name,
};
pub use skeleton::{PhaseTracker, commit_rest_pose, plan_rotations, rotate_joint_about_global_axis};
pub use types::{
    BoundMeshSummary, ConversionDirection, ConversionEvent, ConversionPhase, ConversionReport,
    ConvertOptions, DEFAULT_SHOULDER_ANGLE_DEG, DEFAULT_UPPER_ARM_ANGLE_DEG, EventOutcome,
    JointKind, JointRole, MAX_ANGLE_DEG, MIN_ANGLE_DEG, MeshKind, MeshOutcome,
    POSE_DELTA_SHAPE_NAME, REBUILD_TEMP_SHAPE_NAME, RoleMapping, RotatedJoint, Side,
    SkeletonSummary,
};
pub use validation::ConversionSession;

use validation::validate_session;

// ─── Public API ───────────────────────────────────────────────────────────────

/// Describes a skeleton and the meshes a conversion would touch. Read-only.
pub fn inspect_skeleton(
    host: &impl SceneHost,
    skeleton: SkeletonId,
) -> Result<SkeletonSummary, ConvertError> {
    let skeleton_name = host
        .skeleton_name(skeleton)
        .map_err(|_| ValidationError::NoSkeleton)?;
    let joint_count = host
        .enumerate_joints(skeleton)
        .map_err(|source| ConvertError::host("enumerate_joints", &skeleton_name, source))?
        .len();

    let mut seen = HashSet::new();
    let mut meshes = Vec::new();
    for mesh in host
        .find_meshes_bound_to(skeleton)
        .map_err(|source| ConvertError::host("find_meshes_bound_to", &skeleton_name, source))?
    {
        if !seen.insert(mesh) {
            continue;
        }
        let name = host
            .mesh_name(mesh)
            .map_err(|source| ConvertError::host("mesh_name", format!("{:?}", mesh), source))?;
        let shape_key_count = host
            .blend_shapes(mesh)
            .map_err(|source| ConvertError::host("blend_shapes", &name, source))?
            .len();
        meshes.push(BoundMeshSummary {
            name,
            has_shape_keys: shape_key_count > 0,
            shape_key_count,
        });
    }

    Ok(SkeletonSummary {
        skeleton_name,
        joint_count,
        meshes,
    })
}

/// Runs pose conversions against a host scene.
///
/// Each run validates first, then rotates, captures every mesh, commits the
/// rest pose exactly once and rebuilds. A mesh that fails is reported and
/// skipped; the rest of the batch carries on.
pub struct PoseConverter<'h, H: SceneHost> {
    host: &'h mut H,
    locks: SkeletonLocks,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'h, H: SceneHost> PoseConverter<'h, H> {
    pub fn new(host: &'h mut H, locks: &SkeletonLocks) -> Self {
        Self {
            host,
            locks: locks.clone(),
            cancel: None,
        }
    }

    /// The flag is checked once the joints are rotated and before any mesh is touched.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Rotates the mapped joints and bakes the result into a new rest pose.
    ///
    /// # Errors
    ///
    /// Validation errors and [`ConvertError::SkeletonBusy`] leave the scene
    /// untouched. Per-mesh failures do not error; they show up in the report.
    pub fn convert_pose(
        &mut self,
        skeleton: SkeletonId,
        mapping: &RoleMapping,
        options: ConvertOptions,
    ) -> Result<ConversionReport, ConvertError> {
        log_info!("Starting pose conversion...");
        self.run(skeleton, Some((mapping, options)))
    }

    /// Commits the current pose as the rest pose without rotating anything.
    pub fn set_rest_pose(&mut self, skeleton: SkeletonId) -> Result<ConversionReport, ConvertError> {
        log_info!("Starting set rest pose operation...");
        self.run(skeleton, None)
    }

    // ─── Private orchestration ────────────────────────────────────────────────

    fn run(
        &mut self,
        skeleton: SkeletonId,
        rotation: Option<(&RoleMapping, ConvertOptions)>,
    ) -> Result<ConversionReport, ConvertError> {
        let mut run = RunState::default();
        run.advance(ConversionPhase::Validating)?;

        let prepared = validate_session(&*self.host, skeleton, rotation).and_then(|session| {
            let guard = self.locks.try_acquire(skeleton, &session.skeleton_name)?;
            Ok((session, guard))
        });
        let (session, _guard) = match prepared {
            Ok(prepared) => prepared,
            Err(error) => {
                run.advance(ConversionPhase::Failed)?;
                run.emit(
                    ConversionPhase::Validating,
                    None,
                    EventOutcome::Failed,
                    error.to_string(),
                );
                return Err(error);
            }
        };
        for (role, joint) in &session.unknown_joints {
            run.emit(
                ConversionPhase::Validating,
                Some(joint.as_str()),
                EventOutcome::Warning,
                format!("joint for {} not found in skeleton, skipped", role),
            );
        }
        log_info!(
            "Processing {} related meshes on '{}'",
            session.meshes.len(),
            session.skeleton_name
        );

        run.advance(ConversionPhase::Rotating)?;
        let rotated_joints = match session.options {
            Some(options) => {
                log_info!("Conversion mode: {}", options.direction);
                let plan = plan_rotations(&session.mapping, &options);
                for entry in &plan {
                    if let Err(error) = rotate_joint_about_global_axis(
                        &mut *self.host,
                        skeleton,
                        &entry.joint,
                        entry.angle_deg,
                        options.axis,
                    ) {
                        run.emit(
                            ConversionPhase::Rotating,
                            Some(entry.joint.as_str()),
                            EventOutcome::Failed,
                            error.to_string(),
                        );
                        return Err(error);
                    }
                    run.emit(
                        ConversionPhase::Rotating,
                        Some(entry.joint.as_str()),
                        EventOutcome::Succeeded,
                        format!("rotated {} degrees", entry.angle_deg),
                    );
                }
                plan
            }
            None => Vec::new(),
        };

        if self.cancel_requested() {
            run.advance(ConversionPhase::Cancelled)?;
            let message = format!(
                "Conversion cancelled after rotating {} joints. The pose was not committed; running the conversion again will apply the rotation a second time.",
                rotated_joints.len()
            );
            log_warn!("{}", message);
            return Ok(ConversionReport {
                skeleton_name: session.skeleton_name,
                options: session.options,
                rotated_joints,
                processed: 0,
                total: session.meshes.len(),
                cancelled: true,
                meshes: Vec::new(),
                events: run.events,
                message,
            });
        }

        let meshes = self.convert_meshes(&mut run, &session)?;
        let total = meshes.len();
        let processed = meshes.iter().filter(|outcome| outcome.succeeded()).count();
        let message = summary_message(session.options.as_ref(), processed, total);
        run.advance(ConversionPhase::Done)?;
        if processed < total {
            log_warn!("{}", message);
        } else {
            log_info!("{}", message);
        }

        Ok(ConversionReport {
            skeleton_name: session.skeleton_name,
            options: session.options,
            rotated_joints,
            processed,
            total,
            cancelled: false,
            meshes,
            events: run.events,
            message,
        })
    }

    /// Capture every mesh, commit once, then rebuild what was captured.
    fn convert_meshes(
        &mut self,
        run: &mut RunState,
        session: &ConversionSession,
    ) -> Result<Vec<MeshOutcome>, ConvertError> {
        let skeleton = session.skeleton;
        run.advance(ConversionPhase::PreCommitCapture)?;

        let mut outcomes = Vec::with_capacity(session.meshes.len());
        let mut captured: Vec<(usize, CapturedPose)> = Vec::new();
        let mut baked: Vec<(usize, BakedMesh)> = Vec::new();

        for (index, mesh) in session.meshes.iter().copied().enumerate() {
            let (mesh_name, kind) = match self.classify(mesh) {
                Ok(classified) => classified,
                Err(error) => {
                    let mesh_name = format!("{:?}", mesh);
                    run.mesh_failed(ConversionPhase::PreCommitCapture, &mesh_name, &error);
                    outcomes.push(MeshOutcome {
                        mesh_name,
                        kind: MeshKind::WithoutShapeKeys,
                        error: Some(error.to_string()),
                    });
                    continue;
                }
            };

            let result = match kind {
                MeshKind::WithShapeKeys => capture_pose_delta(&mut *self.host, skeleton, mesh)
                    .map(|pose| captured.push((index, pose))),
                MeshKind::WithoutShapeKeys => bake_pose_into_mesh(&mut *self.host, skeleton, mesh)
                    .map(|mesh| baked.push((index, mesh))),
            };
            let error = match result {
                Ok(()) => {
                    run.emit(
                        ConversionPhase::PreCommitCapture,
                        Some(mesh_name.as_str()),
                        EventOutcome::Succeeded,
                        match kind {
                            MeshKind::WithShapeKeys => "captured posed shape",
                            MeshKind::WithoutShapeKeys => "baked pose into geometry",
                        },
                    );
                    None
                }
                Err(error) => {
                    run.mesh_failed(ConversionPhase::PreCommitCapture, &mesh_name, &error);
                    Some(error.to_string())
                }
            };
            outcomes.push(MeshOutcome {
                mesh_name,
                kind,
                error,
            });
        }

        log_info!("All meshes pre-processed, applying current pose as rest pose...");
        run.emit(
            ConversionPhase::Committing,
            None,
            EventOutcome::Started,
            "applying current pose as rest pose",
        );
        if let Err(error) = commit_rest_pose(&mut *self.host, skeleton, &mut run.tracker) {
            run.emit(
                ConversionPhase::Committing,
                None,
                EventOutcome::Failed,
                error.to_string(),
            );
            return Err(error);
        }

        run.advance(ConversionPhase::PostCommitRebuild)?;
        for (index, pose) in &captured {
            let result = rebuild_after_commit(&mut *self.host, pose);
            run.record_rebuild(&mut outcomes[*index], result, "rebuilt shape keys");
        }
        for (index, mesh) in &baked {
            let result = finalize_baked_mesh(&*self.host, skeleton, mesh);
            run.record_rebuild(&mut outcomes[*index], result, "binding verified");
        }

        Ok(outcomes)
    }

    fn classify(&self, mesh: MeshId) -> Result<(String, MeshKind), ConvertError> {
        let name = self
            .host
            .mesh_name(mesh)
            .map_err(|source| ConvertError::host("mesh_name", format!("{:?}", mesh), source))?;
        let shapes = self
            .host
            .blend_shapes(mesh)
            .map_err(|source| ConvertError::host("blend_shapes", &name, source))?;
        let kind = if shapes.is_empty() {
            MeshKind::WithoutShapeKeys
        } else {
            MeshKind::WithShapeKeys
        };
        Ok((name, kind))
    }

    fn cancel_requested(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

fn summary_message(options: Option<&ConvertOptions>, processed: usize, total: usize) -> String {
    match (options, processed < total) {
        (Some(_), true) => format!(
            "Pose conversion completed with issues: {}/{} meshes processed successfully.",
            processed, total
        ),
        (Some(options), false) => format!(
            "Pose conversion ({}) completed: All {} meshes processed successfully.",
            options.direction, total
        ),
        (None, true) => format!(
            "Rest pose set with issues: {}/{} meshes processed successfully.",
            processed, total
        ),
        (None, false) => format!("Rest pose set: All {} meshes updated successfully.", total),
    }
}

/// Phase tracking and the event stream of one run.
#[derive(Default)]
struct RunState {
    tracker: PhaseTracker,
    events: Vec<ConversionEvent>,
}

impl RunState {
    fn emit(
        &mut self,
        phase: ConversionPhase,
        target: Option<&str>,
        outcome: EventOutcome,
        message: impl Into<String>,
    ) {
        let event = ConversionEvent {
            phase,
            target: target.map(str::to_string),
            outcome,
            message: message.into(),
        };
        send_event(&event);
        self.events.push(event);
    }

    fn advance(&mut self, phase: ConversionPhase) -> Result<(), ConvertError> {
        self.tracker.advance(phase)?;
        let outcome = match phase {
            ConversionPhase::Done => EventOutcome::Succeeded,
            ConversionPhase::Cancelled => EventOutcome::Warning,
            ConversionPhase::Failed => EventOutcome::Failed,
            _ => EventOutcome::Started,
        };
        self.emit(phase, None, outcome, format!("entered {}", phase));
        Ok(())
    }

    fn mesh_failed(&mut self, phase: ConversionPhase, mesh_name: &str, error: &ConvertError) {
        log_warn!("Failed to process mesh '{}': {}", mesh_name, error);
        self.emit(phase, Some(mesh_name), EventOutcome::Failed, error.to_string());
    }

    fn record_rebuild(
        &mut self,
        outcome: &mut MeshOutcome,
        result: Result<(), ConvertError>,
        success_message: &str,
    ) {
        match result {
            Ok(()) => self.emit(
                ConversionPhase::PostCommitRebuild,
                Some(outcome.mesh_name.as_str()),
                EventOutcome::Succeeded,
                success_message,
            ),
            Err(error) => {
                self.mesh_failed(ConversionPhase::PostCommitRebuild, &outcome.mesh_name, &error);
                outcome.error = Some(error.to_string());
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::RotationAxis;
    use crate::scene::fixtures::{BODY_VERTICES, add_body, add_face, max_distance, rig_scene};
    use crate::scene::{
        BindingId, BlendShapeInfo, HostError, JointInfo, MemoryScene, PoseState, ShapeHandle,
        ShapeWeights,
    };
    use nalgebra::{Matrix4, Point3, Vector3};
    use pretty_assertions::assert_eq;

    fn rig_mapping() -> RoleMapping {
        RoleMapping {
            shoulder_l: "shoulder.l".to_string(),
            shoulder_r: "shoulder.r".to_string(),
            upperarm_l: "upperarm.l".to_string(),
            upperarm_r: "upperarm.r".to_string(),
        }
    }

    fn t_to_a() -> ConvertOptions {
        ConvertOptions {
            direction: ConversionDirection::TToA,
            ..ConvertOptions::default()
        }
    }

    fn body_vertices(scene: &MemoryScene, body: MeshId) -> Vec<Point3<f32>> {
        scene.data_of(body).expect("body data").vertices.clone()
    }

    fn original_body() -> Vec<Point3<f32>> {
        BODY_VERTICES
            .iter()
            .map(|[x, y, z]| Point3::new(*x, *y, *z))
            .collect()
    }

    /// Delegates to a [`MemoryScene`] but refuses to bake one named mesh.
    struct FailingHost {
        inner: MemoryScene,
        refuse_apply_on: String,
    }

    impl SceneHost for FailingHost {
        fn skeleton_name(&self, skeleton: SkeletonId) -> Result<String, HostError> {
            self.inner.skeleton_name(skeleton)
        }

        fn skeleton_world_transform(
            &self,
            skeleton: SkeletonId,
        ) -> Result<Matrix4<f32>, HostError> {
            self.inner.skeleton_world_transform(skeleton)
        }

        fn enumerate_joints(&self, skeleton: SkeletonId) -> Result<Vec<JointInfo>, HostError> {
            self.inner.enumerate_joints(skeleton)
        }

        fn world_transform(
            &self,
            skeleton: SkeletonId,
            joint: &str,
        ) -> Result<Matrix4<f32>, HostError> {
            self.inner.world_transform(skeleton, joint)
        }

        fn set_local_transform(
            &mut self,
            skeleton: SkeletonId,
            joint: &str,
            pose_local: Matrix4<f32>,
        ) -> Result<(), HostError> {
            self.inner.set_local_transform(skeleton, joint, pose_local)
        }

        fn commit_pose_as_rest(&mut self, skeleton: SkeletonId) -> Result<(), HostError> {
            self.inner.commit_pose_as_rest(skeleton)
        }

        fn find_meshes_bound_to(&self, skeleton: SkeletonId) -> Result<Vec<MeshId>, HostError> {
            self.inner.find_meshes_bound_to(skeleton)
        }

        fn mesh_name(&self, mesh: MeshId) -> Result<String, HostError> {
            self.inner.mesh_name(mesh)
        }

        fn mesh_data_users(&self, mesh: MeshId) -> Result<usize, HostError> {
            self.inner.mesh_data_users(mesh)
        }

        fn make_mesh_data_single_user(&mut self, mesh: MeshId) -> Result<(), HostError> {
            self.inner.make_mesh_data_single_user(mesh)
        }

        fn find_binding(
            &self,
            mesh: MeshId,
            skeleton: SkeletonId,
        ) -> Result<Option<BindingId>, HostError> {
            self.inner.find_binding(mesh, skeleton)
        }

        fn duplicate_skin_binding(
            &mut self,
            mesh: MeshId,
            binding: BindingId,
        ) -> Result<BindingId, HostError> {
            self.inner.duplicate_skin_binding(mesh, binding)
        }

        fn apply_binding_permanently(
            &mut self,
            mesh: MeshId,
            binding: BindingId,
        ) -> Result<(), HostError> {
            if self.inner.mesh_name(mesh)? == self.refuse_apply_on {
                return Err(HostError::Rejected("modifier is disabled".to_string()));
            }
            self.inner.apply_binding_permanently(mesh, binding)
        }

        fn blend_shapes(&self, mesh: MeshId) -> Result<Vec<BlendShapeInfo>, HostError> {
            self.inner.blend_shapes(mesh)
        }

        fn evaluate_deformed_geometry(
            &self,
            mesh: MeshId,
            pose: PoseState,
            weights: &ShapeWeights,
        ) -> Result<Vec<Point3<f32>>, HostError> {
            self.inner.evaluate_deformed_geometry(mesh, pose, weights)
        }

        fn add_blend_shape(
            &mut self,
            mesh: MeshId,
            name: &str,
            geometry: Vec<Point3<f32>>,
        ) -> Result<ShapeHandle, HostError> {
            self.inner.add_blend_shape(mesh, name, geometry)
        }

        fn remove_blend_shape(&mut self, mesh: MeshId, shape: ShapeHandle) -> Result<(), HostError> {
            self.inner.remove_blend_shape(mesh, shape)
        }

        fn rename_blend_shape(
            &mut self,
            mesh: MeshId,
            shape: ShapeHandle,
            name: &str,
        ) -> Result<(), HostError> {
            self.inner.rename_blend_shape(mesh, shape, name)
        }

        fn reorder_blend_shape(
            &mut self,
            mesh: MeshId,
            shape: ShapeHandle,
            position: usize,
        ) -> Result<(), HostError> {
            self.inner.reorder_blend_shape(mesh, shape, position)
        }

        fn set_blend_shape_weight(
            &mut self,
            mesh: MeshId,
            shape: ShapeHandle,
            weight: f32,
        ) -> Result<(), HostError> {
            self.inner.set_blend_shape_weight(mesh, shape, weight)
        }
    }

    #[test]
    fn given_t_pose_body_when_converting_to_a_pose_then_arms_are_lowered_and_committed() {
        let (mut scene, skeleton) = rig_scene();
        let body = add_body(&mut scene, skeleton);
        let locks = SkeletonLocks::new();

        let report = PoseConverter::new(&mut scene, &locks)
            .convert_pose(skeleton, &rig_mapping(), t_to_a())
            .expect("convert");

        assert!(report.success());
        assert_eq!((report.processed, report.total), (1, 1));
        assert_eq!(report.rotated_joints.len(), 4);
        assert_eq!(
            report.message,
            "Pose conversion (T_TO_A) completed: All 1 meshes processed successfully."
        );

        let (sin, cos) = 30.0_f32.to_radians().sin_cos();
        let vertices = body_vertices(&scene, body);
        assert!((vertices[0] - Point3::new(0.0, 0.0, 1.0)).norm() < 1e-5);
        assert!((vertices[1] - Point3::new(0.25 + 0.25 * cos, 0.0, 1.5 - 0.25 * sin)).norm() < 1e-5);
        assert!((vertices[2] - Point3::new(-0.25 - 0.25 * cos, 0.0, 1.5 - 0.25 * sin)).norm() < 1e-5);
        for joint in ["shoulder.l", "upperarm.l", "shoulder.r", "upperarm.r"] {
            assert_eq!(scene.joint_pose_local(skeleton, joint), Some(Matrix4::identity()));
        }
        let evaluated = scene
            .evaluate_deformed_geometry(body, PoseState::Posed, &ShapeWeights::new())
            .expect("evaluate");
        assert!(max_distance(&evaluated, &vertices) < 1e-5);
    }

    #[test]
    fn given_converted_body_when_converting_back_then_original_geometry_returns() {
        let (mut scene, skeleton) = rig_scene();
        let body = add_body(&mut scene, skeleton);
        let locks = SkeletonLocks::new();
        let mut converter = PoseConverter::new(&mut scene, &locks);

        converter
            .convert_pose(skeleton, &rig_mapping(), t_to_a())
            .expect("to A");
        converter
            .convert_pose(skeleton, &rig_mapping(), ConvertOptions::default())
            .expect("back to T");

        assert!(max_distance(&body_vertices(&scene, body), &original_body()) < 1e-4);
    }

    #[test]
    fn given_face_with_expressions_when_converting_then_shapes_keep_names_and_deltas() {
        let (mut scene, skeleton) = rig_scene();
        add_body(&mut scene, skeleton);
        let face = add_face(&mut scene, skeleton);
        let locks = SkeletonLocks::new();

        let report = PoseConverter::new(&mut scene, &locks)
            .convert_pose(skeleton, &rig_mapping(), t_to_a())
            .expect("convert");

        assert_eq!((report.processed, report.total), (2, 2));
        let names: Vec<String> = scene
            .blend_shapes(face)
            .expect("shapes")
            .into_iter()
            .map(|shape| shape.name)
            .collect();
        assert_eq!(names, vec!["Basis", "Smile", "Blink"]);

        let base = scene.shape_positions(face, "Basis").expect("basis");
        let smile = scene.shape_positions(face, "Smile").expect("smile");
        let blink = scene.shape_positions(face, "Blink").expect("blink");
        assert!((smile[0] - base[0] - Vector3::new(0.0, 0.05, 0.01)).norm() < 1e-5);
        assert!((blink[1] - base[1] - Vector3::new(0.0, 0.0, -0.01)).norm() < 1e-5);
        assert!(base[2].z < 1.5 - 1e-3);
    }

    #[test]
    fn given_two_objects_sharing_face_data_when_converting_then_each_gets_its_own_rebuilt_stack() {
        let (mut scene, skeleton) = rig_scene();
        let face = add_face(&mut scene, skeleton);
        let shared = scene.mesh_object(face).expect("face").data;
        let twin = scene.add_mesh_object("FaceTwin", shared);
        scene.bind(twin, skeleton).expect("bind twin");
        let locks = SkeletonLocks::new();

        let report = PoseConverter::new(&mut scene, &locks)
            .convert_pose(skeleton, &rig_mapping(), t_to_a())
            .expect("convert");

        assert_eq!((report.processed, report.total), (2, 2));
        assert_ne!(
            scene.mesh_object(face).expect("face").data,
            scene.mesh_object(twin).expect("twin").data
        );
        for mesh in [face, twin] {
            let names: Vec<String> = scene
                .blend_shapes(mesh)
                .expect("shapes")
                .into_iter()
                .map(|shape| shape.name)
                .collect();
            assert_eq!(names, vec!["Basis", "Smile", "Blink"]);
            let base = scene.shape_positions(mesh, "Basis").expect("basis");
            assert!(base[2].z < 1.5 - 1e-3);
        }
    }

    #[test]
    fn given_empty_mapping_when_converting_then_validation_fails_and_scene_is_untouched() {
        let (mut scene, skeleton) = rig_scene();
        let face = add_face(&mut scene, skeleton);
        let locks = SkeletonLocks::new();

        let err = PoseConverter::new(&mut scene, &locks)
            .convert_pose(skeleton, &RoleMapping::default(), t_to_a())
            .expect_err("nothing to rotate");

        assert!(matches!(
            err,
            ConvertError::Validation(ValidationError::NoResolvedJoints { .. })
        ));
        assert_eq!(scene.blend_shapes(face).expect("shapes").len(), 3);
        assert_eq!(
            scene.joint_pose_local(skeleton, "upperarm.l"),
            Some(Matrix4::identity())
        );
        assert!(!locks.is_locked(skeleton));
    }

    #[test]
    fn given_locked_skeleton_when_converting_then_skeleton_busy_and_nothing_rotates() {
        let (mut scene, skeleton) = rig_scene();
        add_body(&mut scene, skeleton);
        let locks = SkeletonLocks::new();
        let _held = locks.try_acquire(skeleton, "Rig").expect("held");

        let err = PoseConverter::new(&mut scene, &locks)
            .convert_pose(skeleton, &rig_mapping(), t_to_a())
            .expect_err("busy");

        assert!(matches!(err, ConvertError::SkeletonBusy { .. }));
        assert_eq!(
            scene.joint_pose_local(skeleton, "upperarm.l"),
            Some(Matrix4::identity())
        );
    }

    #[test]
    fn given_cancel_flag_when_converting_then_rotation_is_left_uncommitted() {
        let (mut scene, skeleton) = rig_scene();
        let body = add_body(&mut scene, skeleton);
        let locks = SkeletonLocks::new();
        let rest_before = scene.joint_rest_local(skeleton, "upperarm.l");

        let report = PoseConverter::new(&mut scene, &locks)
            .with_cancel_flag(Arc::new(AtomicBool::new(true)))
            .convert_pose(skeleton, &rig_mapping(), t_to_a())
            .expect("cancelled report");

        assert!(report.cancelled);
        assert!(!report.success());
        assert!(report.message.contains("again"));
        assert_eq!(
            report.events.last().map(|event| event.phase),
            Some(ConversionPhase::Cancelled)
        );
        assert_eq!(scene.joint_rest_local(skeleton, "upperarm.l"), rest_before);
        assert_ne!(
            scene.joint_pose_local(skeleton, "upperarm.l"),
            Some(Matrix4::identity())
        );
        assert!(max_distance(&body_vertices(&scene, body), &original_body()) < 1e-6);
    }

    #[test]
    fn given_one_failing_mesh_when_converting_then_others_complete_and_report_counts() {
        let (mut scene, skeleton) = rig_scene();
        add_body(&mut scene, skeleton);
        add_face(&mut scene, skeleton);
        let mut host = FailingHost {
            inner: scene,
            refuse_apply_on: "Body".to_string(),
        };
        let locks = SkeletonLocks::new();

        let report = PoseConverter::new(&mut host, &locks)
            .convert_pose(skeleton, &rig_mapping(), t_to_a())
            .expect("partial success");

        assert!(!report.success());
        assert_eq!((report.processed, report.total), (1, 2));
        assert_eq!(
            report.message,
            "Pose conversion completed with issues: 1/2 meshes processed successfully."
        );
        let failed: Vec<&str> = report
            .meshes
            .iter()
            .filter(|outcome| !outcome.succeeded())
            .map(|outcome| outcome.mesh_name.as_str())
            .collect();
        assert_eq!(failed, vec!["Body"]);
        assert_eq!(
            host.inner.joint_pose_local(skeleton, "upperarm.l"),
            Some(Matrix4::identity())
        );
    }

    #[test]
    fn given_conversion_when_reading_events_then_commit_follows_every_capture() {
        let (mut scene, skeleton) = rig_scene();
        add_body(&mut scene, skeleton);
        add_face(&mut scene, skeleton);
        let locks = SkeletonLocks::new();

        let report = PoseConverter::new(&mut scene, &locks)
            .convert_pose(skeleton, &rig_mapping(), t_to_a())
            .expect("convert");

        let position_of = |phase: ConversionPhase| {
            report
                .events
                .iter()
                .rposition(|event| event.phase == phase)
                .expect("phase present")
        };
        let commit = report
            .events
            .iter()
            .position(|event| event.phase == ConversionPhase::Committing)
            .expect("commit event");
        assert!(position_of(ConversionPhase::PreCommitCapture) < commit);
        assert!(
            report
                .events
                .iter()
                .filter(|event| event.phase == ConversionPhase::Committing)
                .count()
                == 1
        );
        assert!(commit < position_of(ConversionPhase::PostCommitRebuild));
        assert_eq!(
            report.events.last().map(|event| event.phase),
            Some(ConversionPhase::Done)
        );
    }

    #[test]
    fn given_manual_pose_when_setting_rest_pose_then_pose_is_baked_without_rotation() {
        let (mut scene, skeleton) = rig_scene();
        let body = add_body(&mut scene, skeleton);
        rotate_joint_about_global_axis(&mut scene, skeleton, "shoulder.l", 15.0, RotationAxis::Y)
            .expect("manual pose");
        let posed = scene
            .evaluate_deformed_geometry(body, PoseState::Posed, &ShapeWeights::new())
            .expect("evaluate");
        let locks = SkeletonLocks::new();

        let report = PoseConverter::new(&mut scene, &locks)
            .set_rest_pose(skeleton)
            .expect("rest pose");

        assert!(report.rotated_joints.is_empty());
        assert_eq!(report.message, "Rest pose set: All 1 meshes updated successfully.");
        assert!(max_distance(&body_vertices(&scene, body), &posed) < 1e-5);
        assert_eq!(
            scene.joint_pose_local(skeleton, "shoulder.l"),
            Some(Matrix4::identity())
        );
    }

    #[test]
    fn given_bound_meshes_when_inspecting_then_shape_counts_are_listed() {
        let (mut scene, skeleton) = rig_scene();
        add_body(&mut scene, skeleton);
        add_face(&mut scene, skeleton);

        let summary = inspect_skeleton(&scene, skeleton).expect("inspect");

        assert_eq!(summary.skeleton_name, "Rig");
        assert_eq!(summary.joint_count, 5);
        let meshes: Vec<(&str, usize)> = summary
            .meshes
            .iter()
            .map(|mesh| (mesh.name.as_str(), mesh.shape_key_count))
            .collect();
        assert_eq!(meshes, vec![("Body", 0), ("Face", 3)]);
    }
}
