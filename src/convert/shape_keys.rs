use std::collections::HashMap;
use std::fmt;

use super::baking::fork_shared_data;
use super::types::{ConversionPhase, POSE_DELTA_SHAPE_NAME, REBUILD_TEMP_SHAPE_NAME};
use crate::error::ConvertError;
use crate::scene::{
    BlendShapeInfo, HostError, MeshId, PoseState, SceneHost, ShapeHandle, ShapeWeights, SkeletonId,
};
use crate::{log_debug, log_info};

/// Posed snapshot taken before the rest pose is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPose {
    pub mesh: MeshId,
    pub mesh_name: String,
    /// Handle of the snapshot shape appended to the stack.
    pub pose_delta: ShapeHandle,
    pub pose_delta_name: String,
    /// Shape weights as the user left them, by shape name.
    pub original_weights: Vec<(String, f32)>,
}

fn mesh_failure(mesh_name: &str, phase: ConversionPhase, reason: impl fmt::Display) -> ConvertError {
    ConvertError::PerMesh {
        mesh: mesh_name.to_string(),
        phase,
        reason: reason.to_string(),
    }
}

fn per_mesh(mesh_name: &str, phase: ConversionPhase) -> impl Fn(HostError) -> ConvertError + '_ {
    move |source| mesh_failure(mesh_name, phase, source)
}

/// Returns `base` if unused, otherwise the first free `base.001`, `base.002`, ...
pub fn unique_shape_name<'a>(existing: impl IntoIterator<Item = &'a str>, base: &str) -> String {
    let taken: Vec<&str> = existing.into_iter().collect();
    if !taken.contains(&base) {
        return base.to_string();
    }
    (1..)
        .map(|suffix| format!("{}.{:03}", base, suffix))
        .find(|candidate| !taken.contains(&candidate.as_str()))
        .unwrap_or_else(|| base.to_string())
}

/// Appends the mesh's current posed geometry as a new blend shape.
///
/// The snapshot uses the shape weights currently set on the mesh. It stays at
/// weight zero until the rest pose is committed, so the mesh looks the same
/// if the run stops early; [`rebuild_after_commit`] raises it to 1.0 before
/// anything is evaluated against it. Geometry shared with other objects is
/// forked first so each object gets its own stack.
///
/// # Errors
///
/// [`ConvertError::PerMesh`] when the mesh has no binding to `skeleton`, has
/// no blend shapes, or the host rejects the evaluation.
pub fn capture_pose_delta(
    host: &mut impl SceneHost,
    skeleton: SkeletonId,
    mesh: MeshId,
) -> Result<CapturedPose, ConvertError> {
    let phase = ConversionPhase::PreCommitCapture;
    let mesh_name = host
        .mesh_name(mesh)
        .map_err(|source| ConvertError::host("mesh_name", format!("{:?}", mesh), source))?;
    log_info!("Saving mesh '{}' as shape key...", mesh_name);

    if host
        .find_binding(mesh, skeleton)
        .map_err(per_mesh(&mesh_name, phase))?
        .is_none()
    {
        return Err(mesh_failure(&mesh_name, phase, "no skin binding to the skeleton"));
    }
    fork_shared_data(host, mesh, &mesh_name, phase)?;

    let shapes = host.blend_shapes(mesh).map_err(per_mesh(&mesh_name, phase))?;
    if shapes.is_empty() {
        return Err(mesh_failure(&mesh_name, phase, "mesh has no blend shapes"));
    }

    let weights: ShapeWeights = shapes
        .iter()
        .map(|shape| (shape.handle, shape.weight))
        .collect();
    let geometry = host
        .evaluate_deformed_geometry(mesh, PoseState::Posed, &weights)
        .map_err(per_mesh(&mesh_name, phase))?;

    let pose_delta_name = unique_shape_name(
        shapes.iter().map(|shape| shape.name.as_str()),
        POSE_DELTA_SHAPE_NAME,
    );
    let pose_delta = host
        .add_blend_shape(mesh, &pose_delta_name, geometry)
        .map_err(per_mesh(&mesh_name, phase))?;
    log_info!(
        "Saved current deformation as shape key '{}' for mesh '{}'",
        pose_delta_name,
        mesh_name
    );

    Ok(CapturedPose {
        mesh,
        mesh_name,
        pose_delta,
        pose_delta_name,
        original_weights: shapes
            .into_iter()
            .map(|shape| (shape.name, shape.weight))
            .collect(),
    })
}

/// Makes the captured snapshot the new base shape after the rest pose commit.
///
/// Every other shape keeps its name, position and delta; the snapshot takes
/// the old base's name and the user's weights are restored afterwards.
pub fn rebuild_after_commit(
    host: &mut impl SceneHost,
    captured: &CapturedPose,
) -> Result<(), ConvertError> {
    log_info!(
        "Processing shape keys after rest pose for mesh '{}'...",
        captured.mesh_name
    );
    rebase_onto(
        host,
        captured.mesh,
        &captured.mesh_name,
        captured.pose_delta,
        &captured.original_weights,
        ConversionPhase::PostCommitRebuild,
    )
}

/// Promotes an arbitrary shape to the base of the stack using the same rebuild.
///
/// The promoted shape takes the base's name; remaining shapes are re-expressed
/// against it.
pub fn promote_shape_to_base(
    host: &mut impl SceneHost,
    mesh: MeshId,
    shape_name: &str,
) -> Result<(), ConvertError> {
    let phase = ConversionPhase::PostCommitRebuild;
    let mesh_name = host
        .mesh_name(mesh)
        .map_err(|source| ConvertError::host("mesh_name", format!("{:?}", mesh), source))?;
    let shapes = host.blend_shapes(mesh).map_err(per_mesh(&mesh_name, phase))?;
    let target = shapes
        .iter()
        .find(|shape| shape.name == shape_name)
        .map(|shape| shape.handle)
        .ok_or_else(|| {
            mesh_failure(
                &mesh_name,
                phase,
                format!("could not find shape key '{}'", shape_name),
            )
        })?;
    let weights: Vec<(String, f32)> = shapes
        .into_iter()
        .map(|shape| (shape.name, shape.weight))
        .collect();

    rebase_onto(host, mesh, &mesh_name, target, &weights, phase)
}

fn rebase_onto(
    host: &mut impl SceneHost,
    mesh: MeshId,
    mesh_name: &str,
    new_base: ShapeHandle,
    restore: &[(String, f32)],
    phase: ConversionPhase,
) -> Result<(), ConvertError> {
    let fail = per_mesh(mesh_name, phase);

    let shapes = host.blend_shapes(mesh).map_err(&fail)?;
    let Some(base) = shapes.first().cloned() else {
        return Err(mesh_failure(mesh_name, phase, "no shape keys found"));
    };
    if base.handle == new_base {
        log_debug!("Shape is already the base of mesh '{}'", mesh_name);
        return Ok(());
    }
    if !shapes.iter().any(|shape| shape.handle == new_base) {
        return Err(mesh_failure(mesh_name, phase, HostError::ShapeNotFound(new_base)));
    }

    host.set_blend_shape_weight(mesh, new_base, 1.0).map_err(&fail)?;

    let others: Vec<BlendShapeInfo> = shapes
        .iter()
        .filter(|shape| shape.handle != base.handle && shape.handle != new_base)
        .cloned()
        .collect();
    log_info!(
        "Found {} shape keys to process in mesh '{}'",
        others.len(),
        mesh_name
    );

    for shape in others {
        log_debug!("Processing shape key: {} in mesh '{}'", shape.name, mesh_name);
        // Only the new base and this shape contribute to the mix.
        let weights: ShapeWeights = HashMap::from([(new_base, 1.0), (shape.handle, 1.0)]);
        let mixed = host
            .evaluate_deformed_geometry(mesh, PoseState::Rest, &weights)
            .map_err(&fail)?;

        let current = host.blend_shapes(mesh).map_err(&fail)?;
        let position = current
            .iter()
            .position(|entry| entry.handle == shape.handle)
            .ok_or_else(|| fail(HostError::ShapeNotFound(shape.handle)))?;
        let temp_name = unique_shape_name(
            current.iter().map(|entry| entry.name.as_str()),
            REBUILD_TEMP_SHAPE_NAME,
        );

        let temp = host.add_blend_shape(mesh, &temp_name, mixed).map_err(&fail)?;
        host.remove_blend_shape(mesh, shape.handle).map_err(&fail)?;
        host.rename_blend_shape(mesh, temp, &shape.name).map_err(&fail)?;
        host.reorder_blend_shape(mesh, temp, position).map_err(&fail)?;
        host.set_blend_shape_weight(mesh, temp, shape.weight).map_err(&fail)?;
    }

    for shape in host.blend_shapes(mesh).map_err(&fail)? {
        host.set_blend_shape_weight(mesh, shape.handle, 0.0).map_err(&fail)?;
    }
    host.set_blend_shape_weight(mesh, new_base, 1.0).map_err(&fail)?;
    host.reorder_blend_shape(mesh, new_base, 0).map_err(&fail)?;
    host.remove_blend_shape(mesh, base.handle).map_err(&fail)?;
    host.rename_blend_shape(mesh, new_base, &base.name).map_err(&fail)?;
    log_info!("Renamed new base to {} for mesh '{}'", base.name, mesh_name);

    for shape in host.blend_shapes(mesh).map_err(&fail)? {
        let weight = restore
            .iter()
            .find(|(name, _)| *name == shape.name)
            .map(|(_, weight)| *weight)
            .unwrap_or(0.0);
        host.set_blend_shape_weight(mesh, shape.handle, weight).map_err(&fail)?;
    }

    Ok(())
}
