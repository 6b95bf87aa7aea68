//! Host scene service.
//!
//! The converter never touches a concrete scene graph directly. Everything it
//! needs from the host application (skeleton pose, skin bindings, blend-shape
//! stack) goes through [`SceneHost`], so the pipeline can run against any 3D
//! scene API that offers equivalent primitives.

pub mod memory;

#[cfg(test)]
pub(crate) mod fixtures;

use std::collections::HashMap;

use nalgebra::{Matrix4, Point3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryScene;

/// Identifies a skeleton (armature) object in the host scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkeletonId(pub usize);

/// Identifies a mesh object in the host scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeshId(pub usize);

/// Identifies one skin binding (armature deformer) on a mesh object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingId(pub u64);

/// Stable handle of a blend shape. Survives renames and reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeHandle(pub u64);

/// Snapshot of one joint as reported by the host.
#[derive(Debug, Clone)]
pub struct JointInfo {
    pub name: String,
    pub parent: Option<String>,
    /// World-space head position (pivot of the joint).
    pub head: Point3<f32>,
    /// Rest transform relative to the parent joint.
    pub rest_local: Matrix4<f32>,
    /// Transient pose transform applied on top of `rest_local`.
    pub pose_local: Matrix4<f32>,
    /// Posed world transform.
    pub world: Matrix4<f32>,
}

/// One entry of a mesh's blend-shape stack.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendShapeInfo {
    pub handle: ShapeHandle,
    pub name: String,
    pub weight: f32,
}

/// Which skeleton state geometry evaluation should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseState {
    /// Run every skin binding with the current pose.
    Posed,
    /// Shape mix only, no skinning.
    Rest,
}

/// Explicit per-shape weights used for one evaluation. Missing shapes count as zero.
pub type ShapeWeights = HashMap<ShapeHandle, f32>;

/// Failure reported by the host when a scene query or mutation is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("skeleton {0:?} does not exist")]
    SkeletonNotFound(SkeletonId),

    #[error("mesh {0:?} does not exist")]
    MeshNotFound(MeshId),

    #[error("joint '{0}' does not exist")]
    JointNotFound(String),

    #[error("skin binding {0:?} does not exist")]
    BindingNotFound(BindingId),

    #[error("blend shape {0:?} does not exist")]
    ShapeNotFound(ShapeHandle),

    #[error("blend shape name '{0}' is already in use")]
    NameConflict(String),

    #[error("geometry has {actual} vertices but the mesh has {expected}")]
    GeometryMismatch { expected: usize, actual: usize },

    #[error("{0}")]
    Rejected(String),
}

/// Scene operations the converter consumes from the host application.
///
/// Implementations are expected to re-evaluate dependent scene state
/// synchronously after each mutation.
pub trait SceneHost {
    fn skeleton_name(&self, skeleton: SkeletonId) -> Result<String, HostError>;

    /// Object-to-world transform of the skeleton object itself.
    fn skeleton_world_transform(&self, skeleton: SkeletonId) -> Result<Matrix4<f32>, HostError>;

    /// Joints in a stable enumeration order.
    fn enumerate_joints(&self, skeleton: SkeletonId) -> Result<Vec<JointInfo>, HostError>;

    fn world_transform(&self, skeleton: SkeletonId, joint: &str)
    -> Result<Matrix4<f32>, HostError>;

    /// Replaces the joint's pose transform (relative to its rest transform).
    fn set_local_transform(
        &mut self,
        skeleton: SkeletonId,
        joint: &str,
        pose_local: Matrix4<f32>,
    ) -> Result<(), HostError>;

    /// Folds every pose transform into the rest transform and resets poses to identity.
    fn commit_pose_as_rest(&mut self, skeleton: SkeletonId) -> Result<(), HostError>;

    /// Meshes carrying at least one binding to `skeleton`, in discovery order.
    fn find_meshes_bound_to(&self, skeleton: SkeletonId) -> Result<Vec<MeshId>, HostError>;

    fn mesh_name(&self, mesh: MeshId) -> Result<String, HostError>;

    /// Number of mesh objects sharing this mesh's geometry data.
    fn mesh_data_users(&self, mesh: MeshId) -> Result<usize, HostError>;

    /// Gives `mesh` its own copy of the geometry data.
    fn make_mesh_data_single_user(&mut self, mesh: MeshId) -> Result<(), HostError>;

    fn find_binding(
        &self,
        mesh: MeshId,
        skeleton: SkeletonId,
    ) -> Result<Option<BindingId>, HostError>;

    fn duplicate_skin_binding(
        &mut self,
        mesh: MeshId,
        binding: BindingId,
    ) -> Result<BindingId, HostError>;

    /// Bakes the binding's current deformation into the base geometry and removes the binding.
    fn apply_binding_permanently(
        &mut self,
        mesh: MeshId,
        binding: BindingId,
    ) -> Result<(), HostError>;

    /// Blend-shape stack in order. Index 0 is the base shape.
    fn blend_shapes(&self, mesh: MeshId) -> Result<Vec<BlendShapeInfo>, HostError>;

    fn evaluate_deformed_geometry(
        &self,
        mesh: MeshId,
        pose: PoseState,
        weights: &ShapeWeights,
    ) -> Result<Vec<Point3<f32>>, HostError>;

    /// Appends a shape holding absolute vertex positions.
    fn add_blend_shape(
        &mut self,
        mesh: MeshId,
        name: &str,
        geometry: Vec<Point3<f32>>,
    ) -> Result<ShapeHandle, HostError>;

    fn remove_blend_shape(&mut self, mesh: MeshId, shape: ShapeHandle) -> Result<(), HostError>;

    fn rename_blend_shape(
        &mut self,
        mesh: MeshId,
        shape: ShapeHandle,
        name: &str,
    ) -> Result<(), HostError>;

    fn reorder_blend_shape(
        &mut self,
        mesh: MeshId,
        shape: ShapeHandle,
        position: usize,
    ) -> Result<(), HostError>;

    fn set_blend_shape_weight(
        &mut self,
        mesh: MeshId,
        shape: ShapeHandle,
        weight: f32,
    ) -> Result<(), HostError>;
}
