//! In-memory scene used by the command line tool and the tests.
//!
//! Skinning is plain linear blend skinning in world space. Blend shapes are
//! stored as absolute positions; shape `i` contributes
//! `weight_i * (positions_i - positions_0)` on top of the base shape.

use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

use super::{
    BindingId, BlendShapeInfo, HostError, JointInfo, MeshId, PoseState, SceneHost, ShapeHandle,
    ShapeWeights, SkeletonId,
};

fn identity() -> Matrix4<f32> {
    Matrix4::identity()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryJoint {
    pub name: String,
    pub parent: Option<usize>,
    pub rest_local: Matrix4<f32>,
    #[serde(default = "identity")]
    pub pose_local: Matrix4<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySkeleton {
    pub name: String,
    #[serde(default = "identity")]
    pub world: Matrix4<f32>,
    #[serde(default)]
    pub joints: Vec<MemoryJoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryShape {
    pub handle: ShapeHandle,
    pub name: String,
    pub positions: Vec<Point3<f32>>,
    #[serde(default)]
    pub weight: f32,
}

/// Geometry data block. May be shared by several mesh objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMeshData {
    pub name: String,
    pub vertices: Vec<Point3<f32>>,
    /// Per-vertex `(joint name, weight)` influences.
    #[serde(default)]
    pub skin_weights: Vec<Vec<(String, f32)>>,
    #[serde(default)]
    pub shapes: Vec<MemoryShape>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryBinding {
    pub id: BindingId,
    pub skeleton: SkeletonId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMeshObject {
    pub name: String,
    pub data: usize,
    #[serde(default)]
    pub bindings: Vec<MemoryBinding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryScene {
    #[serde(default)]
    pub skeletons: Vec<MemorySkeleton>,
    #[serde(default)]
    pub mesh_data: Vec<MemoryMeshData>,
    #[serde(default)]
    pub meshes: Vec<MemoryMeshObject>,
    #[serde(default)]
    next_id: u64,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Builders ─────────────────────────────────────────────────────────────

    pub fn add_skeleton(&mut self, name: &str, world: Matrix4<f32>) -> SkeletonId {
        self.skeletons.push(MemorySkeleton {
            name: name.to_string(),
            world,
            joints: Vec::new(),
        });
        SkeletonId(self.skeletons.len() - 1)
    }

    /// Adds a joint whose rest transform is `rest_local` relative to `parent`.
    pub fn add_joint(
        &mut self,
        skeleton: SkeletonId,
        name: &str,
        parent: Option<&str>,
        rest_local: Matrix4<f32>,
    ) -> Result<(), HostError> {
        let skel = self.skeleton_mut(skeleton)?;
        if skel.joints.iter().any(|joint| joint.name == name) {
            return Err(HostError::NameConflict(name.to_string()));
        }
        let parent = match parent {
            Some(parent_name) => Some(
                joint_index(skel, parent_name)
                    .ok_or_else(|| HostError::JointNotFound(parent_name.to_string()))?,
            ),
            None => None,
        };
        skel.joints.push(MemoryJoint {
            name: name.to_string(),
            parent,
            rest_local,
            pose_local: Matrix4::identity(),
        });
        Ok(())
    }

    /// Adds a geometry data block and returns its index.
    pub fn add_mesh_data(
        &mut self,
        name: &str,
        vertices: Vec<Point3<f32>>,
        skin_weights: Vec<Vec<(String, f32)>>,
    ) -> usize {
        self.mesh_data.push(MemoryMeshData {
            name: name.to_string(),
            vertices,
            skin_weights,
            shapes: Vec::new(),
        });
        self.mesh_data.len() - 1
    }

    /// Adds a mesh object that uses the data block at `data`.
    pub fn add_mesh_object(&mut self, name: &str, data: usize) -> MeshId {
        self.meshes.push(MemoryMeshObject {
            name: name.to_string(),
            data,
            bindings: Vec::new(),
        });
        MeshId(self.meshes.len() - 1)
    }

    /// Appends a skin binding to `skeleton` on the mesh's deformer stack.
    pub fn bind(&mut self, mesh: MeshId, skeleton: SkeletonId) -> Result<BindingId, HostError> {
        self.skeleton(skeleton)?;
        let id = BindingId(self.allocate_id());
        self.mesh_object_mut(mesh)?.bindings.push(MemoryBinding { id, skeleton });
        Ok(id)
    }

    // ─── Queries ──────────────────────────────────────────────────────────────

    pub fn find_skeleton(&self, name: &str) -> Option<SkeletonId> {
        self.skeletons
            .iter()
            .position(|skeleton| skeleton.name == name)
            .map(SkeletonId)
    }

    pub fn find_mesh(&self, name: &str) -> Option<MeshId> {
        self.meshes
            .iter()
            .position(|mesh| mesh.name == name)
            .map(MeshId)
    }

    pub fn skeleton(&self, skeleton: SkeletonId) -> Result<&MemorySkeleton, HostError> {
        self.skeletons
            .get(skeleton.0)
            .ok_or(HostError::SkeletonNotFound(skeleton))
    }

    pub fn mesh_object(&self, mesh: MeshId) -> Result<&MemoryMeshObject, HostError> {
        self.meshes.get(mesh.0).ok_or(HostError::MeshNotFound(mesh))
    }

    pub fn data_of(&self, mesh: MeshId) -> Result<&MemoryMeshData, HostError> {
        let object = self.mesh_object(mesh)?;
        self.mesh_data
            .get(object.data)
            .ok_or(HostError::MeshNotFound(mesh))
    }

    /// Positions of the named shape, if present.
    pub fn shape_positions(&self, mesh: MeshId, name: &str) -> Option<&[Point3<f32>]> {
        self.data_of(mesh)
            .ok()?
            .shapes
            .iter()
            .find(|shape| shape.name == name)
            .map(|shape| shape.positions.as_slice())
    }

    pub fn joint_pose_local(&self, skeleton: SkeletonId, joint: &str) -> Option<Matrix4<f32>> {
        let skel = self.skeleton(skeleton).ok()?;
        joint_index(skel, joint).map(|index| skel.joints[index].pose_local)
    }

    pub fn joint_rest_local(&self, skeleton: SkeletonId, joint: &str) -> Option<Matrix4<f32>> {
        let skel = self.skeleton(skeleton).ok()?;
        joint_index(skel, joint).map(|index| skel.joints[index].rest_local)
    }

    // ─── Internals ────────────────────────────────────────────────────────────

    /// Handles and binding ids share one counter. Loaded documents may omit it.
    fn allocate_id(&mut self) -> u64 {
        let used = self
            .mesh_data
            .iter()
            .flat_map(|data| data.shapes.iter().map(|shape| shape.handle.0))
            .chain(
                self.meshes
                    .iter()
                    .flat_map(|mesh| mesh.bindings.iter().map(|binding| binding.id.0)),
            )
            .max()
            .unwrap_or(0);
        self.next_id = self.next_id.max(used) + 1;
        self.next_id
    }

    fn skeleton_mut(&mut self, skeleton: SkeletonId) -> Result<&mut MemorySkeleton, HostError> {
        self.skeletons
            .get_mut(skeleton.0)
            .ok_or(HostError::SkeletonNotFound(skeleton))
    }

    fn mesh_object_mut(&mut self, mesh: MeshId) -> Result<&mut MemoryMeshObject, HostError> {
        self.meshes.get_mut(mesh.0).ok_or(HostError::MeshNotFound(mesh))
    }

    fn data_of_mut(&mut self, mesh: MeshId) -> Result<&mut MemoryMeshData, HostError> {
        let data = self.mesh_object(mesh)?.data;
        self.mesh_data
            .get_mut(data)
            .ok_or(HostError::MeshNotFound(mesh))
    }

    /// Deforms `positions` with one binding using linear blend skinning.
    fn skin(
        &self,
        data: &MemoryMeshData,
        binding: &MemoryBinding,
        positions: &[Point3<f32>],
    ) -> Result<Vec<Point3<f32>>, HostError> {
        let skel = self.skeleton(binding.skeleton)?;
        let world_inverse = skel.world.try_inverse().ok_or_else(|| {
            HostError::Rejected(format!("skeleton '{}' has a singular world matrix", skel.name))
        })?;

        let mut skin_matrices = Vec::with_capacity(skel.joints.len());
        for index in 0..skel.joints.len() {
            let rest = armature_matrix(skel, index, false);
            let posed = armature_matrix(skel, index, true);
            let rest_inverse = rest.try_inverse().ok_or_else(|| {
                HostError::Rejected(format!(
                    "joint '{}' has a singular rest matrix",
                    skel.joints[index].name
                ))
            })?;
            skin_matrices.push(skel.world * posed * rest_inverse * world_inverse);
        }

        let deformed = positions
            .iter()
            .enumerate()
            .map(|(vertex, position)| {
                let influences = data
                    .skin_weights
                    .get(vertex)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let resolved: Vec<(usize, f32)> = influences
                    .iter()
                    .filter(|(_, weight)| *weight > 0.0)
                    .filter_map(|(joint, weight)| {
                        joint_index(skel, joint).map(|index| (index, *weight))
                    })
                    .collect();
                let total: f32 = resolved.iter().map(|(_, weight)| weight).sum();
                if total <= f32::EPSILON {
                    return *position;
                }

                let blended = resolved
                    .iter()
                    .fold(Vector3::zeros(), |acc, (index, weight)| {
                        acc + skin_matrices[*index].transform_point(position).coords
                            * (*weight / total)
                    });
                Point3::from(blended)
            })
            .collect();

        Ok(deformed)
    }

    fn sync_base_vertices(data: &mut MemoryMeshData) {
        if let Some(base) = data.shapes.first() {
            data.vertices = base.positions.clone();
        }
    }

    fn shape_index(data: &MemoryMeshData, shape: ShapeHandle) -> Result<usize, HostError> {
        data.shapes
            .iter()
            .position(|entry| entry.handle == shape)
            .ok_or(HostError::ShapeNotFound(shape))
    }
}

fn joint_index(skeleton: &MemorySkeleton, name: &str) -> Option<usize> {
    skeleton.joints.iter().position(|joint| joint.name == name)
}

/// Armature-space matrix of a joint. `posed` includes every pose transform on the chain.
fn armature_matrix(skeleton: &MemorySkeleton, index: usize, posed: bool) -> Matrix4<f32> {
    let mut chain = Vec::new();
    let mut current = Some(index);
    while let Some(joint) = current {
        if chain.len() > skeleton.joints.len() {
            break;
        }
        chain.push(joint);
        current = skeleton.joints.get(joint).and_then(|entry| entry.parent);
    }

    chain
        .iter()
        .rev()
        .filter_map(|joint| skeleton.joints.get(*joint))
        .fold(Matrix4::identity(), |acc, joint| {
            if posed {
                acc * joint.rest_local * joint.pose_local
            } else {
                acc * joint.rest_local
            }
        })
}

impl SceneHost for MemoryScene {
    fn skeleton_name(&self, skeleton: SkeletonId) -> Result<String, HostError> {
        Ok(self.skeleton(skeleton)?.name.clone())
    }

    fn skeleton_world_transform(&self, skeleton: SkeletonId) -> Result<Matrix4<f32>, HostError> {
        Ok(self.skeleton(skeleton)?.world)
    }

    fn enumerate_joints(&self, skeleton: SkeletonId) -> Result<Vec<JointInfo>, HostError> {
        let skel = self.skeleton(skeleton)?;
        Ok(skel
            .joints
            .iter()
            .enumerate()
            .map(|(index, joint)| {
                let world = skel.world * armature_matrix(skel, index, true);
                JointInfo {
                    name: joint.name.clone(),
                    parent: joint
                        .parent
                        .and_then(|parent| skel.joints.get(parent))
                        .map(|parent| parent.name.clone()),
                    head: Point3::new(world[(0, 3)], world[(1, 3)], world[(2, 3)]),
                    rest_local: joint.rest_local,
                    pose_local: joint.pose_local,
                    world,
                }
            })
            .collect())
    }

    fn world_transform(
        &self,
        skeleton: SkeletonId,
        joint: &str,
    ) -> Result<Matrix4<f32>, HostError> {
        let skel = self.skeleton(skeleton)?;
        let index =
            joint_index(skel, joint).ok_or_else(|| HostError::JointNotFound(joint.to_string()))?;
        Ok(skel.world * armature_matrix(skel, index, true))
    }

    fn set_local_transform(
        &mut self,
        skeleton: SkeletonId,
        joint: &str,
        pose_local: Matrix4<f32>,
    ) -> Result<(), HostError> {
        let skel = self.skeleton_mut(skeleton)?;
        let index =
            joint_index(skel, joint).ok_or_else(|| HostError::JointNotFound(joint.to_string()))?;
        skel.joints[index].pose_local = pose_local;
        Ok(())
    }

    fn commit_pose_as_rest(&mut self, skeleton: SkeletonId) -> Result<(), HostError> {
        let skel = self.skeleton_mut(skeleton)?;
        for joint in &mut skel.joints {
            joint.rest_local *= joint.pose_local;
            joint.pose_local = Matrix4::identity();
        }
        Ok(())
    }

    fn find_meshes_bound_to(&self, skeleton: SkeletonId) -> Result<Vec<MeshId>, HostError> {
        self.skeleton(skeleton)?;
        Ok(self
            .meshes
            .iter()
            .enumerate()
            .filter(|(_, mesh)| {
                mesh.bindings
                    .iter()
                    .any(|binding| binding.skeleton == skeleton)
            })
            .map(|(index, _)| MeshId(index))
            .collect())
    }

    fn mesh_name(&self, mesh: MeshId) -> Result<String, HostError> {
        Ok(self.mesh_object(mesh)?.name.clone())
    }

    fn mesh_data_users(&self, mesh: MeshId) -> Result<usize, HostError> {
        let data = self.mesh_object(mesh)?.data;
        Ok(self.meshes.iter().filter(|object| object.data == data).count())
    }

    fn make_mesh_data_single_user(&mut self, mesh: MeshId) -> Result<(), HostError> {
        if self.mesh_data_users(mesh)? <= 1 {
            return Ok(());
        }
        let copy = self.data_of(mesh)?.clone();
        self.mesh_data.push(copy);
        let new_index = self.mesh_data.len() - 1;
        self.mesh_object_mut(mesh)?.data = new_index;
        Ok(())
    }

    fn find_binding(
        &self,
        mesh: MeshId,
        skeleton: SkeletonId,
    ) -> Result<Option<BindingId>, HostError> {
        Ok(self
            .mesh_object(mesh)?
            .bindings
            .iter()
            .find(|binding| binding.skeleton == skeleton)
            .map(|binding| binding.id))
    }

    fn duplicate_skin_binding(
        &mut self,
        mesh: MeshId,
        binding: BindingId,
    ) -> Result<BindingId, HostError> {
        let skeleton = self
            .mesh_object(mesh)?
            .bindings
            .iter()
            .find(|entry| entry.id == binding)
            .map(|entry| entry.skeleton)
            .ok_or(HostError::BindingNotFound(binding))?;
        let id = BindingId(self.allocate_id());
        self.mesh_object_mut(mesh)?
            .bindings
            .push(MemoryBinding { id, skeleton });
        Ok(id)
    }

    fn apply_binding_permanently(
        &mut self,
        mesh: MeshId,
        binding: BindingId,
    ) -> Result<(), HostError> {
        let object = self.mesh_object(mesh)?;
        let position = object
            .bindings
            .iter()
            .position(|entry| entry.id == binding)
            .ok_or(HostError::BindingNotFound(binding))?;
        let data = self.data_of(mesh)?;
        if !data.shapes.is_empty() {
            return Err(HostError::Rejected(format!(
                "cannot apply a skin binding to mesh '{}' because it has blend shapes",
                object.name
            )));
        }

        let baked = self.skin(data, &object.bindings[position], &data.vertices)?;
        self.data_of_mut(mesh)?.vertices = baked;
        self.mesh_object_mut(mesh)?.bindings.remove(position);
        Ok(())
    }

    fn blend_shapes(&self, mesh: MeshId) -> Result<Vec<BlendShapeInfo>, HostError> {
        Ok(self
            .data_of(mesh)?
            .shapes
            .iter()
            .map(|shape| BlendShapeInfo {
                handle: shape.handle,
                name: shape.name.clone(),
                weight: shape.weight,
            })
            .collect())
    }

    fn evaluate_deformed_geometry(
        &self,
        mesh: MeshId,
        pose: PoseState,
        weights: &ShapeWeights,
    ) -> Result<Vec<Point3<f32>>, HostError> {
        let object = self.mesh_object(mesh)?;
        let data = self.data_of(mesh)?;

        let mut mixed = match data.shapes.split_first() {
            Some((base, others)) => {
                let mut mixed = base.positions.clone();
                for shape in others {
                    let weight = weights.get(&shape.handle).copied().unwrap_or(0.0);
                    if weight == 0.0 {
                        continue;
                    }
                    for ((out, key), reference) in mixed
                        .iter_mut()
                        .zip(&shape.positions)
                        .zip(&base.positions)
                    {
                        *out += (key - reference) * weight;
                    }
                }
                mixed
            }
            None => data.vertices.clone(),
        };

        if pose == PoseState::Posed {
            for binding in &object.bindings {
                mixed = self.skin(data, binding, &mixed)?;
            }
        }

        Ok(mixed)
    }

    fn add_blend_shape(
        &mut self,
        mesh: MeshId,
        name: &str,
        geometry: Vec<Point3<f32>>,
    ) -> Result<ShapeHandle, HostError> {
        let data = self.data_of(mesh)?;
        if geometry.len() != data.vertices.len() {
            return Err(HostError::GeometryMismatch {
                expected: data.vertices.len(),
                actual: geometry.len(),
            });
        }
        if data.shapes.iter().any(|shape| shape.name == name) {
            return Err(HostError::NameConflict(name.to_string()));
        }

        let handle = ShapeHandle(self.allocate_id());
        let data = self.data_of_mut(mesh)?;
        data.shapes.push(MemoryShape {
            handle,
            name: name.to_string(),
            positions: geometry,
            weight: 0.0,
        });
        Self::sync_base_vertices(data);
        Ok(handle)
    }

    fn remove_blend_shape(&mut self, mesh: MeshId, shape: ShapeHandle) -> Result<(), HostError> {
        let data = self.data_of_mut(mesh)?;
        let index = Self::shape_index(data, shape)?;
        data.shapes.remove(index);
        Self::sync_base_vertices(data);
        Ok(())
    }

    fn rename_blend_shape(
        &mut self,
        mesh: MeshId,
        shape: ShapeHandle,
        name: &str,
    ) -> Result<(), HostError> {
        let data = self.data_of_mut(mesh)?;
        let index = Self::shape_index(data, shape)?;
        if data
            .shapes
            .iter()
            .any(|entry| entry.handle != shape && entry.name == name)
        {
            return Err(HostError::NameConflict(name.to_string()));
        }
        data.shapes[index].name = name.to_string();
        Ok(())
    }

    fn reorder_blend_shape(
        &mut self,
        mesh: MeshId,
        shape: ShapeHandle,
        position: usize,
    ) -> Result<(), HostError> {
        let data = self.data_of_mut(mesh)?;
        let index = Self::shape_index(data, shape)?;
        let entry = data.shapes.remove(index);
        let target = position.min(data.shapes.len());
        data.shapes.insert(target, entry);
        Self::sync_base_vertices(data);
        Ok(())
    }

    fn set_blend_shape_weight(
        &mut self,
        mesh: MeshId,
        shape: ShapeHandle,
        weight: f32,
    ) -> Result<(), HostError> {
        let data = self.data_of_mut(mesh)?;
        let index = Self::shape_index(data, shape)?;
        data.shapes[index].weight = weight.clamp(0.0, 1.0);
        Ok(())
    }
}
