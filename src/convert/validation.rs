use std::collections::HashSet;

use super::types::{ConvertOptions, JointRole, RoleMapping};
use crate::error::{ConvertError, ValidationError};
use crate::scene::{MeshId, SceneHost, SkeletonId};

/// Transient state of one conversion run. Built by validation, dropped at the end.
#[derive(Debug, Clone)]
pub struct ConversionSession {
    pub skeleton: SkeletonId,
    pub skeleton_name: String,
    /// `None` for a rest-pose commit without rotation.
    pub options: Option<ConvertOptions>,
    /// Only roles that name a joint present in the skeleton.
    pub mapping: RoleMapping,
    /// Entries dropped because the joint does not exist.
    pub unknown_joints: Vec<(JointRole, String)>,
    pub meshes: Vec<MeshId>,
}

/// Splits a user mapping into entries that exist in the skeleton and ones that do not.
pub(super) fn filter_mapping(
    mapping: &RoleMapping,
    joint_names: &HashSet<String>,
) -> (RoleMapping, Vec<(JointRole, String)>) {
    let mut valid = RoleMapping::default();
    let mut unknown = Vec::new();
    for (role, joint) in mapping.resolved() {
        if joint_names.contains(joint) {
            valid.set(role, joint);
        } else {
            unknown.push((role, joint.to_string()));
        }
    }
    (valid, unknown)
}

/// Checks every precondition before anything in the scene is mutated.
///
/// `rotation` is `None` for a plain rest-pose commit, which does not need resolved joints.
pub(super) fn validate_session(
    host: &impl SceneHost,
    skeleton: SkeletonId,
    rotation: Option<(&RoleMapping, ConvertOptions)>,
) -> Result<ConversionSession, ConvertError> {
    let skeleton_name = host
        .skeleton_name(skeleton)
        .map_err(|_| ValidationError::NoSkeleton)?;

    let meshes = host
        .find_meshes_bound_to(skeleton)
        .map_err(|source| ConvertError::host("find_meshes_bound_to", &skeleton_name, source))?;
    let mut seen = HashSet::new();
    let meshes: Vec<MeshId> = meshes.into_iter().filter(|mesh| seen.insert(*mesh)).collect();
    if meshes.is_empty() {
        return Err(ValidationError::NoBoundMeshes {
            skeleton: skeleton_name,
        }
        .into());
    }

    let (options, mapping, unknown_joints) = match rotation {
        Some((mapping, options)) => {
            let joint_names: HashSet<String> = host
                .enumerate_joints(skeleton)
                .map_err(|source| ConvertError::host("enumerate_joints", &skeleton_name, source))?
                .into_iter()
                .map(|joint| joint.name)
                .collect();
            let (valid, unknown) = filter_mapping(mapping, &joint_names);
            if valid.resolved_count() == 0 {
                return Err(ValidationError::NoResolvedJoints {
                    skeleton: skeleton_name,
                }
                .into());
            }
            (Some(options), valid, unknown)
        }
        None => (None, RoleMapping::default(), Vec::new()),
    };

    Ok(ConversionSession {
        skeleton,
        skeleton_name,
        options,
        mapping,
        unknown_joints,
        meshes,
    })
}
