use nalgebra::Matrix4;

use super::types::{ConversionPhase, ConvertOptions, RoleMapping, RotatedJoint};
use crate::correction::{RotationAxis, rotate_about_head, world_to_pose_local};
use crate::error::ConvertError;
use crate::scene::{SceneHost, SkeletonId};
use crate::{log_debug, log_info};

// ─── Phase tracking ───────────────────────────────────────────────────────────

/// Enforces the conversion state machine. Every phase change goes through
/// [`PhaseTracker::advance`], so committing twice or before capture fails.
#[derive(Debug, Clone, Copy)]
pub struct PhaseTracker {
    current: ConversionPhase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            current: ConversionPhase::Idle,
        }
    }
}

impl PhaseTracker {
    pub fn current(&self) -> ConversionPhase {
        self.current
    }

    pub fn advance(&mut self, next: ConversionPhase) -> Result<(), ConvertError> {
        if !self.current.can_advance_to(next) {
            return Err(ConvertError::OrderingViolation {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        Ok(())
    }
}

// ─── Global axis rotation ─────────────────────────────────────────────────────

/// Rotates one joint about a world axis through its head.
///
/// Only the joint's own pose transform is written; children keep their local
/// transforms and follow through the hierarchy.
///
/// # Errors
///
/// Fails when the joint does not exist or its parent/rest chain is singular.
pub fn rotate_joint_about_global_axis(
    host: &mut impl SceneHost,
    skeleton: SkeletonId,
    joint: &str,
    angle_deg: f32,
    axis: RotationAxis,
) -> Result<(), ConvertError> {
    let joints = host
        .enumerate_joints(skeleton)
        .map_err(|source| ConvertError::host("enumerate_joints", joint, source))?;
    let info = joints
        .iter()
        .find(|entry| entry.name == joint)
        .ok_or_else(|| {
            ConvertError::host(
                "rotate_joint",
                joint,
                crate::scene::HostError::JointNotFound(joint.to_string()),
            )
        })?;

    let parent_world: Matrix4<f32> = match &info.parent {
        Some(parent) => host
            .world_transform(skeleton, parent)
            .map_err(|source| ConvertError::host("world_transform", parent.as_str(), source))?,
        None => host
            .skeleton_world_transform(skeleton)
            .map_err(|source| ConvertError::host("skeleton_world_transform", joint, source))?,
    };

    let new_world = rotate_about_head(info.world, info.head, axis, angle_deg);
    let pose_local = world_to_pose_local(parent_world, info.rest_local, new_world).ok_or_else(
        || ConvertError::NonInvertibleTransform {
            joint: joint.to_string(),
        },
    )?;

    log_debug!("  Original matrix of {}: {}", joint, info.world);
    host.set_local_transform(skeleton, joint, pose_local)
        .map_err(|source| ConvertError::host("set_local_transform", joint, source))?;
    log_info!(
        "Rotated joint {} by {} degrees around global {:?} axis",
        joint,
        angle_deg,
        axis
    );
    log_debug!("  New matrix of {}: {}", joint, new_world);
    Ok(())
}

/// Joint rotations for one run, in application order.
pub fn plan_rotations(mapping: &RoleMapping, options: &ConvertOptions) -> Vec<RotatedJoint> {
    mapping
        .resolved()
        .map(|(role, joint)| RotatedJoint {
            role,
            joint: joint.to_string(),
            angle_deg: options.signed_angle_for(role),
        })
        .collect()
}

// ─── Rest pose commit ─────────────────────────────────────────────────────────

/// Folds the current pose into the rest pose.
///
/// Must run exactly once per conversion, after every mesh has captured its
/// posed shape; the tracker rejects any other ordering.
pub fn commit_rest_pose(
    host: &mut impl SceneHost,
    skeleton: SkeletonId,
    tracker: &mut PhaseTracker,
) -> Result<(), ConvertError> {
    tracker.advance(ConversionPhase::Committing)?;
    host.commit_pose_as_rest(skeleton).map_err(|source| {
        let name = host
            .skeleton_name(skeleton)
            .unwrap_or_else(|_| format!("{:?}", skeleton));
        ConvertError::host("commit_pose_as_rest", name, source)
    })?;
    log_info!("Applied current pose as rest pose");
    Ok(())
}
