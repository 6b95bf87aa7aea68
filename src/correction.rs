use nalgebra::{Matrix4, Point3, Rotation3, Translation3, Unit, Vector3};
use serde::{Deserialize, Serialize};

/// World axis used for arm rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationAxis {
    X,
    #[default]
    Y,
    Z,
}

impl RotationAxis {
    pub fn unit(self) -> Unit<Vector3<f32>> {
        match self {
            RotationAxis::X => Vector3::x_axis(),
            RotationAxis::Y => Vector3::y_axis(),
            RotationAxis::Z => Vector3::z_axis(),
        }
    }
}

/// Builds a rotation of `angle_deg` degrees around a world axis through the origin.
///
/// # Arguments
///
/// * `axis` - World axis to rotate around.
/// * `angle_deg` - Rotation angle in degrees.
///
/// # Returns
///
/// Homogeneous 4x4 rotation matrix.
pub fn global_axis_rotation(axis: RotationAxis, angle_deg: f32) -> Matrix4<f32> {
    Rotation3::from_axis_angle(&axis.unit(), angle_deg.to_radians()).to_homogeneous()
}

/// Rotates a world transform around a world axis, pivoting at `head`.
///
/// Computes `translate(head) * rotate * translate(-head) * world`, so the
/// joint keeps its head position and only its orientation turns about the
/// world-aligned axis.
///
/// # Arguments
///
/// * `world` - Current world transform of the joint.
/// * `head` - World-space pivot (the joint head).
/// * `axis` - World axis to rotate around.
/// * `angle_deg` - Rotation angle in degrees.
///
/// # Returns
///
/// The rotated world transform.
pub fn rotate_about_head(
    world: Matrix4<f32>,
    head: Point3<f32>,
    axis: RotationAxis,
    angle_deg: f32,
) -> Matrix4<f32> {
    let to_origin = Translation3::from(-head.coords).to_homogeneous();
    let back = Translation3::from(head.coords).to_homogeneous();
    back * global_axis_rotation(axis, angle_deg) * to_origin * world
}

/// Converts a desired world transform back into the joint's pose transform.
/// Returns `None` when the parent/rest chain is not invertible.
///
/// # Arguments
///
/// * `parent_world` - World transform of the parent joint (or of the skeleton object for roots).
/// * `rest_local` - Rest transform of the joint relative to its parent.
/// * `world` - Desired world transform.
///
/// # Returns
///
/// `Some(pose_local)` such that `parent_world * rest_local * pose_local == world`.
pub fn world_to_pose_local(
    parent_world: Matrix4<f32>,
    rest_local: Matrix4<f32>,
    world: Matrix4<f32>,
) -> Option<Matrix4<f32>> {
    (parent_world * rest_local)
        .try_inverse()
        .map(|inverse| inverse * world)
}

/// Largest absolute element-wise difference between two transforms.
pub fn max_abs_difference(a: &Matrix4<f32>, b: &Matrix4<f32>) -> f32 {
    (a - b).amax()
}
