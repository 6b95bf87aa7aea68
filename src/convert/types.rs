use std::fmt;

use serde::{Deserialize, Serialize};

use crate::correction::RotationAxis;

// ─── Keyword tables ───────────────────────────────────────────────────────────

/// Lower-case fragments identifying the left shoulder (clavicle) joint.
pub const SHOULDER_L_KEYWORDS: [&str; 11] = [
    "shoulder_l",
    "leftshoulder",
    "肩_l",
    "shoulder.l",
    "l_shoulder",
    "shoulderl",
    "clavicle_l",
    "clavicle.l",
    "肩.l",
    "肩l",
    "左肩",
];

/// Lower-case fragments identifying the right shoulder (clavicle) joint.
pub const SHOULDER_R_KEYWORDS: [&str; 11] = [
    "shoulder_r",
    "rightshoulder",
    "肩_r",
    "shoulder.r",
    "r_shoulder",
    "shoulderr",
    "clavicle_r",
    "clavicle.r",
    "肩.r",
    "肩r",
    "右肩",
];

/// Lower-case fragments identifying the left upper arm joint.
pub const UPPERARM_L_KEYWORDS: [&str; 13] = [
    "upperarm_l",
    "leftupperarm",
    "上腕_l",
    "upperarm.l",
    "l_upperarm",
    "upperarml",
    "arm_l",
    "arm.l",
    "腕_l",
    "腕.l",
    "腕l",
    "左腕",
    "左上腕",
];

/// Lower-case fragments identifying the right upper arm joint.
pub const UPPERARM_R_KEYWORDS: [&str; 13] = [
    "upperarm_r",
    "rightupperarm",
    "上腕_r",
    "upperarm.r",
    "r_upperarm",
    "upperarmr",
    "arm_r",
    "arm.r",
    "腕_r",
    "腕.r",
    "腕r",
    "右腕",
    "右上腕",
];

/// Name of the snapshot shape captured before the rest pose is committed.
pub const POSE_DELTA_SHAPE_NAME: &str = "PoseDelta";

/// Name of the scratch shape used while a shape is being rebuilt.
pub const REBUILD_TEMP_SHAPE_NAME: &str = "PoseDeltaTemp";

pub const DEFAULT_SHOULDER_ANGLE_DEG: f32 = 0.0;
pub const DEFAULT_UPPER_ARM_ANGLE_DEG: f32 = 30.0;
pub const MIN_ANGLE_DEG: f32 = -90.0;
pub const MAX_ANGLE_DEG: f32 = 90.0;

// ─── Joint roles ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointKind {
    Shoulder,
    UpperArm,
}

/// The four joints the converter knows how to rotate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointRole {
    ShoulderL,
    ShoulderR,
    UpperarmL,
    UpperarmR,
}

impl JointRole {
    /// Rotation order: left side first, shoulder before upper arm.
    pub const ALL: [JointRole; 4] = [
        JointRole::ShoulderL,
        JointRole::UpperarmL,
        JointRole::ShoulderR,
        JointRole::UpperarmR,
    ];

    pub fn side(self) -> Side {
        match self {
            JointRole::ShoulderL | JointRole::UpperarmL => Side::Left,
            JointRole::ShoulderR | JointRole::UpperarmR => Side::Right,
        }
    }

    pub fn kind(self) -> JointKind {
        match self {
            JointRole::ShoulderL | JointRole::ShoulderR => JointKind::Shoulder,
            JointRole::UpperarmL | JointRole::UpperarmR => JointKind::UpperArm,
        }
    }

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            JointRole::ShoulderL => &SHOULDER_L_KEYWORDS,
            JointRole::ShoulderR => &SHOULDER_R_KEYWORDS,
            JointRole::UpperarmL => &UPPERARM_L_KEYWORDS,
            JointRole::UpperarmR => &UPPERARM_R_KEYWORDS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JointRole::ShoulderL => "shoulder_l",
            JointRole::ShoulderR => "shoulder_r",
            JointRole::UpperarmL => "upperarm_l",
            JointRole::UpperarmR => "upperarm_r",
        }
    }
}

impl fmt::Display for JointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role → joint name. An empty string means the role is unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMapping {
    pub shoulder_l: String,
    pub shoulder_r: String,
    pub upperarm_l: String,
    pub upperarm_r: String,
}

impl RoleMapping {
    pub fn get(&self, role: JointRole) -> &str {
        match role {
            JointRole::ShoulderL => &self.shoulder_l,
            JointRole::ShoulderR => &self.shoulder_r,
            JointRole::UpperarmL => &self.upperarm_l,
            JointRole::UpperarmR => &self.upperarm_r,
        }
    }

    pub fn set(&mut self, role: JointRole, joint: impl Into<String>) {
        let slot = match role {
            JointRole::ShoulderL => &mut self.shoulder_l,
            JointRole::ShoulderR => &mut self.shoulder_r,
            JointRole::UpperarmL => &mut self.upperarm_l,
            JointRole::UpperarmR => &mut self.upperarm_r,
        };
        *slot = joint.into();
    }

    /// Roles with a non-empty joint name, in rotation order.
    pub fn resolved(&self) -> impl Iterator<Item = (JointRole, &str)> {
        JointRole::ALL
            .into_iter()
            .map(|role| (role, self.get(role)))
            .filter(|(_, joint)| !joint.is_empty())
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved().count()
    }
}

// ─── Options ──────────────────────────────────────────────────────────────────

/// Which reference stance the arms are converted into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionDirection {
    #[serde(rename = "T_TO_A")]
    TToA,
    #[default]
    #[serde(rename = "A_TO_T")]
    AToT,
}

impl fmt::Display for ConversionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionDirection::TToA => f.write_str("T_TO_A"),
            ConversionDirection::AToT => f.write_str("A_TO_T"),
        }
    }
}

/// Conversion parameters shared by the CLI and operator entry points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Rotation for shoulder joints in degrees.
    pub shoulder_angle_deg: f32,
    /// Rotation for upper arm joints in degrees.
    pub upper_arm_angle_deg: f32,
    pub direction: ConversionDirection,
    /// World axis the joints are rotated around.
    #[serde(default)]
    pub axis: RotationAxis,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            shoulder_angle_deg: DEFAULT_SHOULDER_ANGLE_DEG,
            upper_arm_angle_deg: DEFAULT_UPPER_ARM_ANGLE_DEG,
            direction: ConversionDirection::default(),
            axis: RotationAxis::Y,
        }
    }
}

impl ConvertOptions {
    /// Signed angle for a role: A→T negates both angles, right-side roles are mirrored.
    pub fn signed_angle_for(&self, role: JointRole) -> f32 {
        let base = match role.kind() {
            JointKind::Shoulder => self.shoulder_angle_deg,
            JointKind::UpperArm => self.upper_arm_angle_deg,
        };
        let directed = match self.direction {
            ConversionDirection::TToA => base,
            ConversionDirection::AToT => -base,
        };
        match role.side() {
            Side::Left => directed,
            Side::Right => -directed,
        }
    }
}

// ─── State machine ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversionPhase {
    Idle,
    Validating,
    Rotating,
    PreCommitCapture,
    Committing,
    PostCommitRebuild,
    Done,
    Cancelled,
    Failed,
}

impl ConversionPhase {
    pub fn can_advance_to(self, next: ConversionPhase) -> bool {
        use ConversionPhase::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Rotating)
                | (Validating, Failed)
                | (Rotating, PreCommitCapture)
                | (Rotating, Cancelled)
                | (PreCommitCapture, Committing)
                | (Committing, PostCommitRebuild)
                | (PostCommitRebuild, Done)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConversionPhase::Idle => "IDLE",
            ConversionPhase::Validating => "VALIDATING",
            ConversionPhase::Rotating => "ROTATING",
            ConversionPhase::PreCommitCapture => "PRE_COMMIT_CAPTURE",
            ConversionPhase::Committing => "COMMITTING",
            ConversionPhase::PostCommitRebuild => "POST_COMMIT_REBUILD",
            ConversionPhase::Done => "DONE",
            ConversionPhase::Cancelled => "CANCELLED",
            ConversionPhase::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ConversionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Events and reports ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Started,
    Succeeded,
    Warning,
    Failed,
}

/// One entry of the structured event stream emitted while converting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub phase: ConversionPhase,
    /// Mesh or joint the event is about, if any.
    pub target: Option<String>,
    pub outcome: EventOutcome,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshKind {
    WithShapeKeys,
    WithoutShapeKeys,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshOutcome {
    pub mesh_name: String,
    pub kind: MeshKind,
    /// `None` when the mesh converted cleanly.
    pub error: Option<String>,
}

impl MeshOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotatedJoint {
    pub role: JointRole,
    pub joint: String,
    pub angle_deg: f32,
}

/// Result of one conversion run.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub skeleton_name: String,
    /// `None` for a plain rest-pose commit.
    pub options: Option<ConvertOptions>,
    pub rotated_joints: Vec<RotatedJoint>,
    pub processed: usize,
    pub total: usize,
    pub cancelled: bool,
    pub meshes: Vec<MeshOutcome>,
    pub events: Vec<ConversionEvent>,
    pub message: String,
}

impl ConversionReport {
    pub fn success(&self) -> bool {
        !self.cancelled && self.processed == self.total
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoundMeshSummary {
    pub name: String,
    pub has_shape_keys: bool,
    pub shape_key_count: usize,
}

/// What the converter would operate on for one skeleton.
#[derive(Debug, Clone, Serialize)]
pub struct SkeletonSummary {
    pub skeleton_name: String,
    pub joint_count: usize,
    pub meshes: Vec<BoundMeshSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_t_to_a_when_signing_angles_then_right_side_is_mirrored() {
        let options = ConvertOptions {
            shoulder_angle_deg: 5.0,
            upper_arm_angle_deg: 30.0,
            direction: ConversionDirection::TToA,
            axis: RotationAxis::Y,
        };

        assert_eq!(options.signed_angle_for(JointRole::ShoulderL), 5.0);
        assert_eq!(options.signed_angle_for(JointRole::ShoulderR), -5.0);
        assert_eq!(options.signed_angle_for(JointRole::UpperarmL), 30.0);
        assert_eq!(options.signed_angle_for(JointRole::UpperarmR), -30.0);
    }

    #[test]
    fn given_a_to_t_when_signing_angles_then_both_angles_are_negated_before_mirroring() {
        let options = ConvertOptions {
            direction: ConversionDirection::AToT,
            ..ConvertOptions::default()
        };

        assert_eq!(options.signed_angle_for(JointRole::UpperarmL), -30.0);
        assert_eq!(options.signed_angle_for(JointRole::UpperarmR), 30.0);
    }

    #[test]
    fn given_phases_when_checking_transitions_then_commit_is_reachable_only_after_capture() {
        assert!(ConversionPhase::PreCommitCapture.can_advance_to(ConversionPhase::Committing));
        assert!(!ConversionPhase::Rotating.can_advance_to(ConversionPhase::Committing));
        assert!(!ConversionPhase::Committing.can_advance_to(ConversionPhase::Committing));
        assert!(!ConversionPhase::Done.can_advance_to(ConversionPhase::Committing));
    }

    #[test]
    fn given_partial_mapping_when_listing_resolved_then_empty_roles_are_skipped() {
        let mut mapping = RoleMapping::default();
        mapping.set(JointRole::UpperarmR, "upperarm.r");
        mapping.set(JointRole::ShoulderL, "shoulder.l");

        let resolved: Vec<(JointRole, &str)> = mapping.resolved().collect();

        assert_eq!(
            resolved,
            vec![
                (JointRole::ShoulderL, "shoulder.l"),
                (JointRole::UpperarmR, "upperarm.r"),
            ]
        );
    }

    #[test]
    fn given_direction_when_serializing_then_host_mode_names_are_used() {
        let json = serde_json::to_string(&ConversionDirection::TToA).expect("serialize");
        assert_eq!(json, "\"T_TO_A\"");
    }
}
