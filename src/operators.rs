use serde::Serialize;

use crate::convert::{ConversionReport, PoseConverter, SkeletonLocks, detect_bones};
use crate::error::{ConvertError, ValidationError};
use crate::logging::{LogLevel, ResultExt, send_log};
use crate::scene::{SceneHost, SkeletonId};
use crate::settings::DocumentSettings;

/// Host-style operator completion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorStatus {
    Finished,
    Cancelled,
}

/// What an operator hands back to the UI: a status, counts and one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorOutcome {
    pub status: OperatorStatus,
    pub success: bool,
    pub processed: usize,
    pub total: usize,
    pub message: String,
    pub level: LogLevel,
}

impl OperatorOutcome {
    fn cancelled(message: impl Into<String>) -> Self {
        let message = message.into();
        send_log(LogLevel::Warn, &message);
        Self {
            status: OperatorStatus::Cancelled,
            success: false,
            processed: 0,
            total: 0,
            message,
            level: LogLevel::Warn,
        }
    }

    fn from_report(report: &ConversionReport) -> Self {
        let level = if report.success() {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };
        Self {
            status: OperatorStatus::Finished,
            success: report.success(),
            processed: report.processed,
            total: report.total,
            message: report.message.clone(),
            level,
        }
    }

    fn from_result(result: Result<ConversionReport, ConvertError>, failure_prefix: &str) -> Self {
        match result {
            Ok(report) => Self::from_report(&report),
            Err(ConvertError::Validation(error)) => Self::cancelled(error.to_string()),
            Err(error) => Self {
                status: OperatorStatus::Cancelled,
                success: false,
                processed: 0,
                total: 0,
                message: format!("{}: {}", failure_prefix, error),
                level: LogLevel::Error,
            },
        }
    }
}

/// Detects the arm joints and stores the result in the document.
pub fn detect_bones_operator(
    host: &impl SceneHost,
    skeleton: Option<SkeletonId>,
    settings: &mut DocumentSettings,
) -> OperatorOutcome {
    let Some(skeleton) = skeleton else {
        return OperatorOutcome::cancelled(ValidationError::NoSkeleton.to_string());
    };
    if host.skeleton_name(skeleton).is_err() {
        return OperatorOutcome::cancelled(ValidationError::NoSkeleton.to_string());
    }

    let report = detect_bones(host, skeleton);
    settings.set_role_mapping(&report.mapping);
    send_log(report.level, &report.message);

    OperatorOutcome {
        status: OperatorStatus::Finished,
        success: report.detected > 0,
        processed: report.detected,
        total: 4,
        message: report.message,
        level: report.level,
    }
}

/// Converts the document's mapping with its direction and angles.
pub fn convert_pose_operator<H: SceneHost>(
    host: &mut H,
    locks: &SkeletonLocks,
    skeleton: Option<SkeletonId>,
    settings: &DocumentSettings,
) -> OperatorOutcome {
    let Some(skeleton) = skeleton else {
        return OperatorOutcome::cancelled(ValidationError::NoSkeleton.to_string());
    };
    let result = PoseConverter::new(host, locks)
        .convert_pose(skeleton, &settings.role_mapping(), settings.convert_options())
        .log_error(Some("Pose conversion failed"));
    OperatorOutcome::from_result(result, "Pose conversion failed")
}

/// Commits the current pose as rest pose for every bound mesh.
pub fn set_rest_pose_operator<H: SceneHost>(
    host: &mut H,
    locks: &SkeletonLocks,
    skeleton: Option<SkeletonId>,
) -> OperatorOutcome {
    let Some(skeleton) = skeleton else {
        return OperatorOutcome::cancelled(ValidationError::NoSkeleton.to_string());
    };
    let result = PoseConverter::new(host, locks)
        .set_rest_pose(skeleton)
        .log_error(Some("Set rest pose failed"));
    OperatorOutcome::from_result(result, "Set rest pose failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConversionDirection;
    use crate::scene::fixtures::{add_body, add_face, rig_scene};
    use pretty_assertions::assert_eq;

    #[test]
    fn given_no_skeleton_when_converting_then_operator_is_cancelled_with_message() {
        let (mut scene, _) = rig_scene();
        let locks = SkeletonLocks::new();

        let outcome =
            convert_pose_operator(&mut scene, &locks, None, &DocumentSettings::default());

        assert_eq!(outcome.status, OperatorStatus::Cancelled);
        assert_eq!(outcome.message, "Please select a valid skeleton.");
    }

    #[test]
    fn given_rig_when_detecting_then_document_mapping_is_filled() {
        let (scene, skeleton) = rig_scene();
        let mut settings = DocumentSettings::default();

        let outcome = detect_bones_operator(&scene, Some(skeleton), &mut settings);

        assert_eq!(outcome.status, OperatorStatus::Finished);
        assert_eq!(outcome.processed, 4);
        assert_eq!(settings.upperarm_r, "upperarm.r");
    }

    #[test]
    fn given_detected_mapping_when_converting_then_all_meshes_are_reported() {
        let (mut scene, skeleton) = rig_scene();
        add_body(&mut scene, skeleton);
        add_face(&mut scene, skeleton);
        let locks = SkeletonLocks::new();
        let mut settings = DocumentSettings {
            conversion_mode: ConversionDirection::TToA,
            ..DocumentSettings::default()
        };
        detect_bones_operator(&scene, Some(skeleton), &mut settings);

        let outcome = convert_pose_operator(&mut scene, &locks, Some(skeleton), &settings);

        assert_eq!(outcome.status, OperatorStatus::Finished);
        assert!(outcome.success);
        assert_eq!((outcome.processed, outcome.total), (2, 2));
        assert_eq!(outcome.level, LogLevel::Info);
    }

    #[test]
    fn given_empty_mapping_when_converting_then_validation_message_is_returned() {
        let (mut scene, skeleton) = rig_scene();
        add_body(&mut scene, skeleton);
        let locks = SkeletonLocks::new();

        let outcome =
            convert_pose_operator(&mut scene, &locks, Some(skeleton), &DocumentSettings::default());

        assert_eq!(outcome.status, OperatorStatus::Cancelled);
        assert!(outcome.message.starts_with("No valid joints specified"));
    }

    #[test]
    fn given_skeleton_without_meshes_when_setting_rest_pose_then_cancelled() {
        let (mut scene, skeleton) = rig_scene();
        let locks = SkeletonLocks::new();

        let outcome = set_rest_pose_operator(&mut scene, &locks, Some(skeleton));

        assert_eq!(outcome.status, OperatorStatus::Cancelled);
        assert_eq!(outcome.message, "No meshes are bound to skeleton 'Rig'.");
    }

    #[test]
    fn given_bound_mesh_when_setting_rest_pose_then_finished() {
        let (mut scene, skeleton) = rig_scene();
        add_body(&mut scene, skeleton);
        let locks = SkeletonLocks::new();

        let outcome = set_rest_pose_operator(&mut scene, &locks, Some(skeleton));

        assert_eq!(outcome.status, OperatorStatus::Finished);
        assert_eq!(outcome.message, "Rest pose set: All 1 meshes updated successfully.");
    }
}
