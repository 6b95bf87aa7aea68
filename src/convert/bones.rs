use serde::Serialize;

use super::types::{JointRole, RoleMapping};
use crate::logging::LogLevel;
use crate::scene::{SceneHost, SkeletonId};
use crate::{log_debug, log_info};

/// Returns the first joint whose lower-cased name contains any of `keywords`.
///
/// Joints are scanned in enumeration order and the first matching joint
/// wins. An empty string means nothing matched.
pub fn find_joint_by_keywords<'a, I>(joint_names: I, keywords: &[&str]) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    for name in joint_names {
        let name_lower = name.to_lowercase();
        if let Some(keyword) = keywords.iter().find(|keyword| name_lower.contains(**keyword)) {
            log_debug!("Match found: {} contains {}", name, keyword);
            return name.to_string();
        }
    }

    log_debug!("No joints found matching keywords: {:?}", keywords);
    String::new()
}

/// Resolves all four roles against the given joint names using the built-in keyword tables.
pub fn locate_roles(joint_names: &[String]) -> RoleMapping {
    let mut mapping = RoleMapping::default();
    for role in JointRole::ALL {
        let found =
            find_joint_by_keywords(joint_names.iter().map(String::as_str), role.keywords());
        mapping.set(role, found);
    }
    mapping
}

/// Outcome of automatic joint detection on one skeleton.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub skeleton_name: String,
    pub mapping: RoleMapping,
    pub detected: usize,
    pub level: LogLevel,
    pub message: String,
}

/// Best-effort detection of the shoulder and upper arm joints.
///
/// Never fails: a missing skeleton or zero matches yields an empty mapping
/// and a warning-level message.
pub fn detect_bones(host: &impl SceneHost, skeleton: SkeletonId) -> DetectionReport {
    let (skeleton_name, joint_names) = match (
        host.skeleton_name(skeleton),
        host.enumerate_joints(skeleton),
    ) {
        (Ok(name), Ok(joints)) => (
            name,
            joints
                .into_iter()
                .map(|joint| joint.name)
                .collect::<Vec<String>>(),
        ),
        _ => {
            return DetectionReport {
                skeleton_name: String::new(),
                mapping: RoleMapping::default(),
                detected: 0,
                level: LogLevel::Warn,
                message: "Please select a valid skeleton.".to_string(),
            };
        }
    };

    log_info!("Starting bone detection on '{}'", skeleton_name);
    let mapping = locate_roles(&joint_names);
    let detected = mapping.resolved_count();
    log_info!("Bone detection results: {:?}", mapping);

    let (level, message) = match detected {
        0 => (
            LogLevel::Warn,
            "No bones detected. Please manually specify bone names.".to_string(),
        ),
        n if n < JointRole::ALL.len() => (
            LogLevel::Info,
            format!(
                "Partial detection: {}/{} bones found. Please check or specify the remaining bones.",
                n,
                JointRole::ALL.len()
            ),
        ),
        _ => (
            LogLevel::Info,
            "Bone detection complete: All bones successfully detected!".to_string(),
        ),
    };

    DetectionReport {
        skeleton_name,
        mapping,
        detected,
        level,
        message,
    }
}
