use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::convert::{
    ConversionDirection, ConvertOptions, DEFAULT_SHOULDER_ANGLE_DEG, DEFAULT_UPPER_ARM_ANGLE_DEG,
    MAX_ANGLE_DEG, MIN_ANGLE_DEG, RoleMapping,
};
use crate::correction::RotationAxis;

/// Keeps an angle inside the range the converter accepts.
pub fn clamp_angle(angle_deg: f32) -> f32 {
    if angle_deg.is_nan() {
        return 0.0;
    }
    angle_deg.clamp(MIN_ANGLE_DEG, MAX_ANGLE_DEG)
}

/// Installation-wide defaults shared by every document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConverterPreferences {
    pub shoulder_rotation_angle: f32,
    pub upperarm_rotation_angle: f32,
}

impl Default for PoseConverterPreferences {
    fn default() -> Self {
        Self {
            shoulder_rotation_angle: DEFAULT_SHOULDER_ANGLE_DEG,
            upperarm_rotation_angle: DEFAULT_UPPER_ARM_ANGLE_DEG,
        }
    }
}

/// Per-document converter state: direction, angles and the role mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    pub conversion_mode: ConversionDirection,
    pub shoulder_rotation_angle: f32,
    pub upperarm_rotation_angle: f32,
    pub shoulder_l: String,
    pub shoulder_r: String,
    pub upperarm_l: String,
    pub upperarm_r: String,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            conversion_mode: ConversionDirection::AToT,
            shoulder_rotation_angle: DEFAULT_SHOULDER_ANGLE_DEG,
            upperarm_rotation_angle: DEFAULT_UPPER_ARM_ANGLE_DEG,
            shoulder_l: String::new(),
            shoulder_r: String::new(),
            upperarm_l: String::new(),
            upperarm_r: String::new(),
        }
    }
}

impl DocumentSettings {
    pub fn role_mapping(&self) -> RoleMapping {
        RoleMapping {
            shoulder_l: self.shoulder_l.clone(),
            shoulder_r: self.shoulder_r.clone(),
            upperarm_l: self.upperarm_l.clone(),
            upperarm_r: self.upperarm_r.clone(),
        }
    }

    /// Overwrites all four role fields, including ones the mapping leaves empty.
    pub fn set_role_mapping(&mut self, mapping: &RoleMapping) {
        self.shoulder_l = mapping.shoulder_l.clone();
        self.shoulder_r = mapping.shoulder_r.clone();
        self.upperarm_l = mapping.upperarm_l.clone();
        self.upperarm_r = mapping.upperarm_r.clone();
    }

    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            shoulder_angle_deg: clamp_angle(self.shoulder_rotation_angle),
            upper_arm_angle_deg: clamp_angle(self.upperarm_rotation_angle),
            direction: self.conversion_mode,
            axis: RotationAxis::Y,
        }
    }

    /// Pulls the installation defaults into this document, as done when a document is opened.
    pub fn sync_from_preferences(&mut self, preferences: &PoseConverterPreferences) {
        self.shoulder_rotation_angle = clamp_angle(preferences.shoulder_rotation_angle);
        self.upperarm_rotation_angle = clamp_angle(preferences.upperarm_rotation_angle);
    }

    /// Edits the shoulder angle and writes it back to the installation defaults.
    pub fn set_shoulder_angle(&mut self, angle_deg: f32, preferences: &mut PoseConverterPreferences) {
        self.shoulder_rotation_angle = clamp_angle(angle_deg);
        preferences.shoulder_rotation_angle = self.shoulder_rotation_angle;
    }

    /// Edits the upper arm angle and writes it back to the installation defaults.
    pub fn set_upperarm_angle(&mut self, angle_deg: f32, preferences: &mut PoseConverterPreferences) {
        self.upperarm_rotation_angle = clamp_angle(angle_deg);
        preferences.upperarm_rotation_angle = self.upperarm_rotation_angle;
    }
}

fn save_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {} as JSON", what))?;
    fs::write(path, content)
        .with_context(|| format!("failed to save {}: {}", what, path.display()))?;
    Ok(())
}

fn load_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to load {}: {}", what, path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {} JSON", what))
}

/// Save document settings to a JSON file.
pub fn save_document_settings(path: &Path, settings: &DocumentSettings) -> Result<()> {
    save_json(path, settings, "document settings")
}

/// Load document settings from a JSON file.
pub fn load_document_settings(path: &Path) -> Result<DocumentSettings> {
    load_json(path, "document settings")
}

/// Save converter preferences to a JSON file.
pub fn save_preferences(path: &Path, preferences: &PoseConverterPreferences) -> Result<()> {
    save_json(path, preferences, "converter preferences")
}

/// Load converter preferences from a JSON file.
pub fn load_preferences(path: &Path) -> Result<PoseConverterPreferences> {
    load_json(path, "converter preferences")
}
