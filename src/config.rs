use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::calc::{MarkField, MarkFieldLimits};

pub const CONFIG_FILE_NAME: &str = "markreg.json";

pub const DEFAULT_SCHOOL_NAME: &str = "The Gemini Academy";
pub const DEFAULT_EXPORT_FILE_PREFIX: &str = "School_Marks_Export_";

pub const DEFAULT_SUBJECTS: [&str; 7] = [
    "English",
    "Math",
    "Urdu",
    "Science",
    "Kashmiri",
    "Islamic Studies",
    "Computer",
];

pub const SCHOOL_CLASSES: [&str; 13] = [
    "NURSERY", "LKG", "UKG", "1st", "2nd", "3rd", "4th", "5th", "6th", "7th", "8th", "9th",
    "10th",
];

/// Per-workspace settings read once when the workspace is selected. Every key is
/// optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub school_name: String,
    pub export_file_prefix: String,
    pub classes: Vec<String>,
    pub default_subjects: Vec<String>,
    pub limits: MarkFieldLimits,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            school_name: DEFAULT_SCHOOL_NAME.to_string(),
            export_file_prefix: DEFAULT_EXPORT_FILE_PREFIX.to_string(),
            classes: SCHOOL_CLASSES.iter().map(|s| s.to_string()).collect(),
            default_subjects: DEFAULT_SUBJECTS.iter().map(|s| s.to_string()).collect(),
            limits: MarkFieldLimits::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for field in MarkField::ALL {
            let max = self.limits.max_for(field);
            if max < 0 {
                return Err(anyhow!(
                    "limits.{} must be >= 0 (got {})",
                    field.key(),
                    max
                ));
            }
        }
        if self.classes.iter().all(|c| c.trim().is_empty()) {
            return Err(anyhow!("classes must list at least one class"));
        }
        if self.export_file_prefix.contains(|c| c == '/' || c == '\\') {
            return Err(anyhow!("exportFilePrefix must not contain path separators"));
        }
        Ok(())
    }
}

/// Loads `markreg.json` from the workspace, falling back to defaults when the file is
/// absent. A present but malformed file is an error.
pub fn load_workspace_config(workspace: &Path) -> anyhow::Result<AppConfig> {
    let path = workspace.join(CONFIG_FILE_NAME);
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "no workspace config, using defaults");
        return Ok(AppConfig::default());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let cfg: AppConfig = serde_json::from_str(&text)
        .with_context(|| format!("{} is invalid JSON", path.to_string_lossy()))?;
    cfg.validate()
        .with_context(|| format!("{} failed validation", path.to_string_lossy()))?;
    tracing::info!(path = %path.display(), "loaded workspace config");
    Ok(cfg)
}
