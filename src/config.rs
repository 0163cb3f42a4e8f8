use std::path::Path;

use serde::Deserialize;

use crate::report::DEFAULT_HISTORY_CAP;
use crate::storage::ANONYMOUS_SCOPE;

pub const CONFIG_FILE_NAME: &str = "brand-pipeline.toml";

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrandPipelineConfig {
    pub storage: StorageConfig,
    pub history: HistoryConfig,
    pub scope: ScopeConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding per-scope record files, relative to the project root.
    pub data_dir: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_entries: usize,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ScopeConfig {
    pub default_user: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: ".brand-pipeline".to_string(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_HISTORY_CAP,
        }
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            default_user: ANONYMOUS_SCOPE.to_string(),
        }
    }
}

pub fn validate(config: &BrandPipelineConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.storage.data_dir.trim().is_empty() {
        errors.push("storage.data_dir must not be empty".to_string());
    }

    if config.history.max_entries < 1 {
        errors.push("history.max_entries must be >= 1".to_string());
    }

    if config.scope.default_user.trim().is_empty() {
        errors.push("scope.default_user must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Loads `brand-pipeline.toml` from `project_root`, or defaults if absent.
pub fn load_config(project_root: &Path) -> Result<BrandPipelineConfig, String> {
    load_config_from(None, project_root)
}

/// Loads from an explicit config path when given, else from `project_root`.
pub fn load_config_from(
    config_path: Option<&Path>,
    project_root: &Path,
) -> Result<BrandPipelineConfig, String> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => {
            let default_path = project_root.join(CONFIG_FILE_NAME);
            if !default_path.exists() {
                return Ok(BrandPipelineConfig::default());
            }
            default_path
        }
    };

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| format!("Failed to read {}: {}", config_path.display(), e))?;

    let config: BrandPipelineConfig = toml::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", config_path.display(), e))?;

    validate(&config).map_err(|errors| {
        format!(
            "Config validation failed:\n{}",
            errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n")
        )
    })?;

    Ok(config)
}
