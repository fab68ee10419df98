use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE_NAME: &str = "docsync.yaml";
pub const DEFAULT_STORE_PATH: &str = ".docsync/state.json";
pub const DEFAULT_KEY_PREFIX: &str = "lerobot.";

/// Values the scanner falls back to when a document never mentions a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fallbacks {
    pub teleop_port: String,
    pub robot_port: String,
    pub project_dir: String,
    pub dataset_repo_id: String,
    pub policy_type: String,
}

impl Default for Fallbacks {
    fn default() -> Self {
        Self {
            teleop_port: "/dev/ttyACM1".to_string(),
            robot_port: "/dev/ttyACM0".to_string(),
            project_dir: "/home/jetson/lerobot".to_string(),
            dataset_repo_id: "local/1cam_test".to_string(),
            policy_type: "act".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store_path: PathBuf,
    pub key_prefix: String,
    pub fallbacks: Fallbacks,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            fallbacks: Fallbacks::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let data = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&data).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(data: &str) -> Result<Self, serde_yaml::Error> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(data)
    }

    /// Loads `docsync.yaml` from `dir` when present, defaults otherwise.
    /// A relative `store_path` is resolved against `dir`.
    pub fn discover(dir: &Path) -> Result<Self, SettingsError> {
        let candidate = dir.join(SETTINGS_FILE_NAME);
        let mut settings = if candidate.is_file() {
            Self::load(&candidate)?
        } else {
            Self::default()
        };
        if settings.store_path.is_relative() {
            settings.store_path = dir.join(&settings.store_path);
        }
        Ok(settings)
    }
}
