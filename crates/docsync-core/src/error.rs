use std::path::PathBuf;
use thiserror::Error;

/// Failure of the injected key-value store. Never crosses the core boundary:
/// [`crate::store::SafeStore`] logs and swallows it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

const FIELD_NAMES: &str = "teleop_port, robot_port, project_dir, repo_id, \
                           dataset_owner, dataset_name, push_to_hub, wandb_enable";

#[derive(Debug, Error)]
#[error("unknown field {0:?} (expected one of: {names})", names = FIELD_NAMES)]
pub struct UnknownField(pub String);
