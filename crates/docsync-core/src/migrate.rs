//! Persisted configuration across schema revisions.
//!
//! | version | keys |
//! |---------|------|
//! | 1 | `teleop_port`, `robot_port`, `dataset_root` (base root), `dataset_repo_id` |
//! | 2 | adds `workspace_dir` (parent of project dir), `dataset_owner` / `dataset_name`, flags |
//! | 3 | `schema_version`; `workspace_dir` is the project dir itself |

use crate::model::{Configuration, DocDefaults};
use crate::normalize::{
    bool_str, ends_with_project_folder, is_valid_part, join_path, normalize_path, parse_bool,
    project_dir_from_root, RepoId, PROJECT_FOLDER,
};
use crate::store::{KvStore, SafeStore};
use serde::Serialize;
use tracing::debug;

pub const SCHEMA_VERSION: u32 = 3;

const TELEOP_PORT: &str = "teleop_port";
const ROBOT_PORT: &str = "robot_port";
const WORKSPACE_DIR: &str = "workspace_dir";
const DATASET_OWNER: &str = "dataset_owner";
const DATASET_NAME: &str = "dataset_name";
const PUSH_TO_HUB: &str = "push_to_hub";
const WANDB_ENABLE: &str = "wandb_enable";
const SCHEMA_KEY: &str = "schema_version";
const LEGACY_REPO_ID: &str = "dataset_repo_id";
const LEGACY_DATASET_ROOT: &str = "dataset_root";

const CURRENT_KEYS: &[&str] = &[
    TELEOP_PORT,
    ROBOT_PORT,
    WORKSPACE_DIR,
    DATASET_OWNER,
    DATASET_NAME,
    PUSH_TO_HUB,
    WANDB_ENABLE,
    SCHEMA_KEY,
];
const LEGACY_KEYS: &[&str] = &[LEGACY_REPO_ID, LEGACY_DATASET_ROOT];

/// Prefixes every persisted key (`lerobot.teleop_port`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn all_keys(&self) -> Vec<String> {
        CURRENT_KEYS
            .iter()
            .chain(LEGACY_KEYS)
            .map(|name| self.key(name))
            .collect()
    }
}

/// Raw persisted values, any version. `None` covers both missing keys and
/// failed reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistedState {
    pub schema_version: Option<String>,
    pub teleop_port: Option<String>,
    pub robot_port: Option<String>,
    pub workspace_dir: Option<String>,
    pub dataset_owner: Option<String>,
    pub dataset_name: Option<String>,
    pub push_to_hub: Option<String>,
    pub wandb_enable: Option<String>,
    pub dataset_repo_id: Option<String>,
    pub dataset_root: Option<String>,
}

impl PersistedState {
    pub fn load<S: KvStore>(store: &SafeStore<S>, keys: &KeySpace) -> Self {
        let get = |name: &str| store.get(&keys.key(name)).map(|v| v.trim().to_string());
        Self {
            schema_version: get(SCHEMA_KEY),
            teleop_port: get(TELEOP_PORT),
            robot_port: get(ROBOT_PORT),
            workspace_dir: get(WORKSPACE_DIR),
            dataset_owner: get(DATASET_OWNER),
            dataset_name: get(DATASET_NAME),
            push_to_hub: get(PUSH_TO_HUB),
            wandb_enable: get(WANDB_ENABLE),
            dataset_repo_id: get(LEGACY_REPO_ID),
            dataset_root: get(LEGACY_DATASET_ROOT),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Explicit version when parseable, otherwise inferred from which keys
    /// exist. `None` when nothing was ever saved.
    pub fn version(&self) -> Option<u32> {
        if let Some(v) = self.schema_version.as_deref().and_then(|v| v.parse().ok()) {
            return Some(v);
        }
        if self.workspace_dir.is_some()
            || self.dataset_owner.is_some()
            || self.dataset_name.is_some()
            || self.push_to_hub.is_some()
            || self.wandb_enable.is_some()
        {
            return Some(2);
        }
        if self.is_empty() {
            return None;
        }
        Some(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Migration {
    pub config: Configuration,
    pub source_version: Option<u32>,
}

impl Migration {
    /// The store holds an older schema that should be rewritten.
    pub fn needs_rewrite(&self) -> bool {
        self.source_version.map_or(false, |v| v < SCHEMA_VERSION)
    }
}

pub fn migrate(state: &PersistedState, defaults: &DocDefaults) -> Migration {
    let version = state.version();
    let fallback = defaults.config();
    let combined = state.dataset_repo_id.as_deref().and_then(RepoId::parse);

    let owner = state
        .dataset_owner
        .clone()
        .filter(|v| is_valid_part(v))
        .or_else(|| combined.as_ref().map(|r| r.owner.clone()))
        .unwrap_or_else(|| fallback.dataset_owner.clone());
    let name = state
        .dataset_name
        .clone()
        .filter(|v| is_valid_part(v))
        .or_else(|| combined.as_ref().map(|r| r.name.clone()))
        .unwrap_or_else(|| fallback.dataset_name.clone());

    let project_dir = match (&state.workspace_dir, &state.dataset_root) {
        (Some(ws), _) => workspace_to_project(ws, version.unwrap_or(SCHEMA_VERSION)),
        (None, Some(root)) => project_dir_from_root(root),
        (None, None) => String::new(),
    };

    let mut config = Configuration {
        teleop_port: state
            .teleop_port
            .clone()
            .unwrap_or_else(|| fallback.teleop_port.clone()),
        robot_port: state
            .robot_port
            .clone()
            .unwrap_or_else(|| fallback.robot_port.clone()),
        project_dir: if project_dir.is_empty() {
            fallback.project_dir.clone()
        } else {
            project_dir
        },
        push_to_hub: state
            .push_to_hub
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(fallback.push_to_hub),
        wandb_enable: state
            .wandb_enable
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(fallback.wandb_enable),
        ..Configuration::default()
    };
    config.set_repo(RepoId::from_parts(&owner, &name).as_ref());

    debug!(
        ?version,
        project_dir = %config.project_dir,
        repo = %config.raw_repo_id(),
        "migrated persisted state"
    );
    Migration {
        config,
        source_version: version,
    }
}

/// Before version 3 `workspace_dir` named the parent of the checkout.
fn workspace_to_project(workspace: &str, version: u32) -> String {
    let ws = normalize_path(workspace);
    if version >= SCHEMA_VERSION || ws.is_empty() || ends_with_project_folder(&ws) {
        return ws;
    }
    join_path(&ws, PROJECT_FOLDER)
}

/// Writes `config` under the current schema. Dataset keys are skipped while
/// the repo id does not parse.
pub fn save<S: KvStore>(store: &mut SafeStore<S>, keys: &KeySpace, config: &Configuration) {
    store.set(&keys.key(TELEOP_PORT), &config.teleop_port);
    store.set(&keys.key(ROBOT_PORT), &config.robot_port);
    store.set(&keys.key(WORKSPACE_DIR), &config.project_dir);
    if let Some(repo) = config.repo() {
        store.set(&keys.key(DATASET_OWNER), &repo.owner);
        store.set(&keys.key(DATASET_NAME), &repo.name);
    }
    store.set(&keys.key(PUSH_TO_HUB), bool_str(config.push_to_hub));
    store.set(&keys.key(WANDB_ENABLE), bool_str(config.wandb_enable));
    store.set(&keys.key(SCHEMA_KEY), &SCHEMA_VERSION.to_string());
}

pub fn remove_legacy<S: KvStore>(store: &mut SafeStore<S>, keys: &KeySpace) {
    for name in LEGACY_KEYS {
        store.delete(&keys.key(name));
    }
}

pub fn clear<S: KvStore>(store: &mut SafeStore<S>, keys: &KeySpace) {
    for key in keys.all_keys() {
        store.delete(&key);
    }
}
