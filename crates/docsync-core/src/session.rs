//! Stateful driver: fragment cache, configuration and persistence.

use crate::derive::{derive, diagnostics, Diagnostic, Resolved};
use crate::error::UnknownField;
use crate::migrate::{self, migrate, KeySpace, PersistedState};
use crate::model::{Configuration, DocDefaults};
use crate::normalize::{parse_bool, RepoId};
use crate::render::RenderPlan;
use crate::scan::{scan_defaults, Baseline};
use crate::settings::Settings;
use crate::store::{KvStore, SafeStore};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FragmentId(pub String);

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FragmentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FragmentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A code sample. `template` is the text first seen for this id and never
/// changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub template: String,
    pub rendered: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    TeleopPort,
    RobotPort,
    ProjectDir,
    RepoId,
    DatasetOwner,
    DatasetName,
    PushToHub,
    WandbEnable,
}

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "teleop_port" => Ok(Field::TeleopPort),
            "robot_port" => Ok(Field::RobotPort),
            "project_dir" | "workspace_dir" => Ok(Field::ProjectDir),
            "repo_id" | "dataset_repo_id" => Ok(Field::RepoId),
            "dataset_owner" => Ok(Field::DatasetOwner),
            "dataset_name" => Ok(Field::DatasetName),
            "push_to_hub" => Ok(Field::PushToHub),
            "wandb_enable" => Ok(Field::WandbEnable),
            other => Err(UnknownField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOutcome {
    Applied,
    /// Empty input: the field went back to the document default.
    Reverted,
    /// Input did not parse. Dependent values are cleared in memory and
    /// nothing is persisted.
    Rejected,
}

pub struct Session<S: KvStore> {
    keys: KeySpace,
    store: SafeStore<S>,
    fragments: Vec<Fragment>,
    index: HashMap<FragmentId, usize>,
    baseline: Baseline,
    config: Configuration,
    resolved: Resolved,
}

impl<S: KvStore> Session<S> {
    /// Caches templates, infers defaults, loads and migrates persisted state,
    /// then renders every fragment.
    pub fn open<I, T>(fragments: I, store: S, settings: &Settings) -> Self
    where
        I: IntoIterator<Item = (FragmentId, T)>,
        T: Into<String>,
    {
        let keys = KeySpace::new(settings.key_prefix.clone());
        let mut cached: Vec<Fragment> = Vec::new();
        let mut index = HashMap::new();
        for (id, text) in fragments {
            if index.contains_key(&id) {
                debug!(fragment = %id, "duplicate fragment id ignored");
                continue;
            }
            index.insert(id.clone(), cached.len());
            cached.push(Fragment {
                id,
                template: text.into(),
                rendered: String::new(),
            });
        }

        let baseline = scan_defaults(
            cached.iter().map(|f| f.template.as_str()),
            &settings.fallbacks,
        );
        let mut store = SafeStore::new(store);
        let migration = migrate(&PersistedState::load(&store, &keys), &baseline.defaults);
        if migration.needs_rewrite() {
            info!(
                from = ?migration.source_version,
                to = migrate::SCHEMA_VERSION,
                "upgrading saved state"
            );
            migrate::save(&mut store, &keys, &migration.config);
            migrate::remove_legacy(&mut store, &keys);
        }

        let config = migration.config;
        let resolved = derive(&config, &baseline.defaults);
        let mut session = Self {
            keys,
            store,
            fragments: cached,
            index,
            baseline,
            config,
            resolved,
        };
        session.render_all();
        session
    }

    /// Registers a fragment discovered after load and returns its rendered
    /// text. A known id keeps its first template.
    pub fn observe(&mut self, id: impl Into<FragmentId>, text: impl Into<String>) -> &str {
        let id = id.into();
        let idx = match self.index.get(&id) {
            Some(&idx) => idx,
            None => {
                let template = text.into();
                let rendered = RenderPlan::new(&self.baseline, &self.resolved).render(&template);
                self.index.insert(id.clone(), self.fragments.len());
                self.fragments.push(Fragment {
                    id,
                    template,
                    rendered,
                });
                self.fragments.len() - 1
            }
        };
        &self.fragments[idx].rendered
    }

    pub fn edit(&mut self, field: Field, input: &str) -> EditOutcome {
        let value = input.trim();
        let defaults = self.baseline.defaults.config();
        let outcome = if value.is_empty() {
            self.revert(field, &defaults);
            EditOutcome::Reverted
        } else {
            self.apply(field, value)
        };
        debug!(?field, value, ?outcome, "edit");
        if outcome != EditOutcome::Rejected {
            migrate::save(&mut self.store, &self.keys, &self.config);
        }
        self.refresh();
        outcome
    }

    fn revert(&mut self, field: Field, defaults: &Configuration) {
        let c = &mut self.config;
        match field {
            Field::TeleopPort => c.teleop_port = defaults.teleop_port.clone(),
            Field::RobotPort => c.robot_port = defaults.robot_port.clone(),
            Field::ProjectDir => c.project_dir = defaults.project_dir.clone(),
            Field::RepoId => c.set_repo(defaults.repo().as_ref()),
            Field::DatasetOwner => c.dataset_owner = defaults.dataset_owner.clone(),
            Field::DatasetName => c.dataset_name = defaults.dataset_name.clone(),
            Field::PushToHub => c.push_to_hub = defaults.push_to_hub,
            Field::WandbEnable => c.wandb_enable = defaults.wandb_enable,
        }
    }

    fn apply(&mut self, field: Field, value: &str) -> EditOutcome {
        let c = &mut self.config;
        match field {
            Field::TeleopPort => c.teleop_port = value.to_string(),
            Field::RobotPort => c.robot_port = value.to_string(),
            Field::ProjectDir => c.project_dir = value.to_string(),
            Field::RepoId => {
                let repo = RepoId::parse(value);
                c.set_repo(repo.as_ref());
                if repo.is_none() {
                    let (owner, name) = value.split_once('/').unwrap_or((value, ""));
                    c.dataset_owner = owner.to_string();
                    c.dataset_name = name.to_string();
                    return EditOutcome::Rejected;
                }
            }
            Field::DatasetOwner => c.dataset_owner = value.to_string(),
            Field::DatasetName => c.dataset_name = value.to_string(),
            Field::PushToHub | Field::WandbEnable => {
                let Some(flag) = parse_bool(value) else {
                    return EditOutcome::Rejected;
                };
                if field == Field::PushToHub {
                    c.push_to_hub = flag;
                } else {
                    c.wandb_enable = flag;
                }
            }
        }
        if matches!(field, Field::DatasetOwner | Field::DatasetName) && c.repo().is_none() {
            return EditOutcome::Rejected;
        }
        EditOutcome::Applied
    }

    /// Configuration := document defaults, persisted.
    pub fn reset(&mut self) {
        self.config = self.baseline.defaults.config();
        migrate::save(&mut self.store, &self.keys, &self.config);
        self.refresh();
    }

    /// Forgets everything persisted. The in-memory configuration stays.
    pub fn clear_saved(&mut self) {
        migrate::clear(&mut self.store, &self.keys);
    }

    fn refresh(&mut self) {
        self.resolved = derive(&self.config, &self.baseline.defaults);
        self.render_all();
    }

    /// Re-renders every fragment from its template.
    pub fn render_all(&mut self) {
        let plan = RenderPlan::new(&self.baseline, &self.resolved);
        for fragment in &mut self.fragments {
            fragment.rendered = plan.render(&fragment.template);
        }
    }

    pub fn rendered(&self, id: &FragmentId) -> Option<&str> {
        self.index
            .get(id)
            .map(|&idx| self.fragments[idx].rendered.as_str())
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn defaults(&self) -> &DocDefaults {
        &self.baseline.defaults
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn resolved(&self) -> &Resolved {
        &self.resolved
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        diagnostics(&self.config, &self.resolved)
    }

    pub fn store(&self) -> &S {
        self.store.inner()
    }

    pub fn into_store(self) -> S {
        self.store.into_inner()
    }
}
