//! Pure derivation of every dependent value from `(Configuration, DocDefaults)`.

use crate::model::{Configuration, DocDefaults};
use crate::normalize::{
    bool_str, join_path, normalize_path, parent_dir, strip_path_suffix, RepoId,
};
use crate::token::Token;
use crate::variant::eval_slug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::fmt;

const PRETRAINED_SUFFIX: &str = "checkpoints/last/pretrained_model";
const TRAIN_CONFIG_FILE: &str = "train_config.json";
const MODELS_FOLDER: &str = "models";

static TRAIN_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(outputs/train/)([^/\s]+)").expect("train segment pattern"));

/// Every derived value. Empty strings mean "could not be derived".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub teleop_port: String,
    pub robot_port: String,
    pub project_dir: String,
    pub workspace_parent: String,
    pub dataset_root: String,
    pub repo_id: String,
    pub dataset_owner: String,
    pub dataset_name: String,
    pub dataset_dir: String,
    pub eval_repo_id: String,
    pub eval_slug: String,
    pub eval_dataset_dir: String,
    pub policy_type: String,
    pub run_name: String,
    pub output_dir: String,
    pub config_path: String,
    pub policy_path: String,
    pub models_dir: String,
    pub model_dir: String,
    pub push_to_hub: bool,
    pub wandb_enable: bool,
}

impl Resolved {
    pub fn value(&self, token: Token) -> &str {
        match token {
            Token::TeleopPort => &self.teleop_port,
            Token::RobotPort => &self.robot_port,
            Token::WorkspaceDir => &self.project_dir,
            Token::DatasetRepoId => &self.repo_id,
            Token::DatasetOwner => &self.dataset_owner,
            Token::DatasetName | Token::DatasetSlug => &self.dataset_name,
            Token::DatasetDir | Token::DatasetRoot => &self.dataset_dir,
            Token::TrainRunName => &self.run_name,
            Token::TrainOutputDir => &self.output_dir,
            Token::TrainConfigPath => &self.config_path,
            Token::PolicyPath => &self.policy_path,
            Token::ModelsDir => &self.models_dir,
            Token::ModelDir => &self.model_dir,
            Token::PushToHub => bool_str(self.push_to_hub),
            Token::WandbEnable => bool_str(self.wandb_enable),
            Token::EvalDatasetRepoId => &self.eval_repo_id,
            Token::EvalDatasetDir => &self.eval_dataset_dir,
            Token::EvalDatasetSlug => &self.eval_slug,
        }
    }
}

pub fn derive(config: &Configuration, defaults: &DocDefaults) -> Resolved {
    let repo = config.repo();
    let rel = dataset_root_rel(defaults);
    let project_dir = project_dir_from_input(&config.project_dir, repo.as_ref(), rel.as_deref());
    let dataset_root = dataset_root_for(&project_dir, defaults, rel.as_deref());

    let slug = repo.as_ref().map(|r| r.name.clone()).unwrap_or_default();
    let eval = eval_slug(&slug);
    let eval_repo = repo.as_ref().and_then(|r| r.with_name(&eval));

    let run_name = derive_run_name(
        &defaults.run_name,
        defaults.slug(),
        &defaults.policy_type,
        &slug,
    );
    let output_dir = derive_output_dir(defaults, &project_dir, &run_name);
    let models_dir = join_path(&project_dir, MODELS_FOLDER);

    Resolved {
        teleop_port: config.teleop_port.trim().to_string(),
        robot_port: config.robot_port.trim().to_string(),
        workspace_parent: parent_dir(&project_dir),
        dataset_dir: repo
            .as_ref()
            .map(|r| dataset_dir(&dataset_root, r))
            .unwrap_or_default(),
        eval_dataset_dir: eval_repo
            .as_ref()
            .map(|r| dataset_dir(&dataset_root, r))
            .unwrap_or_default(),
        repo_id: repo.as_ref().map(|r| r.to_string()).unwrap_or_default(),
        dataset_owner: repo.as_ref().map(|r| r.owner.clone()).unwrap_or_default(),
        eval_repo_id: eval_repo.map(|r| r.to_string()).unwrap_or_default(),
        dataset_name: slug,
        eval_slug: eval,
        policy_type: defaults.policy_type.clone(),
        config_path: config_path(&output_dir),
        policy_path: policy_path(&output_dir),
        model_dir: join_path(&models_dir, &run_name),
        models_dir,
        run_name,
        output_dir,
        project_dir,
        dataset_root,
        push_to_hub: config.push_to_hub,
        wandb_enable: config.wandb_enable,
    }
}

pub fn dataset_dir(root: &str, repo: &RepoId) -> String {
    join_path(root, &format!("{}/{}", repo.owner, repo.name))
}

/// Where the document keeps datasets relative to its project dir: `Some("")`
/// for the project dir itself, `None` when the root lives elsewhere.
pub fn dataset_root_rel(defaults: &DocDefaults) -> Option<String> {
    let root = normalize_path(&defaults.dataset_root);
    let project = normalize_path(&defaults.project_dir);
    if root.is_empty() || project.is_empty() {
        return None;
    }
    if root == project {
        return Some(String::new());
    }
    let prefix = if project == "/" {
        project
    } else {
        format!("{}/", project)
    };
    root.strip_prefix(&prefix).map(str::to_string)
}

/// Accepts a project dir, a dataset root, or a full dataset path and reduces
/// it to the project dir.
pub fn project_dir_from_input(input: &str, repo: Option<&RepoId>, rel: Option<&str>) -> String {
    let mut p = normalize_path(input);
    if p.is_empty() {
        return p;
    }
    if let Some(r) = repo {
        for name in [r.name.clone(), eval_slug(&r.name)] {
            if let Some(head) = strip_path_suffix(&p, &format!("{}/{}", r.owner, name)) {
                p = head;
                break;
            }
        }
    }
    if let Some(rel) = rel.filter(|r| !r.is_empty()) {
        if let Some(head) = strip_path_suffix(&p, rel) {
            p = head;
        }
    }
    p
}

fn dataset_root_for(project_dir: &str, defaults: &DocDefaults, rel: Option<&str>) -> String {
    if project_dir.is_empty() {
        return String::new();
    }
    match rel {
        Some("") => project_dir.to_string(),
        Some(r) => join_path(project_dir, r),
        None if project_dir == normalize_path(&defaults.project_dir) => {
            normalize_path(&defaults.dataset_root)
        }
        None => project_dir.to_string(),
    }
}

/// Substring preservation beats recomposition so user decoration around the
/// slug survives a dataset rename.
pub fn derive_run_name(
    prev_run: &str,
    prev_slug: &str,
    policy_type: &str,
    new_slug: &str,
) -> String {
    let prev_run = prev_run.trim();
    let prev_slug = prev_slug.trim();
    let policy_type = policy_type.trim();
    let new_slug = new_slug.trim();
    if new_slug.is_empty() {
        return String::new();
    }
    if !prev_run.is_empty() && !prev_slug.is_empty() && prev_run.contains(prev_slug) {
        return prev_run.replace(prev_slug, new_slug);
    }
    if !policy_type.is_empty() {
        return format!("{}_{}", policy_type, new_slug);
    }
    if !prev_run.is_empty() {
        return prev_run.to_string();
    }
    new_slug.to_string()
}

/// Directory convention a document uses for training output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputLayout {
    Absent,
    /// `.../outputs/train/<run>/...`
    OutputsTrain,
    /// `models/<run>` or `./models/<run>`.
    RelativeModels { prefix: String },
    /// `<base>/models/<run>` with an absolute base.
    AbsoluteModels { base: String },
    /// `<parent>/<run>` where the last segment is the known run name.
    Custom { parent: String },
    /// Anything else; kept verbatim.
    Opaque,
}

impl OutputLayout {
    pub fn detect(output_dir: &str, run_name: &str) -> Self {
        let out = normalize_path(output_dir);
        if out.is_empty() {
            return OutputLayout::Absent;
        }
        if TRAIN_SEGMENT.is_match(&out) {
            return OutputLayout::OutputsTrain;
        }
        let (parent, seg) = split_last(&out);
        if parent == MODELS_FOLDER || parent == "./models" {
            return OutputLayout::RelativeModels {
                prefix: parent.to_string(),
            };
        }
        if parent.starts_with('/') {
            if let Some(base) = parent.strip_suffix("/models") {
                return OutputLayout::AbsoluteModels {
                    base: base.to_string(),
                };
            }
        }
        if !run_name.trim().is_empty() && seg == run_name.trim() {
            return OutputLayout::Custom {
                parent: parent.to_string(),
            };
        }
        OutputLayout::Opaque
    }

    /// Run segment the layout encodes, used when a document names an output
    /// dir but no job name.
    pub fn run_segment(&self, output_dir: &str) -> Option<String> {
        let out = normalize_path(output_dir);
        match self {
            OutputLayout::OutputsTrain => TRAIN_SEGMENT
                .captures(&out)
                .map(|caps| caps[2].to_string()),
            OutputLayout::RelativeModels { .. } | OutputLayout::AbsoluteModels { .. } => {
                Some(split_last(&out).1.to_string())
            }
            _ => None,
        }
    }
}

fn split_last(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, seg)) => (parent, seg),
        None => ("", path),
    }
}

pub fn derive_output_dir(defaults: &DocDefaults, new_project: &str, new_run: &str) -> String {
    let run = new_run.trim();
    if run.is_empty() {
        return String::new();
    }
    let out = normalize_path(&defaults.output_dir);
    match OutputLayout::detect(&out, &defaults.run_name) {
        OutputLayout::Absent => format!("{}/{}", MODELS_FOLDER, run),
        OutputLayout::OutputsTrain => TRAIN_SEGMENT
            .replacen(&out, 1, |caps: &Captures| format!("{}{}", &caps[1], run))
            .into_owned(),
        OutputLayout::RelativeModels { prefix } => format!("{}/{}", prefix, run),
        OutputLayout::AbsoluteModels { base } => {
            if base == normalize_path(&defaults.project_dir) {
                join_path(new_project, &format!("{}/{}", MODELS_FOLDER, run))
            } else {
                format!("{}/{}/{}", base, MODELS_FOLDER, run)
            }
        }
        OutputLayout::Custom { parent } if parent.is_empty() => run.to_string(),
        OutputLayout::Custom { parent } => format!("{}/{}", parent, run),
        OutputLayout::Opaque => out,
    }
}

pub fn policy_path(output_dir: &str) -> String {
    join_path(output_dir.trim(), PRETRAINED_SUFFIX)
}

pub fn config_path(output_dir: &str) -> String {
    join_path(&policy_path(output_dir), TRAIN_CONFIG_FILE)
}

/// Conditions a form should surface next to the inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Diagnostic {
    InvalidRepoId { value: String },
    EmptyProjectDir,
    NoWorkspaceParent { project_dir: String },
    EmptyPort { field: &'static str },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::InvalidRepoId { value } => write!(
                f,
                "dataset repo id must be owner/name (e.g. alice/1cam_test), got {:?}",
                value
            ),
            Diagnostic::EmptyProjectDir => write!(f, "project dir is empty"),
            Diagnostic::NoWorkspaceParent { project_dir } => {
                write!(f, "cannot derive a parent directory of {}", project_dir)
            }
            Diagnostic::EmptyPort { field } => write!(f, "{} is empty", field),
        }
    }
}

pub fn diagnostics(config: &Configuration, resolved: &Resolved) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    if resolved.teleop_port.is_empty() {
        out.push(Diagnostic::EmptyPort {
            field: "teleop_port",
        });
    }
    if resolved.robot_port.is_empty() {
        out.push(Diagnostic::EmptyPort {
            field: "robot_port",
        });
    }
    if resolved.project_dir.is_empty() {
        out.push(Diagnostic::EmptyProjectDir);
    } else if resolved.workspace_parent.is_empty() {
        out.push(Diagnostic::NoWorkspaceParent {
            project_dir: resolved.project_dir.clone(),
        });
    }
    if config.repo().is_none() {
        out.push(Diagnostic::InvalidRepoId {
            value: config.raw_repo_id(),
        });
    }
    out
}
