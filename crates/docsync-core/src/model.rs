use crate::normalize::RepoId;
use serde::{Deserialize, Serialize};

/// User-controlled inputs, current schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub teleop_port: String,
    pub robot_port: String,
    /// The LeRobot checkout itself (not its parent). A pasted dataset path is
    /// accepted too; derivation strips the dataset suffix.
    pub project_dir: String,
    pub dataset_owner: String,
    pub dataset_name: String,
    pub push_to_hub: bool,
    pub wandb_enable: bool,
}

impl Configuration {
    pub fn repo(&self) -> Option<RepoId> {
        RepoId::from_parts(self.dataset_owner.trim(), self.dataset_name.trim())
    }

    /// `owner/name` as typed, even when it does not parse.
    pub fn raw_repo_id(&self) -> String {
        match (self.dataset_owner.is_empty(), self.dataset_name.is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.dataset_owner.clone(),
            _ => format!("{}/{}", self.dataset_owner, self.dataset_name),
        }
    }

    pub fn set_repo(&mut self, repo: Option<&RepoId>) {
        match repo {
            Some(r) => {
                self.dataset_owner = r.owner.clone();
                self.dataset_name = r.name.clone();
            }
            None => {
                self.dataset_owner.clear();
                self.dataset_name.clear();
            }
        }
    }
}

/// What a document's own samples imply, inferred once per load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocDefaults {
    pub teleop_port: String,
    pub robot_port: String,
    pub project_dir: String,
    /// Base directory datasets live under (`<root>/<owner>/<name>`).
    pub dataset_root: String,
    pub repo: Option<RepoId>,
    pub policy_type: String,
    pub run_name: String,
    pub output_dir: String,
    pub push_to_hub: bool,
    pub wandb_enable: bool,
}

impl DocDefaults {
    pub fn slug(&self) -> &str {
        self.repo.as_ref().map(|r| r.name.as_str()).unwrap_or("")
    }

    pub fn config(&self) -> Configuration {
        let mut config = Configuration {
            teleop_port: self.teleop_port.clone(),
            robot_port: self.robot_port.clone(),
            project_dir: self.project_dir.clone(),
            push_to_hub: self.push_to_hub,
            wandb_enable: self.wandb_enable,
            ..Configuration::default()
        };
        config.set_repo(self.repo.as_ref());
        config
    }
}
