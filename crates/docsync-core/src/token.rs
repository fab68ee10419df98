//! Placeholder vocabulary. Tokens are written `{{NAME}}`, case-sensitive.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    TeleopPort,
    RobotPort,
    WorkspaceDir,
    DatasetRepoId,
    DatasetOwner,
    DatasetName,
    DatasetSlug,
    DatasetDir,
    /// Older documents used `DATASET_ROOT` where the dataset directory is meant.
    DatasetRoot,
    TrainRunName,
    TrainOutputDir,
    TrainConfigPath,
    PolicyPath,
    ModelsDir,
    ModelDir,
    PushToHub,
    WandbEnable,
    EvalDatasetRepoId,
    EvalDatasetDir,
    EvalDatasetSlug,
}

impl Token {
    pub const ALL: [Token; 20] = [
        Token::TeleopPort,
        Token::RobotPort,
        Token::WorkspaceDir,
        Token::DatasetRepoId,
        Token::DatasetOwner,
        Token::DatasetName,
        Token::DatasetSlug,
        Token::DatasetDir,
        Token::DatasetRoot,
        Token::TrainRunName,
        Token::TrainOutputDir,
        Token::TrainConfigPath,
        Token::PolicyPath,
        Token::ModelsDir,
        Token::ModelDir,
        Token::PushToHub,
        Token::WandbEnable,
        Token::EvalDatasetRepoId,
        Token::EvalDatasetDir,
        Token::EvalDatasetSlug,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Token::TeleopPort => "TELEOP_PORT",
            Token::RobotPort => "ROBOT_PORT",
            Token::WorkspaceDir => "WORKSPACE_DIR",
            Token::DatasetRepoId => "DATASET_REPO_ID",
            Token::DatasetOwner => "DATASET_OWNER",
            Token::DatasetName => "DATASET_NAME",
            Token::DatasetSlug => "DATASET_SLUG",
            Token::DatasetDir => "DATASET_DIR",
            Token::DatasetRoot => "DATASET_ROOT",
            Token::TrainRunName => "TRAIN_RUN_NAME",
            Token::TrainOutputDir => "TRAIN_OUTPUT_DIR",
            Token::TrainConfigPath => "TRAIN_CONFIG_PATH",
            Token::PolicyPath => "POLICY_PATH",
            Token::ModelsDir => "MODELS_DIR",
            Token::ModelDir => "MODEL_DIR",
            Token::PushToHub => "PUSH_TO_HUB",
            Token::WandbEnable => "WANDB_ENABLE",
            Token::EvalDatasetRepoId => "EVAL_DATASET_REPO_ID",
            Token::EvalDatasetDir => "EVAL_DATASET_DIR",
            Token::EvalDatasetSlug => "EVAL_DATASET_SLUG",
        }
    }

    pub fn from_name(name: &str) -> Option<Token> {
        Token::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn placeholder(self) -> String {
        format!("{{{{{}}}}}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_and_are_unique() {
        let mut seen = std::collections::BTreeSet::new();
        for t in Token::ALL {
            assert_eq!(Token::from_name(t.name()), Some(t));
            assert!(seen.insert(t.name()), "duplicate token {}", t.name());
        }
        assert_eq!(Token::from_name("teleop_port"), None);
        assert_eq!(Token::from_name("UNKNOWN"), None);
    }

    #[test]
    fn placeholder_uses_double_braces() {
        assert_eq!(Token::TrainRunName.placeholder(), "{{TRAIN_RUN_NAME}}");
    }
}
