//! Keeps the LeRobot docs' code samples consistent with a handful of user
//! inputs: ports, project directory, dataset repo id and a few flags.

pub mod derive;
pub mod error;
pub mod migrate;
pub mod model;
pub mod normalize;
pub mod options;
pub mod render;
pub mod scan;
pub mod session;
pub mod settings;
pub mod store;
pub mod token;
pub mod variant;

pub use derive::{derive, Diagnostic, Resolved};
pub use error::{SettingsError, StoreError, UnknownField};
pub use migrate::{migrate, KeySpace, Migration, PersistedState, SCHEMA_VERSION};
pub use model::{Configuration, DocDefaults};
pub use normalize::RepoId;
pub use render::RenderPlan;
pub use scan::{scan_defaults, Baseline};
pub use session::{EditOutcome, Field, Fragment, FragmentId, Session};
pub use settings::{Fallbacks, Settings};
pub use store::{JsonFileStore, KvStore, MemoryStore, SafeStore};
pub use token::Token;

/// Renders each template against `config`, in input order.
pub fn render_fragments<'a, I>(
    templates: I,
    config: &Configuration,
    baseline: &Baseline,
) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let resolved = derive(config, &baseline.defaults);
    let plan = RenderPlan::new(baseline, &resolved);
    templates.into_iter().map(|t| plan.render(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_fragments_matches_scenario() {
        let templates = [
            "lerobot-record --dataset.repo_id=local/1cam_test \
             --dataset.root=/home/jetson/lerobot/local/1cam_test",
            "rm -rf /home/jetson/lerobot/local/eval_1cam_test",
        ];
        let baseline = scan_defaults(templates, &Fallbacks::default());
        let mut config = baseline.defaults.config();
        config.project_dir = "/home/x/lerobot".to_string();
        config.set_repo(RepoId::parse("alice/demo").as_ref());

        let out = render_fragments(templates, &config, &baseline);
        assert_eq!(
            out[0],
            "lerobot-record --dataset.repo_id=alice/demo \
             --dataset.root=/home/x/lerobot/alice/demo"
        );
        assert_eq!(out[1], "rm -rf /home/x/lerobot/alice/eval_demo");

        let mut reversed = render_fragments(templates.iter().rev().copied(), &config, &baseline);
        reversed.reverse();
        assert_eq!(reversed, out);
    }
}
