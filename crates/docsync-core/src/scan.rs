//! Default inference from a document's own code samples.

use crate::derive::{derive, OutputLayout, Resolved};
use crate::model::DocDefaults;
use crate::normalize::{
    ends_with_project_folder, has_placeholder, normalize_bool, normalize_path,
    project_dir_from_root, strip_path_suffix, strip_quotes, RepoId,
};
use crate::options::{Slot, COMPILED, DIR_LINE, TRAIN_BASE};
use crate::settings::Fallbacks;
use crate::variant::{base_slug, classify, eval_slug, Variant, LEGACY_EVAL_SUFFIX};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Defaults plus the values derived from them, computed once per load. The
/// resolved half is the "before" side of every literal replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Baseline {
    pub defaults: DocDefaults,
    pub resolved: Resolved,
}

/// First accepted value per field, in fragment order.
#[derive(Debug, Default)]
struct Hits {
    slots: BTreeMap<Slot, String>,
    eval_repo_id: Option<String>,
    project_dir: Option<String>,
    train_base: Option<String>,
}

impl Hits {
    fn is_complete(&self) -> bool {
        let options_done = COMPILED.iter().all(|c| match c.spec.slot {
            Slot::DatasetPath => {
                self.slots.contains_key(&Slot::DatasetPath)
                    || self.slots.contains_key(&Slot::DatasetRoot)
            }
            slot => self.slots.contains_key(&slot),
        });
        options_done && self.project_dir.is_some()
    }

    fn scan(&mut self, text: &str) {
        for c in COMPILED.iter() {
            let slot = c.spec.slot;
            if slot == Slot::DatasetRepoId {
                self.scan_repo_ids(&c.pattern, text);
                continue;
            }
            if self.slots.contains_key(&slot) {
                continue;
            }
            if let Some(value) = first_literal(c.pattern.captures_iter(text).map(|caps| {
                caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string()
            })) {
                debug!(option = c.spec.name, value = %value, "scan hit");
                self.slots.insert(slot, value);
            }
        }
        if self.project_dir.is_none() {
            self.project_dir = first_literal(
                DIR_LINE
                    .captures_iter(text)
                    .map(|caps| normalize_path(&caps[2]))
                    .filter(|p| ends_with_project_folder(p)),
            );
        }
        if self.train_base.is_none() {
            self.train_base =
                first_literal(TRAIN_BASE.captures_iter(text).map(|caps| caps[1].to_string()));
        }
    }

    // Evaluation ids are tracked apart so an evaluation block appearing first
    // never becomes the recording dataset.
    fn scan_repo_ids(&mut self, pattern: &regex::Regex, text: &str) {
        if self.slots.contains_key(&Slot::DatasetRepoId) {
            return;
        }
        for caps in pattern.captures_iter(text) {
            let value = strip_quotes(&caps[2]).to_string();
            if has_placeholder(&value) {
                continue;
            }
            match classify(&value) {
                Variant::Eval => {
                    self.eval_repo_id.get_or_insert(value);
                }
                Variant::Normal => {
                    debug!(value = %value, "scan hit dataset.repo_id");
                    self.slots.insert(Slot::DatasetRepoId, value);
                    return;
                }
            }
        }
    }
}

fn first_literal(values: impl Iterator<Item = String>) -> Option<String> {
    values
        .map(|v| strip_quotes(&v).to_string())
        .find(|v| !v.is_empty() && !has_placeholder(v))
}

pub fn scan_defaults<'a, I>(fragments: I, fallbacks: &Fallbacks) -> Baseline
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hits = Hits::default();
    let mut scanned = 0usize;
    for text in fragments {
        scanned += 1;
        hits.scan(text);
        if hits.is_complete() {
            debug!(scanned, "all fields found, stopping scan");
            break;
        }
    }
    let defaults = infer(hits, fallbacks);
    let resolved = derive(&defaults.config(), &defaults);
    Baseline { defaults, resolved }
}

fn infer(mut hits: Hits, fallbacks: &Fallbacks) -> DocDefaults {
    let mut take = |slot: Slot| hits.slots.remove(&slot).unwrap_or_default();

    let teleop_port = or_fallback(take(Slot::TeleopPort), &fallbacks.teleop_port);
    let robot_port = or_fallback(take(Slot::RobotPort), &fallbacks.robot_port);
    let repo_raw = take(Slot::DatasetRepoId);
    let root_raw = take(Slot::DatasetRoot);
    let path_raw = take(Slot::DatasetPath);
    let policy_type = or_fallback(take(Slot::PolicyType), &fallbacks.policy_type);
    let output_raw = take(Slot::OutputDir);
    let job_name = take(Slot::JobName);
    let push_raw = take(Slot::PushToHub);
    let wandb_raw = take(Slot::WandbEnable);

    let repo = RepoId::parse(&repo_raw)
        .or_else(|| {
            hits.eval_repo_id
                .as_deref()
                .and_then(RepoId::parse)
                .and_then(|r| r.with_name(&base_slug(&r.name)))
        })
        .or_else(|| RepoId::parse(&fallbacks.dataset_repo_id));

    let found_root = [root_raw, path_raw]
        .into_iter()
        .map(|r| normalize_path(&r))
        .find(|r| !r.is_empty())
        .map(|r| strip_repo_suffix(&r, repo.as_ref()));

    let project_dir = hits
        .project_dir
        .take()
        .or_else(|| found_root.as_deref().map(project_dir_from_root))
        .unwrap_or_else(|| normalize_path(&fallbacks.project_dir));
    let dataset_root = found_root.unwrap_or_else(|| project_dir.clone());

    let output_found = if output_raw.is_empty() {
        hits.train_base.take().unwrap_or_default()
    } else {
        output_raw
    };
    let output_found = normalize_path(&output_found);
    let slug = repo.as_ref().map(|r| r.name.clone()).unwrap_or_default();
    let run_name = if !job_name.is_empty() {
        job_name
    } else if let Some(seg) = OutputLayout::detect(&output_found, "").run_segment(&output_found) {
        seg
    } else if !policy_type.is_empty() && !slug.is_empty() {
        format!("{}_{}", policy_type, slug)
    } else {
        slug
    };
    let output_dir = if !output_found.is_empty() {
        output_found
    } else if !run_name.is_empty() {
        format!("models/{}", run_name)
    } else {
        String::new()
    };

    DocDefaults {
        teleop_port,
        robot_port,
        project_dir,
        dataset_root,
        repo,
        policy_type,
        run_name,
        output_dir,
        push_to_hub: normalize_bool(&push_raw),
        wandb_enable: normalize_bool(&wandb_raw),
    }
}

fn or_fallback(found: String, fallback: &str) -> String {
    if found.is_empty() {
        fallback.trim().to_string()
    } else {
        found
    }
}

/// A `--dataset.root` pointing at the dataset itself is reduced to the base
/// directory datasets live under.
fn strip_repo_suffix(root: &str, repo: Option<&RepoId>) -> String {
    if let Some(r) = repo {
        let legacy = format!("{}{}", r.name, LEGACY_EVAL_SUFFIX);
        for name in [r.name.clone(), eval_slug(&r.name), legacy] {
            if let Some(head) = strip_path_suffix(root, &format!("{}/{}", r.owner, name)) {
                return head;
            }
        }
    }
    root.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = "\
lerobot-record \\
  --robot.port=/dev/ttyACM0 \\
  --teleop.port=/dev/ttyACM1 \\
  --dataset.repo_id=local/1cam_test \\
  --dataset.root=/home/jetson/lerobot/local/1cam_test \\
  --dataset.push_to_hub=false";

    const EVAL: &str = "\
lerobot-record \\
  --dataset.repo_id=local/eval_1cam_test \\
  --dataset.root=/home/jetson/lerobot/local/eval_1cam_test";

    const TRAIN: &str = "\
lerobot-train \\
  --dataset.repo_id=local/1cam_test \\
  --policy.type=act \\
  --output_dir=outputs/train/act_1cam_test \\
  --job_name=act_1cam_test \\
  --wandb.enable=true";

    fn scan(fragments: &[&str]) -> DocDefaults {
        scan_defaults(fragments.iter().copied(), &Fallbacks::default()).defaults
    }

    #[test]
    fn empty_document_uses_fallbacks() {
        let d = scan(&[]);
        assert_eq!(d.teleop_port, "/dev/ttyACM1");
        assert_eq!(d.robot_port, "/dev/ttyACM0");
        assert_eq!(d.project_dir, "/home/jetson/lerobot");
        assert_eq!(d.dataset_root, "/home/jetson/lerobot");
        assert_eq!(d.repo, RepoId::parse("local/1cam_test"));
        assert_eq!(d.policy_type, "act");
        assert_eq!(d.run_name, "act_1cam_test");
        assert_eq!(d.output_dir, "models/act_1cam_test");
        assert!(!d.push_to_hub);
        assert!(!d.wandb_enable);
    }

    #[test]
    fn full_dataset_root_is_reduced_to_base() {
        let d = scan(&[RECORD]);
        assert_eq!(d.repo, RepoId::parse("local/1cam_test"));
        assert_eq!(d.dataset_root, "/home/jetson/lerobot");
        assert_eq!(d.project_dir, "/home/jetson/lerobot");
    }

    #[test]
    fn evaluation_block_first_does_not_become_recording_dataset() {
        let d = scan(&[EVAL, RECORD]);
        assert_eq!(d.repo, RepoId::parse("local/1cam_test"));
        let d = scan(&[EVAL]);
        assert_eq!(d.repo, RepoId::parse("local/1cam_test"));
        assert_eq!(d.dataset_root, "/home/jetson/lerobot");
    }

    #[test]
    fn training_options_are_read() {
        let d = scan(&[RECORD, TRAIN]);
        assert_eq!(d.run_name, "act_1cam_test");
        assert_eq!(d.output_dir, "outputs/train/act_1cam_test");
        assert!(d.wandb_enable);
        assert!(!d.push_to_hub);
    }

    #[test]
    fn output_dir_falls_back_to_train_mention() {
        let d = scan(&["see outputs/train/act_foo/checkpoints/last/pretrained_model"]);
        assert_eq!(d.output_dir, "outputs/train/act_foo");
        assert_eq!(d.run_name, "act_foo");
    }

    #[test]
    fn placeholder_values_are_never_adopted() {
        let d = scan(&[
            "--teleop.port={{TELEOP_PORT}} --teleop.port=/dev/ttyUSB3",
            "--robot.port {{ROBOT_PORT}}",
            "--dataset.repo_id={{DATASET_REPO_ID}}",
        ]);
        assert_eq!(d.teleop_port, "/dev/ttyUSB3");
        assert_eq!(d.robot_port, "/dev/ttyACM0");
        assert_eq!(d.repo, RepoId::parse("local/1cam_test"));
    }

    #[test]
    fn project_dir_comes_from_cd_or_mkdir_line() {
        let d = scan(&["mkdir -p ~/lerobot\ncd ~/lerobot", RECORD]);
        assert_eq!(d.project_dir, "~/lerobot");
        let d = scan(&["cd /opt/work\n", "cd /srv/lerobot/\n"]);
        assert_eq!(d.project_dir, "/srv/lerobot");
    }

    #[test]
    fn hydra_dataset_path_is_a_root_source() {
        let d = scan(&[
            "python train.py dataset.path=/home/jetson/lerobot/datasets/bob/run7 \
             --dataset.repo_id=bob/run7",
        ]);
        assert_eq!(d.dataset_root, "/home/jetson/lerobot/datasets");
        assert_eq!(d.project_dir, "/home/jetson/lerobot");
    }

    #[test]
    fn first_match_per_field_is_independent_of_early_stop() {
        let a = "--teleop.port=/dev/A --robot.port=/dev/B";
        let b = "--teleop.port=/dev/C --dataset.repo_id=x/y";
        assert_eq!(scan(&[a, b]).teleop_port, "/dev/A");
        assert_eq!(scan(&[b, a]).teleop_port, "/dev/C");
        assert_eq!(scan(&[a, b]).repo, scan(&[b, a]).repo);
    }

    #[test]
    fn fallbacks_come_from_settings() {
        let fallbacks = Fallbacks {
            teleop_port: "/dev/ttyUSB0".to_string(),
            dataset_repo_id: "me/base".to_string(),
            ..Fallbacks::default()
        };
        let d = scan_defaults(std::iter::empty(), &fallbacks).defaults;
        assert_eq!(d.teleop_port, "/dev/ttyUSB0");
        assert_eq!(d.run_name, "act_base");
    }
}
