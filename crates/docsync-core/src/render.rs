//! Template rendering.
//!
//! A render always starts from the fragment's original template. Inside one
//! render every inserted value is locked: later steps only look at text that
//! came from the template, so a new value that happens to contain an old one
//! is never rewritten twice.

use crate::derive::Resolved;
use crate::normalize::{
    bool_str, ends_with_project_folder, last_segment, normalize_path, parent_dir, quote_of,
};
use crate::options::{Slot, COMPILED, DIR_LINE, RM_LINE};
use crate::scan::Baseline;
use crate::token::Token;
use crate::variant::{base_slug, classify, Variant};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

static LOOSE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Z][A-Z0-9_]*)\s*\}\}?|\{\s*([A-Z][A-Z0-9_]*)\s*\}\}")
        .expect("loose token pattern")
});

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Z][A-Z0-9_]*)\}\}").expect("token pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
struct Piece {
    text: String,
    locked: bool,
}

impl Piece {
    fn open(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            locked: false,
        }
    }

    fn locked(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            locked: true,
        }
    }
}

struct Draft {
    pieces: Vec<Piece>,
}

impl Draft {
    fn new(template: &str) -> Self {
        Self {
            pieces: vec![Piece::open(template)],
        }
    }

    /// Runs `pattern` over every unlocked piece. `replace` returns the pieces
    /// standing in for the whole match, or `None` to keep it. With
    /// `whole_lines`, a match must not touch a piece boundary that sits
    /// mid-line.
    fn rewrite<F>(&mut self, pattern: &Regex, whole_lines: bool, mut replace: F)
    where
        F: FnMut(&Captures<'_>) -> Option<Vec<Piece>>,
    {
        let pieces = std::mem::take(&mut self.pieces);
        let mut out: Vec<Piece> = Vec::with_capacity(pieces.len());
        for (idx, piece) in pieces.iter().enumerate() {
            if piece.locked {
                out.push(piece.clone());
                continue;
            }
            let text = piece.text.as_str();
            let starts_line = idx == 0 || pieces[idx - 1].text.ends_with('\n');
            let ends_line = pieces
                .get(idx + 1)
                .map_or(true, |next| next.text.starts_with(|c| c == '\r' || c == '\n'));
            let mut last = 0;
            for caps in pattern.captures_iter(text) {
                let Some(m) = caps.get(0) else { continue };
                if whole_lines
                    && ((m.start() == 0 && !starts_line) || (m.end() == text.len() && !ends_line))
                {
                    continue;
                }
                let Some(replacement) = replace(&caps) else {
                    continue;
                };
                if m.start() > last {
                    out.push(Piece::open(&text[last..m.start()]));
                }
                out.extend(replacement);
                last = m.end();
            }
            if last < text.len() {
                out.push(Piece::open(&text[last..]));
            }
        }
        self.pieces = merge_open(out);
    }

    fn finish(self) -> String {
        self.pieces.into_iter().map(|p| p.text).collect()
    }
}

fn merge_open(pieces: Vec<Piece>) -> Vec<Piece> {
    let mut out: Vec<Piece> = Vec::with_capacity(pieces.len());
    for piece in pieces.into_iter().filter(|p| !p.text.is_empty()) {
        match out.last_mut() {
            Some(prev) if !prev.locked && !piece.locked => prev.text.push_str(&piece.text),
            _ => out.push(piece),
        }
    }
    out
}

fn requote(original: &str, value: &str) -> String {
    match quote_of(original) {
        Some(q) => format!("{}{}{}", q, value, q),
        None => value.to_string(),
    }
}

fn is_under(path: &str, root: &str) -> bool {
    if root == "/" {
        return path.len() > 1 && path.starts_with('/');
    }
    path.len() > root.len() + 1 && path.starts_with(root) && path[root.len()..].starts_with('/')
}

/// Everything a render needs besides the template: the document baseline
/// (old values), the newly resolved values, and the compiled literal table.
pub struct RenderPlan<'a> {
    baseline: &'a Baseline,
    resolved: &'a Resolved,
    literals: Option<(Regex, HashMap<String, String>)>,
}

impl<'a> RenderPlan<'a> {
    pub fn new(baseline: &'a Baseline, resolved: &'a Resolved) -> Self {
        let literals = literal_table(baseline, resolved);
        Self {
            baseline,
            resolved,
            literals,
        }
    }

    pub fn render(&self, template: &str) -> String {
        render(template, self)
    }

    fn option_value(&self, slot: Slot, original: &str) -> String {
        let r = self.resolved;
        let value: &str = match slot {
            Slot::TeleopPort => &r.teleop_port,
            Slot::RobotPort => &r.robot_port,
            Slot::DatasetRepoId => match classify(original) {
                Variant::Eval => &r.eval_repo_id,
                Variant::Normal => &r.repo_id,
            },
            Slot::DatasetRoot | Slot::DatasetPath => match classify(original) {
                Variant::Eval => &r.eval_dataset_dir,
                Variant::Normal
                    if normalize_path(original)
                        == normalize_path(&self.baseline.defaults.dataset_root) =>
                {
                    &r.dataset_root
                }
                Variant::Normal => &r.dataset_dir,
            },
            Slot::PolicyType => "",
            Slot::OutputDir => &r.output_dir,
            Slot::JobName => &r.run_name,
            Slot::PushToHub => bool_str(r.push_to_hub),
            Slot::WandbEnable => bool_str(r.wandb_enable),
        };
        value.to_string()
    }

    fn remove_target(&self, path: &str) -> Option<&str> {
        let old_root = normalize_path(&self.baseline.defaults.dataset_root);
        if old_root.is_empty() || !is_under(path, &old_root) {
            return None;
        }
        let target = match classify(path) {
            Variant::Eval => &self.resolved.eval_dataset_dir,
            Variant::Normal => &self.resolved.dataset_dir,
        };
        Some(target.as_str()).filter(|t| !t.is_empty())
    }

    fn directory_target(&self, path: &str) -> Option<&str> {
        let old = &self.baseline.resolved;
        let new = self.resolved;
        let pairs: [(&str, &str); 5] = [
            (&old.dataset_dir, &new.dataset_dir),
            (&old.eval_dataset_dir, &new.eval_dataset_dir),
            (&old.project_dir, &new.project_dir),
            (&old.dataset_root, &new.dataset_root),
            (&old.workspace_parent, &new.workspace_parent),
        ];
        let target = pairs
            .into_iter()
            .find(|(before, _)| !before.is_empty() && *before == path)
            .map(|(_, after)| after)
            .or_else(|| self.dataset_variant_target(path))
            .or_else(|| ends_with_project_folder(path).then_some(new.project_dir.as_str()))?;
        Some(target).filter(|t| !t.is_empty())
    }

    /// A sibling of the old dataset dir naming the same dataset in either
    /// variant, e.g. `<owner dir>/1cam_test_eval`.
    fn dataset_variant_target(&self, path: &str) -> Option<&str> {
        let old_dir = &self.baseline.resolved.dataset_dir;
        let slug = self.baseline.defaults.slug();
        if old_dir.is_empty() || slug.is_empty() || parent_dir(path) != parent_dir(old_dir) {
            return None;
        }
        if base_slug(last_segment(path)) != slug {
            return None;
        }
        let target = match classify(path) {
            Variant::Eval => &self.resolved.eval_dataset_dir,
            Variant::Normal => &self.resolved.dataset_dir,
        };
        Some(target.as_str())
    }
}

/// Old value -> new value for free-text mentions, matched longest first in a
/// single pass. Group 1 is the old value, group 2 the character after it,
/// which must not continue a path segment.
fn literal_table(
    baseline: &Baseline,
    resolved: &Resolved,
) -> Option<(Regex, HashMap<String, String>)> {
    let old = &baseline.resolved;
    let defaults = &baseline.defaults;
    let candidates = [
        (old.eval_dataset_dir.clone(), resolved.eval_dataset_dir.clone()),
        (old.dataset_dir.clone(), resolved.dataset_dir.clone()),
        (normalize_path(&defaults.output_dir), resolved.output_dir.clone()),
        (defaults.run_name.trim().to_string(), resolved.run_name.clone()),
    ];
    let mut table: HashMap<String, String> = HashMap::new();
    for (before, after) in candidates {
        if before.is_empty() || after.is_empty() || before == after {
            continue;
        }
        table.entry(before).or_insert(after);
    }
    if table.is_empty() {
        return None;
    }
    let mut needles: Vec<&String> = table.keys().collect();
    needles.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = needles
        .iter()
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = Regex::new(&format!(r"({})([^A-Za-z0-9_\-]|$)", alternation)).ok()?;
    Some((pattern, table))
}

pub fn render(template: &str, plan: &RenderPlan<'_>) -> String {
    let resolved = plan.resolved;
    let mut draft = Draft::new(template);

    // 1. loose delimiters around known names become canonical
    draft.rewrite(&LOOSE_TOKEN, false, |caps| {
        let name = caps.get(1).or_else(|| caps.get(2))?.as_str();
        let token = Token::from_name(name)?;
        let canonical = token.placeholder();
        if &caps[0] == canonical {
            return None;
        }
        Some(vec![Piece::open(canonical)])
    });

    // 2. placeholders; empty values stay visible
    draft.rewrite(&TOKEN, false, |caps| {
        let token = Token::from_name(&caps[1])?;
        let value = resolved.value(token);
        if value.is_empty() {
            return None;
        }
        Some(vec![Piece::locked(value)])
    });

    // 3./4. option values, evaluation-aware where the option has a variant
    for c in COMPILED.iter().filter(|c| c.spec.rewrite) {
        draft.rewrite(&c.pattern, false, |caps| {
            let original = &caps[2];
            let value = plan.option_value(c.spec.slot, original);
            if value.is_empty() {
                return None;
            }
            Some(vec![
                Piece::open(&caps[1]),
                Piece::locked(requote(original, &value)),
            ])
        });
    }

    // 5. old literal values anywhere else
    if let Some((pattern, table)) = &plan.literals {
        draft.rewrite(pattern, false, |caps| {
            table
                .get(&caps[1])
                .map(|after| vec![Piece::locked(after.clone()), Piece::open(&caps[2])])
        });
    }

    // 6. shell lines
    draft.rewrite(&RM_LINE, true, |caps| {
        let original = &caps[2];
        let target = plan.remove_target(&normalize_path(original))?;
        Some(vec![
            Piece::open(&caps[1]),
            Piece::locked(requote(original, target)),
            Piece::open(&caps[3]),
        ])
    });
    draft.rewrite(&DIR_LINE, true, |caps| {
        let original = &caps[2];
        let target = plan.directory_target(&normalize_path(original))?;
        Some(vec![
            Piece::open(&caps[1]),
            Piece::locked(requote(original, target)),
            Piece::open(&caps[3]),
        ])
    });

    draft.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::derive;
    use crate::model::Configuration;
    use crate::scan::scan_defaults;
    use crate::settings::Fallbacks;

    const RECORD: &str = "\
lerobot-record \\
  --robot.port=/dev/ttyACM0 \\
  --teleop.port=/dev/ttyACM1 \\
  --dataset.repo_id=local/1cam_test \\
  --dataset.root=/home/jetson/lerobot/local/1cam_test \\
  --dataset.push_to_hub=false";

    const EVAL: &str = "\
lerobot-record \\
  --robot.port /dev/ttyACM0 \\
  --dataset.repo_id local/eval_1cam_test \\
  --dataset.root=\"/home/jetson/lerobot/local/eval_1cam_test\" \\
  --policy.path=outputs/train/act_1cam_test/checkpoints/last/pretrained_model";

    const TRAIN: &str = "\
lerobot-train \\
  --dataset.repo_id=local/1cam_test \\
  --policy.type=act \\
  --output_dir=outputs/train/act_1cam_test \\
  --job_name=act_1cam_test \\
  --wandb.enable=false";

    const CLEANUP: &str = "\
cd ~/lerobot
rm -rf /home/jetson/lerobot/local/eval_1cam_test
rm -rf /home/jetson/lerobot/local/1cam_test
rm -rf /tmp/scratch";

    fn config(project: &str, owner: &str, name: &str) -> Configuration {
        Configuration {
            teleop_port: "/dev/ttyACM1".to_string(),
            robot_port: "/dev/ttyACM0".to_string(),
            project_dir: project.to_string(),
            dataset_owner: owner.to_string(),
            dataset_name: name.to_string(),
            push_to_hub: false,
            wandb_enable: false,
        }
    }

    fn render_doc(fragments: &[&str], config: &Configuration) -> Vec<String> {
        let baseline = scan_defaults(fragments.iter().copied(), &Fallbacks::default());
        let resolved = derive(config, &baseline.defaults);
        let plan = RenderPlan::new(&baseline, &resolved);
        fragments.iter().map(|t| plan.render(t)).collect()
    }

    #[test]
    fn dataset_options_follow_configuration() {
        let out = render_doc(&[RECORD], &config("/home/x/lerobot", "alice", "demo"));
        assert!(out[0].contains("--dataset.repo_id=alice/demo"), "{}", out[0]);
        assert!(
            out[0].contains("--dataset.root=/home/x/lerobot/alice/demo"),
            "{}",
            out[0]
        );
        assert!(out[0].contains("--dataset.push_to_hub=false"));
    }

    #[test]
    fn evaluation_blocks_get_evaluation_values() {
        let out = render_doc(&[RECORD, EVAL], &config("/home/x/lerobot", "alice", "demo"));
        assert!(out[1].contains("--dataset.repo_id alice/eval_demo"), "{}", out[1]);
        assert!(
            out[1].contains("--dataset.root=\"/home/x/lerobot/alice/eval_demo\""),
            "{}",
            out[1]
        );
        assert!(
            out[1].contains(
                "--policy.path=outputs/train/act_demo/checkpoints/last/pretrained_model"
            ),
            "{}",
            out[1]
        );
        assert!(out[1].contains("--robot.port /dev/ttyACM0"));
    }

    #[test]
    fn remove_line_picks_variant_by_trailing_segment() {
        let out = render_doc(&[RECORD, CLEANUP], &config("/home/x/lerobot", "alice", "demo"));
        let lines: Vec<&str> = out[1].lines().collect();
        assert_eq!(lines[0], "cd /home/x/lerobot");
        assert_eq!(lines[1], "rm -rf /home/x/lerobot/alice/eval_demo");
        assert_eq!(lines[2], "rm -rf /home/x/lerobot/alice/demo");
        assert_eq!(lines[3], "rm -rf /tmp/scratch");
    }

    #[test]
    fn remove_line_alone_still_resolves_evaluation_dir() {
        let out = render_doc(
            &["rm -rf /home/jetson/lerobot/local/eval_1cam_test"],
            &config("/home/x/lerobot", "alice", "demo"),
        );
        assert_eq!(out[0], "rm -rf /home/x/lerobot/alice/eval_demo");
    }

    #[test]
    fn remove_line_under_root_with_unknown_name_is_rewritten() {
        let out = render_doc(
            &[RECORD, "sudo rm -r /home/jetson/lerobot/local/old_eval\n"],
            &config("/home/x/lerobot", "alice", "demo"),
        );
        assert_eq!(out[1], "sudo rm -r /home/x/lerobot/alice/eval_demo\n");
    }

    #[test]
    fn legacy_eval_suffix_paths_get_prefix_form() {
        let doc = [
            RECORD,
            "rm -rf /home/jetson/lerobot/local/1cam_test_eval\n\
             cd /home/jetson/lerobot/local/1cam_test_eval",
        ];
        let out = render_doc(&doc, &config("/home/x/lerobot", "alice", "demo"));
        assert_eq!(
            out[1],
            "rm -rf /home/x/lerobot/alice/eval_demo\ncd /home/x/lerobot/alice/eval_demo"
        );

        let out = render_doc(&doc, &config("/home/jetson/lerobot", "alice", "demo"));
        assert_eq!(
            out[1],
            "rm -rf /home/jetson/lerobot/alice/eval_demo\ncd /home/jetson/lerobot/alice/eval_demo"
        );
    }

    #[test]
    fn literal_values_only_match_whole_segments() {
        let doc = [
            RECORD,
            "ls /home/jetson/lerobot/local/1cam_test-old /home/jetson/lerobot/local/1cam_test/meta",
        ];
        let out = render_doc(&doc, &config("/home/x/lerobot", "alice", "demo"));
        assert_eq!(
            out[1],
            "ls /home/jetson/lerobot/local/1cam_test-old /home/x/lerobot/alice/demo/meta"
        );
    }

    #[test]
    fn hydra_dataset_path_follows_variant() {
        let doc = [
            RECORD,
            "python train.py dataset.path=/home/jetson/lerobot/local/1cam_test\n\
             python eval.py dataset.path=/home/jetson/lerobot/local/eval_1cam_test",
        ];
        let out = render_doc(&doc, &config("/home/x/lerobot", "alice", "demo"));
        assert_eq!(
            out[1],
            "python train.py dataset.path=/home/x/lerobot/alice/demo\n\
             python eval.py dataset.path=/home/x/lerobot/alice/eval_demo"
        );
    }

    #[test]
    fn training_paths_and_run_name_follow_dataset() {
        let doc = [
            RECORD,
            TRAIN,
            "Resume from outputs/train/act_1cam_test/checkpoints/last/pretrained_model/\
             train_config.json",
        ];
        let out = render_doc(&doc, &config("/home/x/lerobot", "alice", "demo"));
        assert!(out[1].contains("--output_dir=outputs/train/act_demo"), "{}", out[1]);
        assert!(out[1].contains("--job_name=act_demo"));
        assert!(out[1].contains("--policy.type=act"));
        assert_eq!(
            out[2],
            "Resume from outputs/train/act_demo/checkpoints/last/pretrained_model/train_config.json"
        );
    }

    #[test]
    fn new_value_containing_old_value_is_not_rewritten_twice() {
        let doc = [
            RECORD,
            TRAIN,
            "# data lives in /home/jetson/lerobot/local/1cam_test, run act_1cam_test",
        ];
        let out = render_doc(&doc, &config("/home/jetson/lerobot", "local", "1cam_test2"));
        assert!(
            out[0].contains("--dataset.root=/home/jetson/lerobot/local/1cam_test2 "),
            "{}",
            out[0]
        );
        assert!(out[1].contains("--output_dir=outputs/train/act_1cam_test2 "), "{}", out[1]);
        assert!(out[1].contains("--job_name=act_1cam_test2 "), "{}", out[1]);
        assert_eq!(
            out[2],
            "# data lives in /home/jetson/lerobot/local/1cam_test2, run act_1cam_test2"
        );
    }

    #[test]
    fn placeholders_are_replaced_and_empty_ones_stay_visible() {
        let doc = [
            "cd {{WORKSPACE_DIR}} && echo {{DATASET_DIR}} {{ TELEOP_PORT }} \
             {{NOT_A_TOKEN}} {{PUSH_TO_HUB}}",
            "--job_name={{TRAIN_RUN_NAME}} --dataset.repo_id={{EVAL_DATASET_REPO_ID}}",
        ];
        let out = render_doc(&doc, &config("/home/x/lerobot", "alice", "demo"));
        assert_eq!(
            out[0],
            "cd /home/x/lerobot && echo /home/x/lerobot/alice/demo /dev/ttyACM1 \
             {{NOT_A_TOKEN}} false"
        );
        assert_eq!(out[1], "--job_name=act_demo --dataset.repo_id=alice/eval_demo");

        let out = render_doc(&doc, &config("/home/x/lerobot", "alice", ""));
        assert!(out[0].contains("echo {{DATASET_DIR}} /dev/ttyACM1"), "{}", out[0]);
        assert_eq!(
            out[1],
            "--job_name={{TRAIN_RUN_NAME}} --dataset.repo_id={{EVAL_DATASET_REPO_ID}}"
        );
    }

    #[test]
    fn malformed_delimiters_are_normalized_for_known_names_only() {
        let doc = ["{{TELEOP_PORT} {ROBOT_PORT}} {{  DATASET_SLUG  }} { NOPE }} ${HOME}"];
        let out = render_doc(&doc, &config("/p/lerobot", "alice", "demo"));
        assert_eq!(out[0], "/dev/ttyACM1 /dev/ttyACM0 demo { NOPE }} ${HOME}");
    }

    #[test]
    fn directory_lines_map_old_directories_to_new_ones() {
        let doc = [
            RECORD,
            concat!(
                "cd /home/jetson/lerobot\n",
                "mkdir -p /home/jetson\n",
                "cd /home/jetson/lerobot/local/1cam_test\n",
                "cd /opt/other\n",
                "cd /home/jetson/lerobot && ls",
            ),
        ];
        let out = render_doc(&doc, &config("/home/x/lerobot", "alice", "demo"));
        let lines: Vec<&str> = out[1].lines().collect();
        assert_eq!(lines[0], "cd /home/x/lerobot");
        assert_eq!(lines[1], "mkdir -p /home/x");
        assert_eq!(lines[2], "cd /home/x/lerobot/alice/demo");
        assert_eq!(lines[3], "cd /opt/other");
        assert_eq!(lines[4], "cd /home/jetson/lerobot && ls");
    }

    #[test]
    fn boolean_flags_are_rewritten_in_both_styles() {
        let doc = ["--dataset.push_to_hub=false --wandb.enable true"];
        let mut c = config("/p/lerobot", "alice", "demo");
        c.push_to_hub = true;
        c.wandb_enable = false;
        let out = render_doc(&doc, &c);
        assert_eq!(out[0], "--dataset.push_to_hub=true --wandb.enable false");
    }

    #[test]
    fn render_is_idempotent_and_order_independent() {
        let doc = [RECORD, EVAL, TRAIN, CLEANUP];
        let c = config("/home/x/lerobot", "alice", "demo");
        let baseline = scan_defaults(doc.iter().copied(), &Fallbacks::default());
        let resolved = derive(&c, &baseline.defaults);
        let plan = RenderPlan::new(&baseline, &resolved);
        let forward: Vec<String> = doc.iter().map(|t| plan.render(t)).collect();
        let again: Vec<String> = doc.iter().map(|t| plan.render(t)).collect();
        assert_eq!(forward, again);
        let mut backward: Vec<String> = doc.iter().rev().map(|t| plan.render(t)).collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn unchanged_configuration_leaves_document_as_is() {
        let doc = [RECORD, EVAL, TRAIN, CLEANUP];
        let baseline = scan_defaults(doc.iter().copied(), &Fallbacks::default());
        let resolved = derive(&baseline.defaults.config(), &baseline.defaults);
        let plan = RenderPlan::new(&baseline, &resolved);
        for t in doc {
            assert_eq!(plan.render(t), t);
        }
    }

    #[test]
    fn piece_boundaries_block_partial_line_matches() {
        let mut draft = Draft::new("cd /a");
        draft.pieces.push(Piece::locked("/x"));
        draft.pieces.push(Piece::open("\ncd /home/jetson/lerobot\n"));
        let mut hits = Vec::new();
        draft.rewrite(&DIR_LINE, true, |caps| {
            hits.push(caps[2].to_string());
            None
        });
        assert_eq!(hits, vec!["/home/jetson/lerobot".to_string()]);
    }
}
