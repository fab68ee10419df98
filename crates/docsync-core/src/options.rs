//! Declarative table of the command-line options the scanner reads and the
//! renderer rewrites. One row per option; both `--opt=value` and
//! `--opt value` spellings come from the same compiled pattern.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionForm {
    /// `--name=value` or `--name value`.
    Flag,
    /// Hydra override `name=value` (or `name value`) without leading dashes.
    Hydra,
}

/// Which configuration field an option carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    TeleopPort,
    RobotPort,
    DatasetRepoId,
    DatasetRoot,
    DatasetPath,
    PolicyType,
    OutputDir,
    JobName,
    PushToHub,
    WandbEnable,
}

#[derive(Debug)]
pub struct OptionSpec {
    pub name: &'static str,
    pub form: OptionForm,
    pub slot: Slot,
    /// Scan-only options feed inference but are never rewritten.
    pub rewrite: bool,
}

impl OptionSpec {
    const fn flag(name: &'static str, slot: Slot) -> Self {
        Self { name, form: OptionForm::Flag, slot, rewrite: true }
    }

    const fn hydra(name: &'static str, slot: Slot) -> Self {
        Self { name, form: OptionForm::Hydra, slot, rewrite: true }
    }

    const fn scan_only(self) -> Self {
        Self { rewrite: false, ..self }
    }
}

pub static OPTIONS: &[OptionSpec] = &[
    OptionSpec::flag("teleop.port", Slot::TeleopPort),
    OptionSpec::flag("robot.port", Slot::RobotPort),
    OptionSpec::flag("dataset.repo_id", Slot::DatasetRepoId),
    OptionSpec::flag("dataset.root", Slot::DatasetRoot),
    OptionSpec::hydra("dataset.path", Slot::DatasetPath),
    OptionSpec::flag("policy.type", Slot::PolicyType).scan_only(),
    OptionSpec::flag("output_dir", Slot::OutputDir),
    OptionSpec::flag("job_name", Slot::JobName),
    OptionSpec::flag("dataset.push_to_hub", Slot::PushToHub),
    OptionSpec::flag("wandb.enable", Slot::WandbEnable),
];

/// A compiled table row. Group 1 is the prefix (kept verbatim on rewrite),
/// group 2 the value.
pub struct CompiledOption {
    pub spec: &'static OptionSpec,
    pub pattern: Regex,
}

// A lone `\` is a shell line continuation, never a value.
const VALUE: &str = r"([^\s\\]\S*)";

fn pattern_for(spec: &OptionSpec) -> String {
    let name = regex::escape(spec.name);
    match spec.form {
        OptionForm::Flag => format!(r"(--{}(?:=|[ \t]+)){}", name, VALUE),
        OptionForm::Hydra => format!(r#"((?:^|[\s'"]){}(?:=|[ \t]+)){}"#, name, VALUE),
    }
}

pub static COMPILED: Lazy<Vec<CompiledOption>> = Lazy::new(|| {
    OPTIONS
        .iter()
        .map(|spec| CompiledOption {
            spec,
            pattern: Regex::new(&pattern_for(spec)).expect("option pattern"),
        })
        .collect()
});

/// Legacy training layout mentioned in free text, e.g.
/// `outputs/train/act_x/checkpoints/last/...`.
pub static TRAIN_BASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(outputs/train/[^/\s]+)").expect("train base pattern"));

/// Whole `cd <path>` / `mkdir -p <path>` line.
pub static DIR_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*(?:cd|mkdir[ \t]+-p)[ \t]+)(\S+)([ \t]*\r?)$")
        .expect("dir line pattern")
});

/// Whole recursive-remove line (`rm -rf`, `rm -fr`, `rm -r`, optionally via sudo).
pub static RM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?m)^([ \t]*(?:sudo[ \t]+)?rm[ \t]+-[a-zA-Z]*[rR][a-zA-Z]*[ \t]+)",
        r"(\S+)([ \t]*\r?)$"
    ))
    .expect("rm line pattern")
});

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(slot: Slot) -> &'static CompiledOption {
        COMPILED
            .iter()
            .find(|c| c.spec.slot == slot)
            .expect("slot in table")
    }

    #[test]
    fn flag_matches_equals_and_space_forms() {
        let re = &compiled(Slot::TeleopPort).pattern;
        let caps = re.captures("x --teleop.port=/dev/ttyACM1 y").expect("eq form");
        assert_eq!(&caps[1], "--teleop.port=");
        assert_eq!(&caps[2], "/dev/ttyACM1");
        let caps = re.captures("--teleop.port  /dev/ttyUSB0").expect("space form");
        assert_eq!(&caps[1], "--teleop.port  ");
        assert_eq!(&caps[2], "/dev/ttyUSB0");
    }

    #[test]
    fn flag_does_not_capture_line_continuation_or_next_line() {
        let re = &compiled(Slot::RobotPort).pattern;
        assert!(re.captures("--robot.port \\\n  --x=1").is_none());
        assert!(re.captures("--robot.port\n/dev/ttyACM0").is_none());
    }

    #[test]
    fn flag_names_are_matched_literally() {
        let re = &compiled(Slot::DatasetRoot).pattern;
        assert!(re.captures("--datasetXroot=/a").is_none());
        assert!(re.captures("--dataset.root_dir=/a").is_none());
    }

    #[test]
    fn hydra_form_requires_a_boundary() {
        let re = &compiled(Slot::DatasetPath).pattern;
        let caps = re.captures("python train.py dataset.path=/d/x").expect("hydra");
        assert_eq!(&caps[1], " dataset.path=");
        assert_eq!(&caps[2], "/d/x");
        assert!(re.captures("mydataset.path=/d/x").is_none());
    }

    #[test]
    fn line_patterns_match_whole_lines_only() {
        assert!(DIR_LINE.is_match("cd ~/lerobot"));
        assert!(DIR_LINE.is_match("  mkdir -p /home/x/lerobot  "));
        assert!(!DIR_LINE.is_match("cd ~/lerobot && ls"));
        assert!(RM_LINE.is_match("rm -rf /a/b"));
        assert!(RM_LINE.is_match("sudo rm -fr /a/b"));
        assert!(!RM_LINE.is_match("rm /a/b"));
    }
}
