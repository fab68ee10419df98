//! Evaluation-variant naming. Every rewrite rule that must pick between the
//! recording dataset and its evaluation counterpart goes through [`classify`].

use crate::normalize::{last_segment, strip_quotes};

pub const EVAL_PREFIX: &str = "eval_";
pub const LEGACY_EVAL_SUFFIX: &str = "_eval";
const EVAL_TOKEN_OPEN: &str = "{{EVAL_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Normal,
    Eval,
}

pub fn is_eval_name(name: &str) -> bool {
    name.starts_with(EVAL_PREFIX) || name.ends_with(LEGACY_EVAL_SUFFIX)
}

/// Classifies a repo id, slug or path by its last `/` segment. Values still
/// carrying an evaluation placeholder count as evaluation too.
pub fn classify(value: &str) -> Variant {
    let s = strip_quotes(value);
    if s.contains(EVAL_TOKEN_OPEN) {
        return Variant::Eval;
    }
    if is_eval_name(last_segment(s)) {
        Variant::Eval
    } else {
        Variant::Normal
    }
}

/// Canonical evaluation slug. Reads either marker form, always writes the
/// prefix form.
pub fn eval_slug(slug: &str) -> String {
    let s = slug.trim();
    if s.is_empty() {
        return String::new();
    }
    if s.starts_with(EVAL_PREFIX) {
        return s.to_string();
    }
    match s.strip_suffix(LEGACY_EVAL_SUFFIX) {
        Some(base) if !base.is_empty() => format!("{}{}", EVAL_PREFIX, base),
        _ => format!("{}{}", EVAL_PREFIX, s),
    }
}

/// Inverse of [`eval_slug`]: the recording slug an evaluation slug came from.
pub fn base_slug(slug: &str) -> String {
    let s = slug.trim();
    if let Some(rest) = s.strip_prefix(EVAL_PREFIX) {
        if !rest.is_empty() {
            return rest.to_string();
        }
    }
    if let Some(rest) = s.strip_suffix(LEGACY_EVAL_SUFFIX) {
        if !rest.is_empty() {
            return rest.to_string();
        }
    }
    s.to_string()
}
