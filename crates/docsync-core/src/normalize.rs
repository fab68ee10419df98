//! String helpers shared by the scanner, derivation and render passes.
//!
//! Every function here is total: malformed input yields `""` or `None`, and
//! callers decide what an absent value means for them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Last path segment of a LeRobot checkout. Used to recognize project
/// directories in `cd`/`mkdir` lines and persisted workspace paths.
pub const PROJECT_FOLDER: &str = "lerobot";

pub fn strip_quotes(s: &str) -> &str {
    let t = s.trim();
    if t.len() >= 2
        && ((t.starts_with('"') && t.ends_with('"')) || (t.starts_with('\'') && t.ends_with('\'')))
    {
        return &t[1..t.len() - 1];
    }
    t
}

/// Quote character wrapping `s`, if any.
pub fn quote_of(s: &str) -> Option<char> {
    let t = s.trim();
    if t.len() < 2 {
        return None;
    }
    ['"', '\'']
        .into_iter()
        .find(|q| t.starts_with(*q) && t.ends_with(*q))
}

/// `"/path///"` -> `"/path"`, `"///"` -> `"/"`.
pub fn normalize_path(p: &str) -> String {
    let s = strip_quotes(p);
    if s.len() <= 1 {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parent of a normalized path, or `""` when there is none to derive.
/// `"/home"` has no usable parent either: the root is never a workspace.
pub fn parent_dir(p: &str) -> String {
    let s = normalize_path(p);
    if s.is_empty() || s == "/" {
        return String::new();
    }
    match s.rfind('/') {
        Some(idx) if idx > 0 => s[..idx].to_string(),
        _ => String::new(),
    }
}

pub fn last_segment(p: &str) -> &str {
    let s = strip_quotes(p).trim_end_matches('/');
    s.rsplit('/').next().unwrap_or("")
}

pub fn join_path(base: &str, rest: &str) -> String {
    let base = normalize_path(base);
    let rest = rest.trim_matches('/');
    if base.is_empty() || rest.is_empty() {
        return String::new();
    }
    if base == "/" {
        format!("/{}", rest)
    } else {
        format!("{}/{}", base, rest)
    }
}

pub fn ends_with_project_folder(p: &str) -> bool {
    let s = normalize_path(p);
    !s.is_empty() && last_segment(&s) == PROJECT_FOLDER
}

/// Closest ancestor-or-self named like the project folder; `root` itself
/// when no such ancestor exists.
pub fn project_dir_from_root(root: &str) -> String {
    let mut current = normalize_path(root);
    let original = current.clone();
    while !current.is_empty() {
        if ends_with_project_folder(&current) {
            return current;
        }
        current = parent_dir(&current);
    }
    original
}

/// Removes `/<suffix>` from the end of `path`. `None` when `path` does not end
/// with it or nothing would remain.
pub fn strip_path_suffix(path: &str, suffix: &str) -> Option<String> {
    let path = normalize_path(path);
    let suffix = suffix.trim_matches('/');
    if suffix.is_empty() {
        return None;
    }
    let head = path.strip_suffix(suffix)?.strip_suffix('/')?;
    if head.is_empty() {
        return Some("/".to_string());
    }
    Some(head.to_string())
}

pub fn normalize_bool(s: &str) -> bool {
    matches!(
        strip_quotes(s).to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y"
    )
}

/// Strict variant of [`normalize_bool`] for stored values: anything outside
/// both vocabularies is absent rather than false.
pub fn parse_bool(s: &str) -> Option<bool> {
    match strip_quotes(s).to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

pub fn bool_str(v: bool) -> &'static str {
    if v {
        "true"
    } else {
        "false"
    }
}

pub fn has_placeholder(s: &str) -> bool {
    s.contains("{{")
}

/// `owner/name` dataset identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn parse(s: &str) -> Option<Self> {
        let s = strip_quotes(s);
        let mut parts = s.split('/');
        let owner = parts.next()?;
        let name = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Self::from_parts(owner, name)
    }

    pub fn from_parts(owner: &str, name: &str) -> Option<Self> {
        if !is_valid_part(owner) || !is_valid_part(name) {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn with_name(&self, name: &str) -> Option<Self> {
        Self::from_parts(&self.owner, name)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

pub fn is_valid_part(part: &str) -> bool {
    !part.is_empty() && !part.contains('/') && !part.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_quotes_removes_one_matching_pair() {
        assert_eq!(strip_quotes("\"/dev/ttyACM0\""), "/dev/ttyACM0");
        assert_eq!(strip_quotes("'a'"), "a");
        assert_eq!(strip_quotes("\"a'"), "\"a'");
        assert_eq!(strip_quotes("\"\"x\"\""), "\"x\"");
        assert_eq!(strip_quotes("\""), "\"");
    }

    #[test]
    fn normalize_path_collapses_trailing_slashes() {
        assert_eq!(normalize_path("/home/x///"), "/home/x");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("///"), "/");
        assert_eq!(normalize_path("'/home/x/'"), "/home/x");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn parent_dir_uses_empty_sentinel() {
        assert_eq!(parent_dir("/home/x/lerobot"), "/home/x");
        assert_eq!(parent_dir("/home/x/lerobot/"), "/home/x");
        assert_eq!(parent_dir("/home"), "");
        assert_eq!(parent_dir("lerobot"), "");
        assert_eq!(parent_dir("/"), "");
        assert_eq!(parent_dir(""), "");
    }

    #[test]
    fn repo_id_requires_exactly_two_parts() {
        let r = RepoId::parse("alice/demo").expect("valid repo id");
        assert_eq!(r.owner, "alice");
        assert_eq!(r.name, "demo");
        assert_eq!(r.to_string(), "alice/demo");
        assert!(RepoId::parse("alice").is_none());
        assert!(RepoId::parse("alice/").is_none());
        assert!(RepoId::parse("/demo").is_none());
        assert!(RepoId::parse("a/b/c").is_none());
        assert!(RepoId::parse("alice/de mo").is_none());
        assert!(RepoId::parse("").is_none());
    }

    #[test]
    fn bool_vocabularies() {
        for v in ["true", "TRUE", "1", "yes", "Y"] {
            assert!(normalize_bool(v), "{v}");
        }
        for v in ["false", "", "no", "2", "on"] {
            assert!(!normalize_bool(v), "{v}");
        }
        assert_eq!(parse_bool("No"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn project_dir_from_root_walks_up_to_marker() {
        assert_eq!(
            project_dir_from_root("/home/jetson/lerobot/datasets"),
            "/home/jetson/lerobot"
        );
        assert_eq!(project_dir_from_root("/home/jetson/lerobot"), "/home/jetson/lerobot");
        assert_eq!(project_dir_from_root("/data/sets"), "/data/sets");
    }

    #[test]
    fn strip_path_suffix_matches_whole_segments() {
        assert_eq!(
            strip_path_suffix("/h/lerobot/local/1cam", "local/1cam").as_deref(),
            Some("/h/lerobot")
        );
        assert_eq!(strip_path_suffix("/h/xlocal/1cam", "local/1cam"), None);
        assert_eq!(strip_path_suffix("/local/1cam", "local/1cam").as_deref(), Some("/"));
    }

    #[test]
    fn join_path_degrades_to_empty() {
        assert_eq!(join_path("/a/", "b"), "/a/b");
        assert_eq!(join_path("/", "b"), "/b");
        assert_eq!(join_path("", "b"), "");
        assert_eq!(join_path("/a", ""), "");
    }
}
