//! Scope - the negotiated contract between the user and the pipeline

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Goal, requirements and description gathered for one user query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub user_query: String,
    pub user_goal: Option<String>,
    pub requirements: Vec<String>,
    pub description: Option<String>,
}

impl Scope {
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            ..Default::default()
        }
    }

    /// Goal, requirements and description are all present.
    pub fn is_complete(&self) -> bool {
        self.user_goal.is_some() && !self.requirements.is_empty() && self.description.is_some()
    }
}

/// Comparison key for a requirement: lowercase, single spaces, no trailing period.
pub fn normalize_requirement(requirement: &str) -> String {
    requirement
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_lowercase()
}

/// True when every item of `delta` already appears in `set`.
pub fn covers(set: &[String], delta: &[String]) -> bool {
    let known: HashSet<String> = set.iter().map(|r| normalize_requirement(r)).collect();
    delta.iter().all(|r| known.contains(&normalize_requirement(r)))
}

/// Order-preserving union: `existing` first, then new items of `delta`.
pub fn merge_verbatim(existing: &[String], delta: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    existing
        .iter()
        .chain(delta)
        .filter(|r| !r.trim().is_empty())
        .filter(|r| seen.insert(normalize_requirement(r)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reqs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_scope_is_empty() {
        let scope = Scope::new("build a CLI word counter");
        assert_eq!(scope.user_query, "build a CLI word counter");
        assert!(scope.user_goal.is_none());
        assert!(scope.requirements.is_empty());
        assert!(!scope.is_complete());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_requirement("  Counts   Words. "), "counts words");
        assert_eq!(normalize_requirement("counts words"), "counts words");
    }

    #[test]
    fn test_merge_idempotent() {
        let a = reqs(&["counts words", "counts lines"]);
        assert_eq!(merge_verbatim(&a, &a), a);
        assert!(covers(&a, &a));
    }

    #[test]
    fn test_merge_lossless() {
        let a = reqs(&["counts words", "reads stdin"]);
        let b = reqs(&["Counts words.", "counts lines"]);
        let merged = merge_verbatim(&a, &b);
        assert!(covers(&merged, &a));
        assert!(covers(&merged, &b));
        // nothing outside A and B
        let union: Vec<String> = a.iter().chain(&b).cloned().collect();
        assert!(covers(&union, &merged));
        assert_eq!(merged, reqs(&["counts words", "reads stdin", "counts lines"]));
    }

    #[test]
    fn test_merge_drops_blank() {
        let merged = merge_verbatim(&reqs(&["a"]), &reqs(&["  ", "b"]));
        assert_eq!(merged, reqs(&["a", "b"]));
    }

    #[test]
    fn test_covers_detects_new_items() {
        assert!(!covers(&reqs(&["a"]), &reqs(&["a", "b"])));
        assert!(covers(&reqs(&["a"]), &[]));
    }
}
