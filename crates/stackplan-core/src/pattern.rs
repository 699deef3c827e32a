//! File-pattern matchers that bound a repository scan.
//!
//! Each action declares the patterns it cares about when it registers. The
//! union of every registered pattern decides which files the fact evaluator
//! reads at all; everything else in the tree is skipped.

use crate::error::{Result, StackplanError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PatternMatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Regex matched against the file name only.
    File,
    /// Regex matched against the `/`-separated path relative to the repository root.
    Path,
}

/// A `(kind, pattern)` pair. Patterns are whole-string regex matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub pattern: String,
}

impl PatternMatch {
    pub fn file(pattern: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::File,
            pattern: pattern.into(),
        }
    }

    pub fn path(pattern: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::Path,
            pattern: pattern.into(),
        }
    }

    pub fn compile(&self) -> Result<CompiledPattern> {
        let regex = Regex::new(&format!("^(?:{})$", self.pattern)).map_err(|e| {
            StackplanError::InvalidPattern {
                pattern: self.pattern.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(CompiledPattern {
            pattern: self.clone(),
            regex,
        })
    }
}

impl fmt::Display for PatternMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PatternKind::File => write!(f, "file:{}", self.pattern),
            PatternKind::Path => write!(f, "path:{}", self.pattern),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub pattern: PatternMatch,
    regex: Regex,
}

impl CompiledPattern {
    pub fn is_match(&self, file_name: &str, relative_path: &str) -> bool {
        match self.pattern.kind {
            PatternKind::File => self.regex.is_match(file_name),
            PatternKind::Path => self.regex.is_match(relative_path),
        }
    }
}

// ---------------------------------------------------------------------------
// PatternRegistry
// ---------------------------------------------------------------------------

/// Append-only set of compiled patterns. Registering a pattern twice is a no-op.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    entries: Vec<CompiledPattern>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pattern_matches(&mut self, patterns: &[PatternMatch]) -> Result<()> {
        for pattern in patterns {
            if self.contains(pattern) {
                continue;
            }
            self.entries.push(pattern.compile()?);
        }
        Ok(())
    }

    pub fn contains(&self, pattern: &PatternMatch) -> bool {
        self.entries.iter().any(|e| &e.pattern == pattern)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledPattern> {
        self.entries.iter()
    }

    /// Every registered pattern that matches the given file.
    pub fn matching<'a>(
        &'a self,
        file_name: &'a str,
        relative_path: &'a str,
    ) -> impl Iterator<Item = &'a PatternMatch> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.is_match(file_name, relative_path))
            .map(|e| &e.pattern)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_pattern_matches_whole_name() {
        let p = PatternMatch::file(r".*\.ya?ml").compile().unwrap();
        assert!(p.is_match("app.yaml", "deploy/app.yaml"));
        assert!(p.is_match("app.yml", "app.yml"));
        assert!(!p.is_match("app.yaml.bak", "app.yaml.bak"));
    }

    #[test]
    fn path_pattern_matches_relative_path() {
        let p = PatternMatch::path("package\\.json").compile().unwrap();
        assert!(p.is_match("package.json", "package.json"));
        assert!(!p.is_match("package.json", "web/package.json"));
    }

    #[test]
    fn registration_is_idempotent_and_additive() {
        let mut reg = PatternRegistry::new();
        reg.register_pattern_matches(&[PatternMatch::file("go\\.mod")])
            .unwrap();
        reg.register_pattern_matches(&[
            PatternMatch::file("go\\.mod"),
            PatternMatch::file("Dockerfile"),
        ])
        .unwrap();
        assert_eq!(reg.len(), 2);
        let hits: Vec<_> = reg.matching("Dockerfile", "Dockerfile").collect();
        assert_eq!(hits, vec![&PatternMatch::file("Dockerfile")]);
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let mut reg = PatternRegistry::new();
        let err = reg
            .register_pattern_matches(&[PatternMatch::file("(unclosed")])
            .unwrap_err();
        assert!(matches!(err, StackplanError::InvalidPattern { .. }));
        assert!(err.is_registration());
    }

    #[test]
    fn display_shows_kind() {
        assert_eq!(PatternMatch::file("a").to_string(), "file:a");
        assert_eq!(PatternMatch::path("b/c").to_string(), "path:b/c");
    }
}
