//! Facts: named, read-only truths about a repository.
//!
//! The evaluator walks the tree once, keeps only files that match the
//! registered pattern union, and hands each fact definition the files that
//! match its own patterns. A definition that fails (unparseable manifest,
//! unreadable file) only loses its own fact.

use crate::error::{Result, StackplanError};
use crate::paths;
use crate::pattern::{PatternMatch, PatternRegistry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// Fact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub name: String,
    /// Contextual values discovered alongside the fact (e.g. `path`, `name`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl Fact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            details: BTreeMap::new(),
        }
    }

    /// A fact located at `file`, recording its relative path.
    pub fn at(name: impl Into<String>, file: &ScannedFile) -> Self {
        Self::new(name).with_detail("path", file.relative.clone())
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// FactSet
// ---------------------------------------------------------------------------

/// Immutable result of one evaluation pass: the facts that hold plus the
/// patterns that matched at least one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactSet {
    facts: BTreeMap<String, Fact>,
    matched: BTreeSet<PatternMatch>,
}

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_facts(facts: impl IntoIterator<Item = Fact>) -> Self {
        let mut set = Self::new();
        for fact in facts {
            set.insert(fact);
        }
        set
    }

    pub fn insert(&mut self, fact: Fact) {
        self.facts.insert(fact.name.clone(), fact);
    }

    pub fn mark_matched(&mut self, pattern: PatternMatch) {
        self.matched.insert(pattern);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.facts.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Fact> {
        self.facts.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.facts.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.values()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn matched(&self, pattern: &PatternMatch) -> bool {
        self.matched.contains(pattern)
    }

    pub fn matched_any(&self, patterns: &[PatternMatch]) -> bool {
        patterns.iter().any(|p| self.matched(p))
    }
}

// ---------------------------------------------------------------------------
// ScannedFile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// `/`-separated path relative to the repository root.
    pub relative: String,
}

impl ScannedFile {
    pub fn file_name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or(&self.relative)
    }

    pub fn read_to_string(&self, fact: &str) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| self.error(fact, e.to_string()))
    }

    /// A `FactEvaluation` error attributed to this file.
    pub fn error(&self, fact: &str, reason: impl Into<String>) -> StackplanError {
        StackplanError::FactEvaluation {
            fact: fact.to_string(),
            path: PathBuf::from(&self.relative),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// FactDefinition
// ---------------------------------------------------------------------------

/// Produces a fact from the files matching `patterns`, sorted by relative path.
/// `Ok(None)` means the fact does not hold.
pub type FactFn = fn(&[ScannedFile]) -> Result<Option<Fact>>;

#[derive(Debug, Clone)]
pub struct FactDefinition {
    pub name: &'static str,
    pub patterns: Vec<PatternMatch>,
    pub evaluate: FactFn,
}

impl FactDefinition {
    pub fn new(name: &'static str, patterns: Vec<PatternMatch>, evaluate: FactFn) -> Self {
        Self {
            name,
            patterns,
            evaluate,
        }
    }
}

/// Fact that holds whenever any file matches.
pub fn present(name: &str, files: &[ScannedFile]) -> Option<Fact> {
    files.first().map(|f| Fact::at(name, f))
}

// ---------------------------------------------------------------------------
// FactEvaluator
// ---------------------------------------------------------------------------

pub struct FactEvaluator<'a> {
    patterns: &'a PatternRegistry,
    definitions: &'a [FactDefinition],
}

impl<'a> FactEvaluator<'a> {
    pub fn new(patterns: &'a PatternRegistry, definitions: &'a [FactDefinition]) -> Self {
        Self {
            patterns,
            definitions,
        }
    }

    pub fn evaluate(&self, repo: &Path) -> Result<FactSet> {
        let by_pattern = self.scan(repo)?;

        let mut set = FactSet::new();
        for pattern in by_pattern.keys() {
            set.mark_matched(pattern.clone());
        }

        for def in self.definitions {
            let mut files: Vec<ScannedFile> = def
                .patterns
                .iter()
                .filter_map(|p| by_pattern.get(p))
                .flatten()
                .cloned()
                .collect();
            if files.is_empty() {
                continue;
            }
            files.sort_by(|a, b| a.relative.cmp(&b.relative));
            files.dedup_by(|a, b| a.relative == b.relative);

            match (def.evaluate)(&files) {
                Ok(Some(mut fact)) => {
                    fact.name = def.name.to_string();
                    debug!(fact = def.name, "fact holds");
                    set.insert(fact);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(fact = def.name, error = %e, "fact evaluation failed; treating as absent");
                }
            }
        }
        Ok(set)
    }

    /// Walk the repository, grouping files under every pattern they match.
    fn scan(&self, repo: &Path) -> Result<BTreeMap<PatternMatch, Vec<ScannedFile>>> {
        let unreadable = |reason: String| StackplanError::RepositoryUnreadable {
            path: repo.to_path_buf(),
            reason,
        };
        let meta = std::fs::metadata(repo).map_err(|e| unreadable(e.to_string()))?;
        if !meta.is_dir() {
            return Err(unreadable("not a directory".to_string()));
        }

        let mut by_pattern: BTreeMap<PatternMatch, Vec<ScannedFile>> = BTreeMap::new();
        if self.patterns.is_empty() {
            return Ok(by_pattern);
        }

        let walker = WalkDir::new(repo)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && paths::is_skipped_dir(&e.file_name().to_string_lossy()))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(unreadable(e.to_string())),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = paths::relative_slash_path(repo, entry.path());
            let file_name = entry.file_name().to_string_lossy().into_owned();
            for pattern in self.patterns.matching(&file_name, &relative) {
                by_pattern
                    .entry(pattern.clone())
                    .or_default()
                    .push(ScannedFile {
                        path: entry.path().to_path_buf(),
                        relative: relative.clone(),
                    });
            }
        }
        Ok(by_pattern)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn go_module(files: &[ScannedFile]) -> Result<Option<Fact>> {
        let file = &files[0];
        let content = file.read_to_string("goModule")?;
        let module = content
            .lines()
            .find_map(|l| l.trim().strip_prefix("module "))
            .ok_or_else(|| file.error("goModule", "no module directive"))?;
        Ok(Some(Fact::at("goModule", file).with_detail("module", module.trim())))
    }

    fn dockerfile(files: &[ScannedFile]) -> Result<Option<Fact>> {
        Ok(present("containerfile", files))
    }

    fn registry() -> (PatternRegistry, Vec<FactDefinition>) {
        let defs = vec![
            FactDefinition::new("goModule", vec![PatternMatch::file("go\\.mod")], go_module),
            FactDefinition::new(
                "containerfile",
                vec![PatternMatch::file("Dockerfile|Containerfile")],
                dockerfile,
            ),
        ];
        let mut patterns = PatternRegistry::new();
        for def in &defs {
            patterns.register_pattern_matches(&def.patterns).unwrap();
        }
        (patterns, defs)
    }

    #[test]
    fn evaluates_matching_facts() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("go.mod"), "module example.com/shop\n").unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let (patterns, defs) = registry();
        let facts = FactEvaluator::new(&patterns, &defs)
            .evaluate(dir.path())
            .unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(
            facts.get("goModule").unwrap().detail("module"),
            Some("example.com/shop")
        );
        assert_eq!(
            facts.get("containerfile").unwrap().detail("path"),
            Some("Dockerfile")
        );
        assert!(facts.matched(&PatternMatch::file("go\\.mod")));
    }

    #[test]
    fn malformed_file_only_loses_its_own_fact() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("go.mod"), "garbage\n").unwrap();
        std::fs::write(dir.path().join("Containerfile"), "FROM scratch\n").unwrap();

        let (patterns, defs) = registry();
        let facts = FactEvaluator::new(&patterns, &defs)
            .evaluate(dir.path())
            .unwrap();
        assert!(!facts.contains("goModule"));
        assert!(facts.contains("containerfile"));
        // The pattern still matched even though the fact failed.
        assert!(facts.matched(&PatternMatch::file("go\\.mod")));
    }

    #[test]
    fn skipped_directories_are_not_scanned() {
        let dir = TempDir::new().unwrap();
        let vendored = dir.path().join("node_modules/dep");
        std::fs::create_dir_all(&vendored).unwrap();
        std::fs::write(vendored.join("Dockerfile"), "FROM scratch\n").unwrap();

        let (patterns, defs) = registry();
        let facts = FactEvaluator::new(&patterns, &defs)
            .evaluate(dir.path())
            .unwrap();
        assert!(facts.is_empty());
    }

    #[test]
    fn missing_repository_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let (patterns, defs) = registry();
        let err = FactEvaluator::new(&patterns, &defs)
            .evaluate(&dir.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, StackplanError::RepositoryUnreadable { .. }));
    }

    #[test]
    fn nested_files_use_slash_relative_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("svc/api")).unwrap();
        std::fs::write(dir.path().join("svc/api/Dockerfile"), "FROM scratch\n").unwrap();

        let (patterns, defs) = registry();
        let facts = FactEvaluator::new(&patterns, &defs)
            .evaluate(dir.path())
            .unwrap();
        assert_eq!(
            facts.get("containerfile").unwrap().detail("path"),
            Some("svc/api/Dockerfile")
        );
    }
}
