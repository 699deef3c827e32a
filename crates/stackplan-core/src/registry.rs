//! Registration boundary: patterns, facts, admission resolvers and actions
//! are collected single-threaded, validated once, then frozen.

use crate::action::Action;
use crate::admission::AdmissionResolver;
use crate::error::{Result, StackplanError};
use crate::fact::{FactDefinition, FactEvaluator, FactSet};
use crate::pattern::{PatternMatch, PatternRegistry};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::debug;

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RegistryBuilder {
    patterns: PatternRegistry,
    facts: Vec<FactDefinition>,
    resolvers: Vec<AdmissionResolver>,
    actions: Vec<Action>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pattern_matches(&mut self, patterns: &[PatternMatch]) -> Result<()> {
        self.patterns.register_pattern_matches(patterns)
    }

    /// Register a fact definition together with the patterns it reads.
    /// Re-registering a fact under the same name is a no-op.
    pub fn register_fact(&mut self, definition: FactDefinition) -> Result<()> {
        if self.facts.iter().any(|f| f.name == definition.name) {
            return Ok(());
        }
        self.patterns.register_pattern_matches(&definition.patterns)?;
        self.facts.push(definition);
        Ok(())
    }

    pub fn register_admission_resolver(&mut self, resolver: AdmissionResolver) -> Result<()> {
        if self.resolvers.iter().any(|r| r.name() == resolver.name()) {
            return Err(StackplanError::MalformedResolver {
                action: resolver.name().to_string(),
                reason: "admission resolver registered more than once".to_string(),
            });
        }
        self.patterns.register_pattern_matches(&resolver.scope)?;
        self.resolvers.push(resolver);
        Ok(())
    }

    pub fn register_action(&mut self, action: Action) -> Result<()> {
        if self.actions.iter().any(|a| a.name() == action.name()) {
            return Err(StackplanError::DuplicateAction(action.name().to_string()));
        }
        self.actions.push(action);
        Ok(())
    }

    /// Cross-check every registration and freeze the registry.
    pub fn build(self) -> Result<Registry> {
        let known: BTreeSet<String> = self.facts.iter().map(|f| f.name.to_string()).collect();
        for resolver in &self.resolvers {
            resolver.validate(&known)?;
            if !self.actions.iter().any(|a| a.name() == resolver.name()) {
                return Err(StackplanError::MalformedResolver {
                    action: resolver.name().to_string(),
                    reason: "no action registered under this name".to_string(),
                });
            }
        }

        let mut resolvers: HashMap<String, AdmissionResolver> = self
            .resolvers
            .into_iter()
            .map(|r| (r.name().to_string(), r))
            .collect();

        let mut entries = Vec::with_capacity(self.actions.len());
        let mut index = HashMap::new();
        for action in self.actions {
            let resolver = resolvers.remove(action.name()).ok_or_else(|| {
                StackplanError::MalformedResolver {
                    action: action.name().to_string(),
                    reason: "action has no admission resolver".to_string(),
                }
            })?;
            index.insert(action.name().to_string(), entries.len());
            entries.push(RegisteredAction { action, resolver });
        }

        debug!(
            actions = entries.len(),
            facts = self.facts.len(),
            patterns = self.patterns.len(),
            "registry built"
        );
        Ok(Registry {
            patterns: self.patterns,
            facts: self.facts,
            entries,
            index,
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RegisteredAction {
    pub action: Action,
    pub resolver: AdmissionResolver,
}

/// Immutable after `build()`; share it behind an `Arc`.
pub struct Registry {
    patterns: PatternRegistry,
    facts: Vec<FactDefinition>,
    entries: Vec<RegisteredAction>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn patterns(&self) -> &PatternRegistry {
        &self.patterns
    }

    pub fn facts(&self) -> &[FactDefinition] {
        &self.facts
    }

    /// Actions in registration order.
    pub fn actions(&self) -> impl Iterator<Item = &RegisteredAction> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredAction> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evaluate(&self, repo: &Path) -> Result<FactSet> {
        FactEvaluator::new(&self.patterns, &self.facts).evaluate(repo)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
