//! Admission: the per-action predicate over a fact set.

use crate::error::{Result, StackplanError};
use crate::fact::FactSet;
use crate::pattern::PatternMatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// ActionSpec
// ---------------------------------------------------------------------------

/// Admission-time projection of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub display_name: String,
    pub description: String,
}

impl ActionSpec {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AdmissionResolver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionResolver {
    pub spec: ActionSpec,
    pub required_facts: Vec<String>,
    pub optional_facts: Vec<String>,
    pub required_inputs: Vec<String>,
    /// Patterns this action is scoped to. Only consulted when the resolver
    /// has no required facts.
    pub scope: Vec<PatternMatch>,
}

/// Outcome of running one resolver against a fact set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub action: String,
    pub admitted: bool,
    pub missing_facts: Vec<String>,
    /// Optional facts that were present.
    pub optional_facts: Vec<String>,
    pub required_inputs: Vec<String>,
}

impl AdmissionResolver {
    pub fn new(spec: ActionSpec) -> Self {
        Self {
            spec,
            required_facts: Vec::new(),
            optional_facts: Vec::new(),
            required_inputs: Vec::new(),
            scope: Vec::new(),
        }
    }

    pub fn requires_facts(mut self, facts: &[&str]) -> Self {
        self.required_facts
            .extend(facts.iter().map(|f| f.to_string()));
        self
    }

    pub fn optional_facts(mut self, facts: &[&str]) -> Self {
        self.optional_facts
            .extend(facts.iter().map(|f| f.to_string()));
        self
    }

    pub fn requires_inputs(mut self, inputs: &[&str]) -> Self {
        self.required_inputs
            .extend(inputs.iter().map(|i| i.to_string()));
        self
    }

    pub fn scoped_to(mut self, patterns: Vec<PatternMatch>) -> Self {
        self.scope.extend(patterns);
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Pure function of the fact set.
    pub fn resolve(&self, facts: &FactSet) -> Admission {
        let missing_facts: Vec<String> = self
            .required_facts
            .iter()
            .filter(|f| !facts.contains(f))
            .cloned()
            .collect();
        let admitted = if self.required_facts.is_empty() {
            self.scope.is_empty() || facts.matched_any(&self.scope)
        } else {
            missing_facts.is_empty()
        };
        Admission {
            action: self.spec.name.clone(),
            admitted,
            missing_facts,
            optional_facts: self
                .optional_facts
                .iter()
                .filter(|f| facts.contains(f))
                .cloned()
                .collect(),
            required_inputs: self.required_inputs.clone(),
        }
    }

    pub fn admits(&self, facts: &FactSet) -> bool {
        self.resolve(facts).admitted
    }

    /// Reject declarations that could never resolve meaningfully.
    pub fn validate(&self, known_facts: &BTreeSet<String>) -> Result<()> {
        let malformed = |reason: String| StackplanError::MalformedResolver {
            action: self.spec.name.clone(),
            reason,
        };

        if self.spec.name.trim().is_empty() {
            return Err(malformed("action name is empty".to_string()));
        }

        let mut seen = BTreeSet::new();
        for fact in self.required_facts.iter().chain(&self.optional_facts) {
            if !seen.insert(fact.as_str()) {
                return Err(malformed(format!(
                    "fact '{fact}' is listed more than once"
                )));
            }
            if !known_facts.contains(fact) {
                return Err(malformed(format!("fact '{fact}' has no registered definition")));
            }
        }

        let mut inputs = BTreeSet::new();
        for input in &self.required_inputs {
            if input.trim().is_empty() {
                return Err(malformed("input name is empty".to_string()));
            }
            if !inputs.insert(input.as_str()) {
                return Err(malformed(format!("input '{input}' is listed more than once")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
