//! Capabilities handed to a running script.

use crate::config::Config;
use crate::fact::{Fact, FactSet};
use crate::error::{Result, StackplanError};
use crate::inputs::SecretString;
use crate::sandbox::{SecretHandle, SecretScope};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scoped to a single action: the secret scope dies with the action's sandbox.
#[derive(Debug, Clone)]
pub struct ActionUtilities {
    config: Arc<Config>,
    facts: Arc<FactSet>,
    source: PathBuf,
    secrets: SecretScope,
}

impl ActionUtilities {
    pub fn new(
        config: Arc<Config>,
        facts: Arc<FactSet>,
        source: impl Into<PathBuf>,
        secrets: SecretScope,
    ) -> Self {
        Self {
            config,
            facts,
            source: source.into(),
            secrets,
        }
    }

    pub fn get_config(&self) -> &Config {
        &self.config
    }

    /// Facts evaluated over the source when execution started.
    pub fn facts(&self) -> &FactSet {
        &self.facts
    }

    /// A fact the script cannot proceed without.
    pub fn require_fact(&self, name: &str) -> Result<&Fact> {
        self.facts
            .get(name)
            .ok_or_else(|| StackplanError::FactMissing(name.to_string()))
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Register a raw secret and return the handle to bind into the sandbox.
    pub fn set_secret(&self, name: &str, raw: SecretString) -> SecretHandle {
        self.secrets.insert(name, raw)
    }

    pub fn secrets(&self) -> &SecretScope {
        &self.secrets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_secret_registers_in_shared_scope() {
        let scope = SecretScope::new();
        let utils = ActionUtilities::new(
            Arc::new(Config::default()),
            Arc::new(FactSet::new()),
            "/repo",
            scope.clone(),
        );
        let handle = utils.set_secret("SONAR_TOKEN", SecretString::new("abc"));
        assert_eq!(scope.reveal(&handle).unwrap().expose(), "abc");
        assert_eq!(utils.get_config().node.version, "20");
        assert_eq!(utils.source(), Path::new("/repo"));
    }

    #[test]
    fn require_fact_reports_missing() {
        let utils = ActionUtilities::new(
            Arc::new(Config::default()),
            Arc::new(FactSet::new()),
            "/repo",
            SecretScope::new(),
        );
        assert!(matches!(
            utils.require_fact("argocdApplication"),
            Err(StackplanError::FactMissing(_))
        ));
    }
}
