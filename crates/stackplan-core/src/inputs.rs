//! Execution-time inputs: literal values and opaque secret references.

use crate::error::{Result, StackplanError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ---------------------------------------------------------------------------
// Known input keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKey {
    ArgoCdServer,
    ArgoCdAuthToken,
    ContainerRegistry,
    ContainerRegistryUsername,
    ContainerRegistryPassword,
    SonarHostUrl,
    SonarToken,
}

impl InputKey {
    pub fn all() -> &'static [InputKey] {
        &[
            InputKey::ArgoCdServer,
            InputKey::ArgoCdAuthToken,
            InputKey::ContainerRegistry,
            InputKey::ContainerRegistryUsername,
            InputKey::ContainerRegistryPassword,
            InputKey::SonarHostUrl,
            InputKey::SonarToken,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InputKey::ArgoCdServer => "ARGOCD_SERVER",
            InputKey::ArgoCdAuthToken => "ARGOCD_AUTH_TOKEN",
            InputKey::ContainerRegistry => "CONTAINER_REGISTRY",
            InputKey::ContainerRegistryUsername => "CONTAINER_REGISTRY_USERNAME",
            InputKey::ContainerRegistryPassword => "CONTAINER_REGISTRY_PASSWORD",
            InputKey::SonarHostUrl => "SONAR_HOST_URL",
            InputKey::SonarToken => "SONAR_TOKEN",
        }
    }

    /// Secret-classified keys are always bound through the secret primitive,
    /// even when supplied as a literal.
    pub fn is_secret(self) -> bool {
        matches!(
            self,
            InputKey::ArgoCdAuthToken | InputKey::ContainerRegistryPassword | InputKey::SonarToken
        )
    }
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InputKey {
    type Err = StackplanError;

    fn from_str(s: &str) -> Result<Self> {
        InputKey::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| StackplanError::InputNotResolved(s.to_string()))
    }
}

pub fn is_secret_input(name: &str) -> bool {
    name.parse::<InputKey>().map(InputKey::is_secret).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// SecretString
// ---------------------------------------------------------------------------

/// A value that never prints itself.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

// ---------------------------------------------------------------------------
// InputValue / SecretRef
// ---------------------------------------------------------------------------

/// Reference to a secret held by a `SecretStore`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef(pub String);

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Either `"literal"` or `{ "secret": "<ref>" }` in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Literal(String),
    Secret { secret: SecretRef },
}

impl InputValue {
    pub fn literal(value: impl Into<String>) -> Self {
        InputValue::Literal(value.into())
    }

    pub fn secret(reference: impl Into<String>) -> Self {
        InputValue::Secret {
            secret: SecretRef(reference.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// SecretStore
// ---------------------------------------------------------------------------

/// Resolves secret references to raw values at bind time.
pub trait SecretStore: Send + Sync {
    fn resolve(&self, reference: &SecretRef) -> Result<SecretString>;
}

/// In-process map of references to values.
#[derive(Default)]
pub struct StaticSecretStore {
    values: HashMap<String, SecretString>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: impl Into<String>, value: impl Into<String>) -> Self {
        self.values
            .insert(reference.into(), SecretString::new(value));
        self
    }
}

impl SecretStore for StaticSecretStore {
    fn resolve(&self, reference: &SecretRef) -> Result<SecretString> {
        self.values
            .get(&reference.0)
            .cloned()
            .ok_or_else(|| StackplanError::SecretUnresolved {
                reference: reference.0.clone(),
                reason: "not present in the store".to_string(),
            })
    }
}

/// Resolves a reference as the name of a process environment variable.
#[derive(Debug, Default)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn resolve(&self, reference: &SecretRef) -> Result<SecretString> {
        std::env::var(&reference.0)
            .map(SecretString::new)
            .map_err(|e| StackplanError::SecretUnresolved {
                reference: reference.0.clone(),
                reason: e.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// ResolvedInputs
// ---------------------------------------------------------------------------

/// A single bound input ready for a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedValue {
    Plain(String),
    Secret(SecretString),
}

impl ResolvedValue {
    pub fn expose(&self) -> &str {
        match self {
            ResolvedValue::Plain(v) => v,
            ResolvedValue::Secret(s) => s.expose(),
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, ResolvedValue::Secret(_))
    }
}

/// Inputs an action declared, all bound. Built before any sandbox exists.
#[derive(Debug, Clone, Default)]
pub struct ResolvedInputs {
    values: BTreeMap<String, ResolvedValue>,
}

impl ResolvedInputs {
    /// Bind every name in `required` from `supplied`. Secret-classified keys
    /// and secret references become `ResolvedValue::Secret`.
    pub fn resolve(
        action: &str,
        required: &[String],
        supplied: &HashMap<String, InputValue>,
        store: &dyn SecretStore,
    ) -> Result<Self> {
        let mut values = BTreeMap::new();
        for name in required {
            let value = supplied
                .get(name)
                .ok_or_else(|| StackplanError::UnboundInput {
                    action: action.to_string(),
                    input: name.clone(),
                })?;
            let resolved = match value {
                InputValue::Literal(v) if v.is_empty() => {
                    return Err(StackplanError::UnboundInput {
                        action: action.to_string(),
                        input: name.clone(),
                    })
                }
                InputValue::Literal(v) if is_secret_input(name) => {
                    ResolvedValue::Secret(SecretString::new(v.clone()))
                }
                InputValue::Literal(v) => ResolvedValue::Plain(v.clone()),
                InputValue::Secret { secret } => {
                    let raw = store
                        .resolve(secret)
                        .map_err(|e| StackplanError::SecretBinding {
                            action: action.to_string(),
                            input: name.clone(),
                            reason: e.to_string(),
                        })?;
                    ResolvedValue::Secret(raw)
                }
            };
            values.insert(name.clone(), resolved);
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedValue> {
        self.values.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&ResolvedValue> {
        self.get(name)
            .ok_or_else(|| StackplanError::InputNotResolved(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResolvedValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Union of two input lists, first-seen order.
pub fn merge_input_names(a: &[String], b: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(a.len() + b.len());
    for name in a.iter().chain(b) {
        if !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
