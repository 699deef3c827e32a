//! Ephemeral build environments.
//!
//! A provider turns an image into a running sandbox with the source repository
//! mounted. Scripts only ever see `&mut dyn Sandbox`; the engine owns the box
//! and hands it back to the provider for teardown on every exit path.

pub mod docker;
pub mod memory;

use crate::error::Result;
use crate::inputs::SecretString;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub use docker::DockerProvider;
pub use memory::{MemoryLog, MemoryProvider, RecordedCommand};

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Opaque reference to a secret registered in a `SecretScope`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretHandle {
    name: String,
}

impl SecretHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for SecretHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "secret:{}", self.name)
    }
}

/// Secrets registered for one action. Shared between the action's utilities
/// and its sandbox; dropped with the sandbox.
#[derive(Debug, Clone, Default)]
pub struct SecretScope {
    values: Arc<Mutex<HashMap<String, SecretString>>>,
}

impl SecretScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, value: SecretString) -> SecretHandle {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(name.to_string(), value);
        SecretHandle {
            name: name.to_string(),
        }
    }

    /// Raw value behind a handle. Only sandbox implementations call this.
    pub fn reveal(&self, handle: &SecretHandle) -> Option<SecretString> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(&handle.name).cloned()
    }

    pub fn contains(&self, handle: &SecretHandle) -> bool {
        self.reveal(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.clear();
    }
}

// ---------------------------------------------------------------------------
// Sandbox traits
// ---------------------------------------------------------------------------

/// Everything a provider needs besides the image.
#[derive(Debug, Clone)]
pub struct SandboxContext {
    pub action: String,
    /// Host path of the repository, mounted at `paths::SANDBOX_SOURCE_DIR`.
    pub source: PathBuf,
    pub secrets: SecretScope,
}

#[async_trait]
pub trait Sandbox: Send {
    fn id(&self) -> &str;

    fn image(&self) -> &str;

    /// Set a plain environment variable for every subsequent command.
    fn with_env(&mut self, key: &str, value: &str);

    /// Expose a registered secret as an environment variable. The raw value
    /// is looked up at command time and never recorded.
    fn with_secret_env(&mut self, key: &str, secret: &SecretHandle) -> Result<()>;

    /// Run a command inside the sandbox and return its stdout. A nonzero exit
    /// is a `SandboxCommand` error.
    async fn run(&mut self, args: &[String]) -> Result<String>;

    /// Stop and remove the environment. Idempotent.
    async fn terminate(&mut self) -> Result<()>;
}

#[async_trait]
pub trait SandboxProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn provision(&self, image: &str, ctx: SandboxContext) -> Result<Box<dyn Sandbox>>;

    async fn teardown(&self, mut sandbox: Box<dyn Sandbox>) -> Result<()> {
        sandbox.terminate().await
    }
}

/// Build an argv from string slices.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}
