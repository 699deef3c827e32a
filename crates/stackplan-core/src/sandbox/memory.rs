//! In-memory sandbox provider that records every interaction.
//!
//! Used by tests and by `--dry-run`-style tooling: no process is spawned.
//! Commands succeed with empty output unless a scripted response, failure or
//! delay matches the command's leading arguments.

use super::{Sandbox, SandboxContext, SandboxProvider, SecretHandle, SecretScope};
use crate::error::{Result, StackplanError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One command observed by a memory sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub action: String,
    pub image: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Names of secret variables bound at the time; values are never recorded.
    pub secret_env: Vec<String>,
}

impl RecordedCommand {
    pub fn line(&self) -> String {
        self.args.join(" ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    /// `(action, image)` per provisioned sandbox, in provision order.
    pub provisioned: Vec<(String, String)>,
    pub commands: Vec<RecordedCommand>,
    /// Actions whose sandbox was torn down.
    pub torn_down: Vec<String>,
}

impl MemoryLog {
    pub fn commands_for(&self, action: &str) -> Vec<&RecordedCommand> {
        self.commands.iter().filter(|c| c.action == action).collect()
    }

    pub fn provisioned_actions(&self) -> Vec<&str> {
        self.provisioned.iter().map(|(a, _)| a.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
enum Behaviour {
    Respond(String),
    Fail { code: i32, stderr: String },
    Delay(Duration),
}

#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    log: Arc<Mutex<MemoryLog>>,
    scripted: Vec<(String, Behaviour)>,
    failing_images: Vec<String>,
    provision_delay: Option<Duration>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands whose joined argv starts with `prefix` print `stdout`.
    pub fn respond(mut self, prefix: &str, stdout: &str) -> Self {
        self.scripted
            .push((prefix.to_string(), Behaviour::Respond(stdout.to_string())));
        self
    }

    /// Commands whose joined argv starts with `prefix` exit with `code`.
    pub fn fail(mut self, prefix: &str, code: i32, stderr: &str) -> Self {
        self.scripted.push((
            prefix.to_string(),
            Behaviour::Fail {
                code,
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    /// Commands whose joined argv starts with `prefix` sleep before succeeding.
    pub fn delay(mut self, prefix: &str, duration: Duration) -> Self {
        self.scripted
            .push((prefix.to_string(), Behaviour::Delay(duration)));
        self
    }

    /// Every provision sleeps this long before the sandbox exists.
    pub fn provision_delay(mut self, duration: Duration) -> Self {
        self.provision_delay = Some(duration);
        self
    }

    pub fn fail_provision(mut self, image: &str) -> Self {
        self.failing_images.push(image.to_string());
        self
    }

    /// Snapshot of everything recorded so far.
    pub fn log(&self) -> MemoryLog {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SandboxProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn provision(&self, image: &str, ctx: SandboxContext) -> Result<Box<dyn Sandbox>> {
        if let Some(delay) = self.provision_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_images.iter().any(|i| i == image) {
            return Err(StackplanError::SandboxProvision {
                image: image.to_string(),
                reason: "image unavailable".to_string(),
            });
        }
        let id = {
            let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
            log.provisioned
                .push((ctx.action.clone(), image.to_string()));
            format!("memory-{}", log.provisioned.len())
        };
        Ok(Box::new(MemorySandbox {
            id,
            action: ctx.action,
            image: image.to_string(),
            env: BTreeMap::new(),
            secret_env: BTreeMap::new(),
            secrets: ctx.secrets,
            scripted: self.scripted.clone(),
            log: Arc::clone(&self.log),
            terminated: false,
        }))
    }
}

struct MemorySandbox {
    id: String,
    action: String,
    image: String,
    env: BTreeMap<String, String>,
    secret_env: BTreeMap<String, SecretHandle>,
    secrets: SecretScope,
    scripted: Vec<(String, Behaviour)>,
    log: Arc<Mutex<MemoryLog>>,
    terminated: bool,
}

#[async_trait]
impl Sandbox for MemorySandbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn image(&self) -> &str {
        &self.image
    }

    fn with_env(&mut self, key: &str, value: &str) {
        self.env.insert(key.to_string(), value.to_string());
    }

    fn with_secret_env(&mut self, key: &str, secret: &SecretHandle) -> Result<()> {
        if !self.secrets.contains(secret) {
            return Err(StackplanError::Sandbox(format!(
                "{secret} is not registered for this sandbox"
            )));
        }
        self.secret_env.insert(key.to_string(), secret.clone());
        Ok(())
    }

    async fn run(&mut self, args: &[String]) -> Result<String> {
        if self.terminated {
            return Err(StackplanError::Sandbox(format!("{} is terminated", self.id)));
        }
        let record = RecordedCommand {
            action: self.action.clone(),
            image: self.image.clone(),
            args: args.to_vec(),
            env: self.env.clone(),
            secret_env: self.secret_env.keys().cloned().collect(),
        };
        let line = record.line();
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .commands
            .push(record);

        let behaviour = self
            .scripted
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, b)| b.clone());
        match behaviour {
            Some(Behaviour::Respond(stdout)) => Ok(stdout),
            Some(Behaviour::Fail { code, stderr }) => Err(StackplanError::SandboxCommand {
                command: line,
                code,
                stderr,
            }),
            Some(Behaviour::Delay(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(String::new())
            }
            None => Ok(String::new()),
        }
    }

    async fn terminate(&mut self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;
        self.secrets.clear();
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .torn_down
            .push(self.action.clone());
        Ok(())
    }
}
