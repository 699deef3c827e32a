//! Container sandboxes driven through the docker (or podman) CLI.
//!
//! A sandbox is a detached container idling on `tail -f /dev/null` with the
//! source mounted at `/src`. Commands run through `exec`; secret variables
//! are passed as bare `-e NAME` so their values only live in the exec
//! client's environment, never on a command line.

use super::{Sandbox, SandboxContext, SandboxProvider, SecretHandle, SecretScope};
use crate::error::{Result, StackplanError};
use crate::paths::SANDBOX_SOURCE_DIR;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

const RUNTIMES: &[&str] = &["docker", "podman"];

#[derive(Debug, Clone, Default)]
pub struct DockerProvider {
    binary: Option<PathBuf>,
}

impl DockerProvider {
    /// Detect the runtime lazily on first provision.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }

    fn binary(&self) -> Result<PathBuf> {
        if let Some(bin) = &self.binary {
            return Ok(bin.clone());
        }
        RUNTIMES
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or(StackplanError::NoContainerRuntime)
    }
}

#[async_trait]
impl SandboxProvider for DockerProvider {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn provision(&self, image: &str, ctx: SandboxContext) -> Result<Box<dyn Sandbox>> {
        let binary = self.binary()?;
        let name = format!("stackplan-{}", uuid::Uuid::new_v4());
        let mount = format!("{}:{SANDBOX_SOURCE_DIR}", ctx.source.display());
        let output = Command::new(&binary)
            .args(["run", "-d", "--name", name.as_str(), "-v", mount.as_str()])
            .args(["-w", SANDBOX_SOURCE_DIR])
            .args(["--entrypoint", "tail", image, "-f", "/dev/null"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| StackplanError::SandboxProvision {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(StackplanError::SandboxProvision {
                image: image.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!(action = %ctx.action, image, container = %name, "sandbox provisioned");
        Ok(Box::new(DockerSandbox {
            binary,
            name,
            image: image.to_string(),
            env: Vec::new(),
            secret_env: Vec::new(),
            secrets: ctx.secrets,
            removed: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// DockerSandbox
// ---------------------------------------------------------------------------

struct DockerSandbox {
    binary: PathBuf,
    name: String,
    image: String,
    env: Vec<(String, String)>,
    secret_env: Vec<(String, SecretHandle)>,
    secrets: SecretScope,
    removed: bool,
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn id(&self) -> &str {
        &self.name
    }

    fn image(&self) -> &str {
        &self.image
    }

    fn with_env(&mut self, key: &str, value: &str) {
        self.env.retain(|(k, _)| k != key);
        self.env.push((key.to_string(), value.to_string()));
    }

    fn with_secret_env(&mut self, key: &str, secret: &SecretHandle) -> Result<()> {
        if !self.secrets.contains(secret) {
            return Err(StackplanError::Sandbox(format!(
                "{secret} is not registered for this sandbox"
            )));
        }
        self.secret_env.retain(|(k, _)| k != key);
        self.secret_env.push((key.to_string(), secret.clone()));
        Ok(())
    }

    async fn run(&mut self, args: &[String]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("exec");
        for (key, value) in &self.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        for (key, handle) in &self.secret_env {
            let value = self.secrets.reveal(handle).ok_or_else(|| {
                StackplanError::Sandbox(format!("{handle} was released before use"))
            })?;
            cmd.arg("-e").arg(key);
            cmd.env(key, value.expose());
        }
        cmd.arg(&self.name).args(args);
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        let command = args.join(" ");
        debug!(container = %self.name, command = %command, "sandbox exec");
        let output = cmd
            .output()
            .await
            .map_err(|e| StackplanError::Sandbox(format!("failed to exec `{command}`: {e}")))?;
        if !output.status.success() {
            return Err(StackplanError::SandboxCommand {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn terminate(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }
        let output = Command::new(&self.binary)
            .args(["rm", "-f", self.name.as_str()])
            .stdin(Stdio::null())
            .output()
            .await?;
        self.removed = true;
        self.secrets.clear();
        if !output.status.success() {
            return Err(StackplanError::Sandbox(format!(
                "failed to remove container {}: {}",
                self.name,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!(container = %self.name, "sandbox removed");
        Ok(())
    }
}

impl Drop for DockerSandbox {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        warn!(container = %self.name, "sandbox dropped without teardown; force-removing");
        // Fire and forget: drop may run on a runtime worker, so never wait here.
        if let Err(e) = spawn_force_remove(&self.binary, &self.name) {
            warn!(container = %self.name, error = %e, "failed to spawn container removal");
        }
    }
}

/// Start `<runtime> rm -f <name>` detached, without waiting for it.
fn spawn_force_remove(binary: &Path, name: &str) -> std::io::Result<std::process::Child> {
    std::process::Command::new(binary)
        .args(["rm", "-f", name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
}
