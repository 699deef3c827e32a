//! Secure input bundles, one per deployment target.
//!
//! A bundle is a JSON document whose input values are each encrypted to a
//! single age X25519 recipient with the `age` binary:
//!
//! ```json
//! { "name": "production", "recipient": "age1...", "inputs": { "ARGOCD_AUTH_TOKEN": "-----BEGIN AGE ENCRYPTED FILE-----..." } }
//! ```
//!
//! Key names stay readable so a bundle can be checked against a plan without
//! the identity. The engine never decrypts; callers decrypt and pass literals.

use crate::error::{Result, StackplanError};
use crate::inputs::InputValue;
use crate::io;
use crate::plan::ActionPlan;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

// ---------------------------------------------------------------------------
// InputBundle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBundle {
    pub name: String,
    pub recipient: String,
    /// Input name to ASCII-armored age ciphertext.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

impl InputBundle {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        io::atomic_write(path, data.as_bytes())
    }

    pub fn key_names(&self) -> Vec<&str> {
        self.inputs.keys().map(String::as_str).collect()
    }

    /// Inputs the plan requires that this bundle does not carry.
    pub fn missing_for(&self, plan: &ActionPlan) -> Vec<String> {
        plan.required_inputs()
            .into_iter()
            .filter(|k| !self.inputs.contains_key(k))
            .collect()
    }
}

pub fn validate_recipient(recipient: &str) -> Result<()> {
    let r = recipient.trim();
    if !r.starts_with("age1") || r.len() < 10 || r.contains(char::is_whitespace) {
        return Err(StackplanError::InvalidRecipient(recipient.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// AGE binary and identity resolution
// ---------------------------------------------------------------------------

fn age_bin() -> Result<PathBuf> {
    which::which("age").map_err(|_| StackplanError::AgeNotInstalled)
}

/// Default identity file for decryption: `~/.config/stackplan/age.key`, then
/// `~/.age/key.txt`.
pub fn default_identity() -> Option<PathBuf> {
    let home = home::home_dir()?;
    let candidates = [
        home.join(".config").join("stackplan").join("age.key"),
        home.join(".age").join("key.txt"),
    ];
    candidates.into_iter().find(|p| p.exists())
}

/// Feed `input` to `age` with `args` and return stdout.
fn run_age(args: &[&str], input: &[u8], fail: fn(String) -> StackplanError) -> Result<Vec<u8>> {
    let bin = age_bin()?;
    let mut child = Command::new(&bin)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| fail(e.to_string()))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input).map_err(|e| fail(e.to_string()))?;
    }
    let output = child.wait_with_output().map_err(|e| fail(e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(fail(stderr.trim().to_string()));
    }
    Ok(output.stdout)
}

// ---------------------------------------------------------------------------
// Encryption / decryption
// ---------------------------------------------------------------------------

/// Encrypt each value independently to `recipient`.
pub fn encrypt(name: &str, inputs: &[(String, String)], recipient: &str) -> Result<InputBundle> {
    validate_recipient(recipient)?;
    let recipient = recipient.trim();
    let mut encrypted = BTreeMap::new();
    for (key, value) in inputs {
        let armored = run_age(
            &["--encrypt", "--armor", "--recipient", recipient],
            value.as_bytes(),
            StackplanError::AgeEncryptFailed,
        )?;
        let armored =
            String::from_utf8(armored).map_err(|e| StackplanError::AgeEncryptFailed(e.to_string()))?;
        encrypted.insert(key.clone(), armored);
        debug!(bundle = name, input = %key, "input encrypted");
    }
    Ok(InputBundle {
        name: name.to_string(),
        recipient: recipient.to_string(),
        inputs: encrypted,
    })
}

/// Decrypt every value of `bundle` with the identity file at `identity`.
pub fn decrypt(bundle: &InputBundle, identity: &Path) -> Result<BTreeMap<String, String>> {
    if !identity.exists() {
        return Err(StackplanError::AgeDecryptFailed(format!(
            "identity file {} does not exist",
            identity.display()
        )));
    }
    let identity = identity.to_str().ok_or_else(|| {
        StackplanError::AgeDecryptFailed("identity path contains non-UTF8 characters".into())
    })?;
    let mut plain = BTreeMap::new();
    for (key, armored) in &bundle.inputs {
        let value = run_age(
            &["--decrypt", "--identity", identity],
            armored.as_bytes(),
            StackplanError::AgeDecryptFailed,
        )
        .map_err(|e| match e {
            StackplanError::AgeDecryptFailed(reason) => {
                StackplanError::AgeDecryptFailed(format!("{key}: {reason}"))
            }
            other => other,
        })?;
        let value =
            String::from_utf8(value).map_err(|e| StackplanError::AgeDecryptFailed(e.to_string()))?;
        plain.insert(key.clone(), value);
    }
    Ok(plain)
}

/// Decrypted values as execution inputs.
pub fn to_input_values(values: BTreeMap<String, String>) -> HashMap<String, InputValue> {
    values
        .into_iter()
        .map(|(k, v)| (k, InputValue::Literal(v)))
        .collect()
}

/// `export KEY=` template listing every input the plan requires.
pub fn inputs_template(plan: &ActionPlan) -> String {
    let header = format!(
        "inputs for plan '{}'\nfill in values, then run: stackplan stack encrypt <file> --recipient age1... --name <target>",
        plan.name
    );
    io::render_env_template(&header, &plan.required_inputs())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanAction;
    use crate::types::Stage;
    use tempfile::TempDir;

    fn plan() -> ActionPlan {
        ActionPlan {
            name: "checkout".into(),
            actions: vec![PlanAction {
                name: "argocdSync".into(),
                inputs: vec!["ARGOCD_SERVER".into(), "ARGOCD_AUTH_TOKEN".into()],
                stage: Stage::Prerelease,
            }],
            fields: vec![],
        }
    }

    #[test]
    fn recipient_must_be_age_key() {
        validate_recipient("age1ql3z7hjy54pw3hyww5ayyfg7zqgvc7w3j2elw8zmrj2kg5sfn9aqmcac8p").unwrap();
        assert!(validate_recipient("ssh-ed25519 AAAA").is_err());
        assert!(validate_recipient("age1").is_err());
    }

    #[test]
    fn encrypt_rejects_bad_recipient_before_running_age() {
        let err = encrypt("prod", &[("A".into(), "1".into())], "not-a-key").unwrap_err();
        assert!(matches!(err, StackplanError::InvalidRecipient(_)));
    }

    #[test]
    fn bundle_roundtrips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prod.bundle.json");
        let bundle = InputBundle {
            name: "prod".into(),
            recipient: "age1example".into(),
            inputs: BTreeMap::from([(
                "ARGOCD_SERVER".to_string(),
                "-----BEGIN AGE ENCRYPTED FILE-----".to_string(),
            )]),
        };
        bundle.save(&path).unwrap();
        assert_eq!(InputBundle::load(&path).unwrap(), bundle);
        assert_eq!(bundle.missing_for(&plan()), vec!["ARGOCD_AUTH_TOKEN"]);
    }

    #[test]
    fn decrypt_requires_existing_identity() {
        let bundle = InputBundle {
            name: "prod".into(),
            recipient: "age1example".into(),
            inputs: BTreeMap::new(),
        };
        let err = decrypt(&bundle, Path::new("/nonexistent/key.txt")).unwrap_err();
        assert!(matches!(err, StackplanError::AgeDecryptFailed(_)));
    }

    #[test]
    fn template_lists_plan_inputs() {
        let out = inputs_template(&plan());
        assert!(out.starts_with("# inputs for plan 'checkout'\n"));
        assert!(out.ends_with("export ARGOCD_SERVER=\nexport ARGOCD_AUTH_TOKEN=\n"));
    }

    #[test]
    fn decrypted_values_become_literals() {
        let values = BTreeMap::from([("A".to_string(), "1".to_string())]);
        let inputs = to_input_values(values);
        assert_eq!(inputs["A"], InputValue::literal("1"));
    }
}
