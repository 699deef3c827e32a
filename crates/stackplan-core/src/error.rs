use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackplanError {
    // -- fact evaluation (degrades to "fact absent") --------------------------
    #[error("fact '{fact}' could not be evaluated from {path}: {reason}")]
    FactEvaluation {
        fact: String,
        path: PathBuf,
        reason: String,
    },

    #[error("fact '{0}' is not present for this repository")]
    FactMissing(String),

    // -- registration (fatal at startup) --------------------------------------
    #[error("action '{0}' is registered more than once")]
    DuplicateAction(String),

    #[error("malformed admission resolver for '{action}': {reason}")]
    MalformedResolver { action: String, reason: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // -- plan building --------------------------------------------------------
    #[error("repository {path} is unreadable: {reason}")]
    RepositoryUnreadable { path: PathBuf, reason: String },

    #[error("no actions were admitted for {0}")]
    NoActionsAdmitted(String),

    #[error("invalid plan name '{0}'")]
    InvalidPlanName(String),

    #[error("invalid source url '{0}': {1}")]
    InvalidSourceUrl(String, String),

    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("invalid field type: {0}")]
    InvalidFieldType(String),

    // -- execution ------------------------------------------------------------
    #[error("action '{action}' failed: {source}")]
    ActionFailed {
        action: String,
        #[source]
        source: Box<StackplanError>,
    },

    #[error("plan references unknown action '{0}'")]
    UnknownAction(String),

    #[error("required input '{input}' for action '{action}' is not bound")]
    UnboundInput { action: String, input: String },

    #[error("secret for input '{input}' of action '{action}' could not be bound: {reason}")]
    SecretBinding {
        action: String,
        input: String,
        reason: String,
    },

    #[error("secret reference '{reference}' could not be resolved: {reason}")]
    SecretUnresolved { reference: String, reason: String },

    #[error("input '{0}' was not resolved for this action")]
    InputNotResolved(String),

    #[error("failed to provision sandbox from image '{image}': {reason}")]
    SandboxProvision { image: String, reason: String },

    #[error("sandbox command `{command}` exited with {code}: {stderr}")]
    SandboxCommand {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("no container runtime found: install docker or podman")]
    NoContainerRuntime,

    #[error("execution cancelled")]
    Cancelled,

    // -- secure input bundles -------------------------------------------------
    #[error("age binary not found: install age (https://age-encryption.org)")]
    AgeNotInstalled,

    #[error("age encryption failed: {0}")]
    AgeEncryptFailed(String),

    #[error("age decryption failed: {0}")]
    AgeDecryptFailed(String),

    #[error("invalid age recipient '{0}': expected an age1... public key")]
    InvalidRecipient(String),

    #[error("malformed inputs line {line}: {reason}")]
    MalformedInputs { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StackplanError {
    /// True for errors raised while assembling the registry. These abort
    /// startup rather than a single plan build.
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            StackplanError::DuplicateAction(_)
                | StackplanError::MalformedResolver { .. }
                | StackplanError::InvalidPattern { .. }
        )
    }

    /// Name of the action an execution error is attributed to, if any.
    pub fn action(&self) -> Option<&str> {
        match self {
            StackplanError::ActionFailed { action, .. }
            | StackplanError::UnboundInput { action, .. }
            | StackplanError::SecretBinding { action, .. } => Some(action),
            StackplanError::UnknownAction(name) => Some(name),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StackplanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_failed_keeps_source_message_verbatim() {
        let err = StackplanError::ActionFailed {
            action: "argocdSync".into(),
            source: Box::new(StackplanError::SandboxCommand {
                command: "argocd app sync checkout".into(),
                code: 20,
                stderr: "application not found".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("action 'argocdSync' failed: "));
        assert!(msg.contains("application not found"));
        assert_eq!(err.action(), Some("argocdSync"));
    }

    #[test]
    fn registration_errors_are_classified() {
        assert!(StackplanError::DuplicateAction("x".into()).is_registration());
        assert!(!StackplanError::Cancelled.is_registration());
    }
}
