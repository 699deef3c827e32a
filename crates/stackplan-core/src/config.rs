use crate::error::Result;
use crate::paths;
use crate::types::FieldKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// FieldSpec
// ---------------------------------------------------------------------------

/// A configuration field an action reads. Surfaced in plan documents together
/// with the value the repository currently resolves it to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

pub const ARGOCD_INSECURE: FieldSpec = FieldSpec::new("argocd.insecure", FieldKind::Bool);
pub const ARGOCD_GRPC_WEB: FieldSpec = FieldSpec::new("argocd.grpc_web", FieldKind::Bool);
pub const ARGOCD_IMAGE: FieldSpec = FieldSpec::new("argocd.image", FieldKind::String);
pub const NODE_VERSION: FieldSpec = FieldSpec::new("node.version", FieldKind::String);
pub const PYTHON_VERSION: FieldSpec = FieldSpec::new("python.version", FieldKind::String);
pub const GOLANG_VERSION: FieldSpec = FieldSpec::new("golang.version", FieldKind::String);
pub const CONTAINER_NAME: FieldSpec = FieldSpec::new("container.name", FieldKind::String);
pub const CONTAINER_TAG: FieldSpec = FieldSpec::new("container.tag", FieldKind::String);
pub const TRIVY_SEVERITY: FieldSpec = FieldSpec::new("trivy.severity", FieldKind::String);

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgoCdConfig {
    /// Skip server certificate verification (`--insecure`).
    #[serde(default)]
    pub insecure: bool,
    /// Use gRPC-web for servers behind proxies without HTTP/2 (`--grpc-web`).
    #[serde(default)]
    pub grpc_web: bool,
    #[serde(default = "default_argocd_image")]
    pub image: String,
}

fn default_argocd_image() -> String {
    "argoproj/argocd".to_string()
}

impl Default for ArgoCdConfig {
    fn default() -> Self {
        Self {
            insecure: false,
            grpc_web: false,
            image: default_argocd_image(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_version")]
    pub version: String,
}

fn default_node_version() -> String {
    "20".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            version: default_node_version(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonConfig {
    #[serde(default = "default_python_version")]
    pub version: String,
}

fn default_python_version() -> String {
    "3.12".to_string()
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            version: default_python_version(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GolangConfig {
    #[serde(default = "default_golang_version")]
    pub version: String,
}

fn default_golang_version() -> String {
    "1.22".to_string()
}

impl Default for GolangConfig {
    fn default() -> Self {
        Self {
            version: default_golang_version(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Repository name of the published image, without registry host.
    #[serde(default = "default_container_name")]
    pub name: String,
    #[serde(default = "default_container_tag")]
    pub tag: String,
}

fn default_container_name() -> String {
    "app".to_string()
}

fn default_container_tag() -> String {
    "latest".to_string()
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: default_container_name(),
            tag: default_container_tag(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrivyConfig {
    /// Comma-separated severities that fail the scan.
    #[serde(default = "default_trivy_severity")]
    pub severity: String,
}

fn default_trivy_severity() -> String {
    "HIGH,CRITICAL".to_string()
}

impl Default for TrivyConfig {
    fn default() -> Self {
        Self {
            severity: default_trivy_severity(),
        }
    }
}

const TRIVY_SEVERITIES: &[&str] = &["UNKNOWN", "LOW", "MEDIUM", "HIGH", "CRITICAL"];

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

/// Repository-wide configuration, read from `.stackplan.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub argocd: ArgoCdConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub python: PythonConfig,
    #[serde(default)]
    pub golang: GolangConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub trivy: TrivyConfig,
}

impl Config {
    /// Load the repository config. A missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Config::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Look up a dotted field (e.g. `argocd.insecure`) as a JSON value.
    pub fn field_value(&self, name: &str) -> Option<serde_json::Value> {
        let root = serde_json::to_value(self).ok()?;
        let pointer = format!("/{}", name.replace('.', "/"));
        root.pointer(&pointer).cloned()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for (field, value) in [
            ("node.version", &self.node.version),
            ("python.version", &self.python.version),
            ("golang.version", &self.golang.version),
            ("container.tag", &self.container.tag),
            ("argocd.image", &self.argocd.image),
        ] {
            if value.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{field} is empty"),
                });
            }
        }

        if self.container.name.contains(':') {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "container.name '{}' contains a tag; set container.tag instead",
                    self.container.name
                ),
            });
        }

        for severity in self.trivy.severity.split(',').map(str::trim) {
            if !TRIVY_SEVERITIES.contains(&severity) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("unknown trivy severity '{severity}'"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
