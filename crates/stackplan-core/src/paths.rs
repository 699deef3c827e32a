use crate::error::{Result, StackplanError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// File and directory constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = ".stackplan.yaml";
pub const PLAN_EXTENSION: &str = "plan";

/// Directories never descended into while scanning a repository.
pub const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target", "vendor", ".venv"];

/// Mount point of the source repository inside a sandbox.
pub const SANDBOX_SOURCE_DIR: &str = "/src";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn plan_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{PLAN_EXTENSION}"))
}

pub fn is_skipped_dir(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name)
}

/// `/`-separated form of `path` relative to `root`, used for pattern matching
/// and for paths handed to sandbox commands.
pub fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// Plan name validation
// ---------------------------------------------------------------------------

static PLAN_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn plan_name_re() -> &'static Regex {
    PLAN_NAME_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9._\-]*[a-z0-9]$|^[a-z0-9]$").expect("static regex")
    })
}

pub fn validate_plan_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 128 || !plan_name_re().is_match(name) {
        return Err(StackplanError::InvalidPlanName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
