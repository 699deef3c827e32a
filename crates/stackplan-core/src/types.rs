use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Execution phase of an action. Stages are totally ordered; actions in the
/// same stage have no ordering relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Build,
    Test,
    Prerelease,
    Release,
    PostRelease,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[
            Stage::Build,
            Stage::Test,
            Stage::Prerelease,
            Stage::Release,
            Stage::PostRelease,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Stage> {
        Stage::all().get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Build => "build",
            Stage::Test => "test",
            Stage::Prerelease => "prerelease",
            Stage::Release => "release",
            Stage::PostRelease => "post_release",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = crate::error::StackplanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(Stage::Build),
            "test" => Ok(Stage::Test),
            "prerelease" | "pre_release" | "pre-release" => Ok(Stage::Prerelease),
            "release" => Ok(Stage::Release),
            "post_release" | "post-release" | "postrelease" => Ok(Stage::PostRelease),
            _ => Err(crate::error::StackplanError::InvalidStage(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

/// Value type of a configuration field surfaced in a plan document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    String,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::String => "string",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FieldKind {
    type Err = crate::error::StackplanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(FieldKind::Bool),
            "string" => Ok(FieldKind::String),
            _ => Err(crate::error::StackplanError::InvalidFieldType(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
