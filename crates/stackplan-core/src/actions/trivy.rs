//! `trivyFilesystemScan`: vulnerability scan of dependency lockfiles.
//!
//! Declares no facts; it is scoped to lockfile patterns instead and admitted
//! whenever one of them matches.

use crate::action::{Action, Script};
use crate::admission::{ActionSpec, AdmissionResolver};
use crate::config;
use crate::error::Result;
use crate::inputs::ResolvedInputs;
use crate::pattern::PatternMatch;
use crate::registry::RegistryBuilder;
use crate::sandbox::{argv, Sandbox};
use crate::types::Stage;
use crate::utilities::ActionUtilities;
use async_trait::async_trait;
use std::sync::Arc;

pub const NAME: &str = "trivyFilesystemScan";
const IMAGE: &str = "aquasec/trivy";

pub fn lockfile_patterns() -> Vec<PatternMatch> {
    vec![PatternMatch::file(
        r"package-lock\.json|yarn\.lock|pnpm-lock\.yaml|go\.sum|Cargo\.lock|poetry\.lock|Pipfile\.lock|Gemfile\.lock|composer\.lock",
    )]
}

struct ScanScript;

#[async_trait]
impl Script for ScanScript {
    async fn run(
        &self,
        sandbox: &mut dyn Sandbox,
        _inputs: &ResolvedInputs,
        utils: &ActionUtilities,
    ) -> Result<()> {
        let severity = utils.get_config().trivy.severity.clone();
        sandbox
            .run(&argv([
                "trivy",
                "filesystem",
                "--exit-code",
                "1",
                "--no-progress",
                "--severity",
                severity.as_str(),
                ".",
            ]))
            .await?;
        Ok(())
    }
}

pub fn register(builder: &mut RegistryBuilder) -> Result<()> {
    let spec = ActionSpec::new(
        NAME,
        "Trivy Filesystem Scan",
        "Scan dependency lockfiles for known vulnerabilities.",
    );
    builder.register_admission_resolver(
        AdmissionResolver::new(spec.clone()).scoped_to(lockfile_patterns()),
    )?;
    builder.register_action(
        Action::new(spec, Stage::Test, |_| IMAGE.to_string(), Arc::new(ScanScript))
            .with_fields(&[config::TRIVY_SEVERITY]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lockfile_scope_matches_common_lockfiles() {
        let compiled: Vec<_> = lockfile_patterns()
            .iter()
            .map(|p| p.compile().unwrap())
            .collect();
        for name in ["package-lock.json", "go.sum", "Cargo.lock", "poetry.lock"] {
            assert!(compiled.iter().any(|p| p.is_match(name, name)), "{name}");
        }
        assert!(!compiled.iter().any(|p| p.is_match("package.json", "package.json")));
    }
}
