//! `sonarScan`: static analysis against a SonarQube server.

use crate::action::{Action, Script};
use crate::admission::{ActionSpec, AdmissionResolver};
use crate::error::Result;
use crate::fact::{Fact, FactDefinition, ScannedFile};
use crate::inputs::{InputKey, ResolvedInputs};
use crate::paths::SANDBOX_SOURCE_DIR;
use crate::pattern::PatternMatch;
use crate::registry::RegistryBuilder;
use crate::sandbox::{argv, Sandbox};
use crate::types::Stage;
use crate::utilities::ActionUtilities;
use async_trait::async_trait;
use std::sync::Arc;

pub const NAME: &str = "sonarScan";
pub const PROJECT_FACT: &str = "sonarProject";
const IMAGE: &str = "sonarsource/sonar-scanner-cli";

/// `sonar-project.properties` at the root; records `sonar.projectKey`.
fn project(files: &[ScannedFile]) -> Result<Option<Fact>> {
    let Some(file) = files.first() else {
        return Ok(None);
    };
    let content = file.read_to_string(PROJECT_FACT)?;
    let mut fact = Fact::at(PROJECT_FACT, file);
    let key = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#'))
        .find_map(|l| l.strip_prefix("sonar.projectKey"))
        .and_then(|rest| rest.trim_start().strip_prefix('='))
        .map(str::trim);
    if let Some(key) = key {
        fact = fact.with_detail("projectKey", key);
    }
    Ok(Some(fact))
}

pub fn fact_definitions() -> Vec<FactDefinition> {
    vec![FactDefinition::new(
        PROJECT_FACT,
        vec![PatternMatch::path(r"sonar-project\.properties")],
        project,
    )]
}

struct SonarScript;

#[async_trait]
impl Script for SonarScript {
    async fn run(
        &self,
        sandbox: &mut dyn Sandbox,
        inputs: &ResolvedInputs,
        _utils: &ActionUtilities,
    ) -> Result<()> {
        // The scanner reads both from the environment bound by the engine.
        inputs.require(InputKey::SonarHostUrl.as_str())?;
        inputs.require(InputKey::SonarToken.as_str())?;
        let base_dir = format!("-Dsonar.projectBaseDir={SANDBOX_SOURCE_DIR}");
        sandbox
            .run(&argv(["sonar-scanner", base_dir.as_str()]))
            .await?;
        Ok(())
    }
}

pub fn register(builder: &mut RegistryBuilder) -> Result<()> {
    for def in fact_definitions() {
        builder.register_fact(def)?;
    }
    let inputs = [InputKey::SonarHostUrl.as_str(), InputKey::SonarToken.as_str()];
    let spec = ActionSpec::new(NAME, "SonarQube Scan", "Analyze the source with SonarQube.");
    builder.register_admission_resolver(
        AdmissionResolver::new(spec.clone())
            .requires_facts(&[PROJECT_FACT])
            .requires_inputs(&inputs),
    )?;
    builder.register_action(
        Action::new(spec, Stage::Test, |_| IMAGE.to_string(), Arc::new(SonarScript))
            .with_inputs(&inputs),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn records_project_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sonar-project.properties");
        std::fs::write(&path, "# sonar\nsonar.projectKey = acme_shop\nsonar.sources=src\n").unwrap();
        let files = [ScannedFile {
            path,
            relative: "sonar-project.properties".into(),
        }];
        let fact = project(&files).unwrap().unwrap();
        assert_eq!(fact.detail("projectKey"), Some("acme_shop"));
    }
}
