//! `golangTest`: `go test ./...` for Go modules.

use crate::action::{Action, Script};
use crate::admission::{ActionSpec, AdmissionResolver};
use crate::config::{self, Config};
use crate::error::Result;
use crate::fact::{Fact, FactDefinition, ScannedFile};
use crate::inputs::ResolvedInputs;
use crate::pattern::PatternMatch;
use crate::registry::RegistryBuilder;
use crate::sandbox::{argv, Sandbox};
use crate::types::Stage;
use crate::utilities::ActionUtilities;
use async_trait::async_trait;
use std::sync::Arc;

pub const NAME: &str = "golangTest";
pub const MODULE_FACT: &str = "goModule";

fn module(files: &[ScannedFile]) -> Result<Option<Fact>> {
    let Some(file) = files.first() else {
        return Ok(None);
    };
    let content = file.read_to_string(MODULE_FACT)?;
    let path = content
        .lines()
        .find_map(|l| l.trim().strip_prefix("module "))
        .map(|m| m.trim().trim_matches('"'))
        .filter(|m| !m.is_empty())
        .ok_or_else(|| file.error(MODULE_FACT, "no module directive"))?;
    Ok(Some(Fact::at(MODULE_FACT, file).with_detail("module", path)))
}

pub fn fact_definitions() -> Vec<FactDefinition> {
    vec![FactDefinition::new(
        MODULE_FACT,
        vec![PatternMatch::path(r"go\.mod")],
        module,
    )]
}

fn golang_image(config: &Config) -> String {
    format!("golang:{}", config.golang.version)
}

struct GoTestScript;

#[async_trait]
impl Script for GoTestScript {
    async fn run(
        &self,
        sandbox: &mut dyn Sandbox,
        _inputs: &ResolvedInputs,
        _utils: &ActionUtilities,
    ) -> Result<()> {
        sandbox.run(&argv(["go", "test", "./..."])).await?;
        Ok(())
    }
}

pub fn register(builder: &mut RegistryBuilder) -> Result<()> {
    for def in fact_definitions() {
        builder.register_fact(def)?;
    }
    let spec = ActionSpec::new(NAME, "Go Test", "Run the module's Go tests.");
    builder.register_admission_resolver(
        AdmissionResolver::new(spec.clone()).requires_facts(&[MODULE_FACT]),
    )?;
    builder.register_action(
        Action::new(spec, Stage::Test, golang_image, Arc::new(GoTestScript))
            .with_fields(&[config::GOLANG_VERSION]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_module_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("go.mod");
        std::fs::write(&path, "// comment\nmodule github.com/acme/shop\n\ngo 1.22\n").unwrap();
        let files = [ScannedFile {
            path,
            relative: "go.mod".into(),
        }];
        let fact = module(&files).unwrap().unwrap();
        assert_eq!(fact.detail("module"), Some("github.com/acme/shop"));
    }

    #[test]
    fn image_follows_config() {
        let mut config = Config::default();
        config.golang.version = "1.21-alpine".into();
        assert_eq!(golang_image(&config), "golang:1.21-alpine");
    }
}
