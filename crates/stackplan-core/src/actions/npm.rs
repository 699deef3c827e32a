//! `npmBuild` and `npmTest` for repositories with a root `package.json`.

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

pub const BUILD: &str = "npmBuild";
pub const TEST: &str = "npmTest";

pub const PACKAGE_FACT: &str = "npmPackage";
pub const BUILD_SCRIPT_FACT: &str = "npmBuildScript";
pub const TEST_SCRIPT_FACT: &str = "npmTestScript";

/// What `npm init` writes into `scripts.test`.
const PLACEHOLDER_TEST: &str = "echo \"Error: no test specified\" && exit 1";

// ---------------------------------------------------------------------------
// Facts
// ---------------------------------------------------------------------------

fn manifest(fact: &str, files: &[ScannedFile]) -> Result<Option<(ScannedFile, serde_json::Value)>> {
    let Some(file) = files.first() else {
        return Ok(None);
    };
    let content = file.read_to_string(fact)?;
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| file.error(fact, e.to_string()))?;
    Ok(Some((file.clone(), value)))
}

fn package(files: &[ScannedFile]) -> Result<Option<Fact>> {
    let Some((file, value)) = manifest(PACKAGE_FACT, files)? else {
        return Ok(None);
    };
    let mut fact = Fact::at(PACKAGE_FACT, &file);
    if let Some(name) = value.get("name").and_then(|n| n.as_str()) {
        fact = fact.with_detail("name", name);
    }
    Ok(Some(fact))
}

fn script_fact(fact: &str, script: &str, files: &[ScannedFile]) -> Result<Option<Fact>> {
    let Some((file, value)) = manifest(fact, files)? else {
        return Ok(None);
    };
    let command = value
        .pointer(&format!("/scripts/{script}"))
        .and_then(|s| s.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != PLACEHOLDER_TEST);
    Ok(command.map(|c| Fact::at(fact, &file).with_detail("command", c)))
}

fn build_script(files: &[ScannedFile]) -> Result<Option<Fact>> {
    script_fact(BUILD_SCRIPT_FACT, "build", files)
}

fn test_script(files: &[ScannedFile]) -> Result<Option<Fact>> {
    script_fact(TEST_SCRIPT_FACT, "test", files)
}

pub fn fact_definitions() -> Vec<FactDefinition> {
    let manifest = vec![PatternMatch::path(r"package\.json")];
    vec![
        FactDefinition::new(PACKAGE_FACT, manifest.clone(), package),
        FactDefinition::new(BUILD_SCRIPT_FACT, manifest.clone(), build_script),
        FactDefinition::new(TEST_SCRIPT_FACT, manifest, test_script),
    ]
}

// ---------------------------------------------------------------------------
// Scripts
// ---------------------------------------------------------------------------

fn node_image(config: &Config) -> String {
    format!("node:{}", config.node.version)
}

/// `npm ci` when a lockfile is committed, `npm install` otherwise.
async fn install(sandbox: &mut dyn Sandbox, utils: &ActionUtilities) -> Result<()> {
    let verb = if utils.source().join("package-lock.json").exists() {
        "ci"
    } else {
        "install"
    };
    sandbox.run(&argv(["npm", verb])).await?;
    Ok(())
}

struct NpmScript {
    script: &'static str,
}

#[async_trait]
impl Script for NpmScript {
    async fn run(
        &self,
        sandbox: &mut dyn Sandbox,
        _inputs: &ResolvedInputs,
        utils: &ActionUtilities,
    ) -> Result<()> {
        install(sandbox, utils).await?;
        sandbox.run(&argv(["npm", "run", self.script])).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

pub fn register(builder: &mut RegistryBuilder) -> Result<()> {
    for def in fact_definitions() {
        builder.register_fact(def)?;
    }

    let build = ActionSpec::new(BUILD, "npm Build", "Run the package's build script.");
    builder.register_admission_resolver(
        AdmissionResolver::new(build.clone()).requires_facts(&[PACKAGE_FACT, BUILD_SCRIPT_FACT]),
    )?;
    builder.register_action(
        Action::new(
            build,
            Stage::Build,
            node_image,
            Arc::new(NpmScript { script: "build" }),
        )
        .with_fields(&[config::NODE_VERSION]),
    )?;

    let test = ActionSpec::new(TEST, "npm Test", "Run the package's test script.");
    builder.register_admission_resolver(
        AdmissionResolver::new(test.clone()).requires_facts(&[PACKAGE_FACT, TEST_SCRIPT_FACT]),
    )?;
    builder.register_action(
        Action::new(
            test,
            Stage::Test,
            node_image,
            Arc::new(NpmScript { script: "test" }),
        )
        .with_fields(&[config::NODE_VERSION]),
    )
}
