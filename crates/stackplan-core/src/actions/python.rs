//! `pytestRun`: run pytest for repositories that configure it.

use crate::action::{Action, Script};
use crate::admission::{ActionSpec, AdmissionResolver};
use crate::config::{self, Config};
use crate::error::Result;
use crate::fact::{present, Fact, FactDefinition, ScannedFile};
use crate::inputs::ResolvedInputs;
use crate::pattern::PatternMatch;
use crate::registry::RegistryBuilder;
use crate::sandbox::{argv, Sandbox};
use crate::types::Stage;
use crate::utilities::ActionUtilities;
use async_trait::async_trait;
use std::sync::Arc;

pub const NAME: &str = "pytestRun";
pub const PYTEST_FACT: &str = "pytestConfigured";
pub const REQUIREMENTS_FACT: &str = "pythonRequirements";

// ---------------------------------------------------------------------------
// Facts
// ---------------------------------------------------------------------------

/// `pytest.ini` or a `conftest.py` anywhere, or a pytest section in
/// `pyproject.toml` / `setup.cfg`.
fn pytest_configured(files: &[ScannedFile]) -> Result<Option<Fact>> {
    for file in files {
        let configured = match file.file_name() {
            "pytest.ini" | "conftest.py" => true,
            "pyproject.toml" => file
                .read_to_string(PYTEST_FACT)?
                .contains("[tool.pytest.ini_options]"),
            "setup.cfg" => file.read_to_string(PYTEST_FACT)?.contains("[tool:pytest]"),
            _ => false,
        };
        if configured {
            return Ok(Some(Fact::at(PYTEST_FACT, file)));
        }
    }
    Ok(None)
}

fn requirements(files: &[ScannedFile]) -> Result<Option<Fact>> {
    Ok(present(REQUIREMENTS_FACT, files))
}

pub fn fact_definitions() -> Vec<FactDefinition> {
    vec![
        FactDefinition::new(
            PYTEST_FACT,
            vec![
                PatternMatch::path(r"pytest\.ini|pyproject\.toml|setup\.cfg"),
                PatternMatch::file(r"conftest\.py"),
            ],
            pytest_configured,
        ),
        FactDefinition::new(
            REQUIREMENTS_FACT,
            vec![PatternMatch::path(r"requirements\.txt")],
            requirements,
        ),
    ]
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

fn python_image(config: &Config) -> String {
    format!("python:{}", config.python.version)
}

struct PytestScript;

#[async_trait]
impl Script for PytestScript {
    async fn run(
        &self,
        sandbox: &mut dyn Sandbox,
        _inputs: &ResolvedInputs,
        utils: &ActionUtilities,
    ) -> Result<()> {
        if let Some(reqs) = utils.facts().get(REQUIREMENTS_FACT) {
            let path = reqs.detail("path").unwrap_or("requirements.txt").to_string();
            sandbox
                .run(&argv(["pip", "install", "-r", path.as_str()]))
                .await?;
        }
        sandbox.run(&argv(["pip", "install", "pytest"])).await?;
        sandbox.run(&argv(["python", "-m", "pytest"])).await?;
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
    let spec = ActionSpec::new(NAME, "pytest", "Run the Python test suite with pytest.");
    builder.register_admission_resolver(
        AdmissionResolver::new(spec.clone())
            .requires_facts(&[PYTEST_FACT])
            .optional_facts(&[REQUIREMENTS_FACT]),
    )?;
    builder.register_action(
        Action::new(spec, Stage::Test, python_image, Arc::new(PytestScript))
            .with_fields(&[config::PYTHON_VERSION]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(dir: &TempDir, rel: &str, content: &str) -> ScannedFile {
        let path = dir.path().join(rel);
        std::fs::write(&path, content).unwrap();
        ScannedFile {
            path,
            relative: rel.into(),
        }
    }

    #[test]
    fn pyproject_needs_pytest_section() {
        let dir = TempDir::new().unwrap();
        let plain = file(&dir, "pyproject.toml", "[project]\nname = \"svc\"\n");
        assert!(pytest_configured(&[plain]).unwrap().is_none());

        let configured = file(
            &dir,
            "pyproject.toml",
            "[tool.pytest.ini_options]\naddopts = \"-q\"\n",
        );
        assert!(pytest_configured(&[configured]).unwrap().is_some());
    }

    #[test]
    fn conftest_is_enough() {
        let dir = TempDir::new().unwrap();
        let conftest = file(&dir, "conftest.py", "");
        let fact = pytest_configured(&[conftest]).unwrap().unwrap();
        assert_eq!(fact.detail("path"), Some("conftest.py"));
    }
}
