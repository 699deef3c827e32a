use crate::output::{print_json, print_table};
use anyhow::Context;
use stackplan_core::actions::default_registry;
use stackplan_core::engine::{ExecuteOptions, ExecutionReport, Executor};
use stackplan_core::inputs::{EnvSecretStore, InputValue};
use stackplan_core::io::parse_env_pairs;
use stackplan_core::plan::ActionPlan;
use stackplan_core::sandbox::DockerProvider;
use stackplan_core::stack::{self, InputBundle};
use stackplan_core::types::Stage;
use stackplan_core::CancellationToken;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Env-file values with this prefix are secret references resolved from the
/// process environment at bind time.
const ENV_REF_PREFIX: &str = "env:";

pub struct RunArgs {
    pub plan: PathBuf,
    pub inputs: Option<PathBuf>,
    pub identity: Option<PathBuf>,
    pub stages: Vec<String>,
    pub exclude: Vec<String>,
    pub sequential: bool,
}

pub fn run(source: &Path, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let plan = ActionPlan::load(&args.plan)
        .with_context(|| format!("failed to load plan {}", args.plan.display()))?;
    let inputs = match &args.inputs {
        Some(path) => load_inputs(path, args.identity.as_deref(), &plan)?,
        None => HashMap::new(),
    };
    let options = ExecuteOptions {
        stages: parse_stages(&args.stages)?,
        exclusions: args.exclude,
        sequential: args.sequential,
    };

    let registry = Arc::new(default_registry().context("failed to register actions")?);
    let executor = Executor::new(registry, Arc::new(DockerProvider::new()), source)
        .with_secret_store(Arc::new(EnvSecretStore));

    let rt = tokio::runtime::Runtime::new()?;
    let (report, result) = rt.block_on(async {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, cancelling");
                    cancel.cancel();
                }
            })
        };
        let outcome = executor
            .execute_with_report(&plan, &inputs, &options, &cancel)
            .await;
        watcher.abort();
        outcome
    });

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    result.with_context(|| format!("plan '{}' failed", plan.name))
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A `.json` file is an encrypted bundle; anything else is a KEY=VALUE file.
fn load_inputs(
    path: &Path,
    identity: Option<&Path>,
    plan: &ActionPlan,
) -> anyhow::Result<HashMap<String, InputValue>> {
    if path.extension().is_some_and(|ext| ext == "json") {
        let bundle = InputBundle::load(path)
            .with_context(|| format!("failed to load bundle {}", path.display()))?;
        let missing = bundle.missing_for(plan);
        if !missing.is_empty() {
            tracing::warn!(bundle = %bundle.name, missing = ?missing, "bundle lacks plan inputs");
        }
        let identity = resolve_identity(identity)?;
        let values = stack::decrypt(&bundle, &identity).context("failed to decrypt bundle")?;
        return Ok(stack::to_input_values(values));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let pairs = parse_env_pairs(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(pairs
        .into_iter()
        .map(|(key, value)| {
            let value = match value.strip_prefix(ENV_REF_PREFIX) {
                Some(var) => InputValue::secret(var),
                None => InputValue::literal(value),
            };
            (key, value)
        })
        .collect())
}

pub(crate) fn resolve_identity(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    stack::default_identity().ok_or_else(|| {
        anyhow::anyhow!(
            "no identity key found\n\
             Set STACKPLAN_AGE_IDENTITY or use --identity <path>\n\
             (tried ~/.config/stackplan/age.key and ~/.age/key.txt)"
        )
    })
}

fn parse_stages(raw: &[String]) -> anyhow::Result<Option<Vec<Stage>>> {
    let names: Vec<&str> = raw
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if names.is_empty() {
        return Ok(None);
    }
    let stages = names
        .into_iter()
        .map(|s| s.parse::<Stage>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(stages))
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

fn print_report(report: &ExecutionReport) {
    if report.outcomes.is_empty() {
        println!("Plan '{}' has no actions.", report.plan);
        return;
    }
    let rows = report
        .outcomes
        .iter()
        .map(|o| {
            vec![
                o.stage.to_string(),
                o.name.clone(),
                o.status.to_string(),
                format!("{:.1}s", o.duration_ms as f64 / 1000.0),
            ]
        })
        .collect();
    print_table(&["STAGE", "ACTION", "STATUS", "TIME"], rows);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn empty_plan() -> ActionPlan {
        ActionPlan {
            name: "checkout".into(),
            actions: Vec::new(),
            fields: Vec::new(),
        }
    }

    #[test]
    fn stages_parse_in_given_order() {
        let parsed = parse_stages(&["test".into(), " prerelease ".into()]).unwrap();
        assert_eq!(parsed, Some(vec![Stage::Test, Stage::Prerelease]));
        assert_eq!(parse_stages(&[]).unwrap(), None);
        assert!(parse_stages(&["deploy".into()]).is_err());
    }

    #[test]
    fn env_file_values_become_literals_or_env_refs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inputs.env");
        std::fs::write(
            &path,
            "ARGOCD_SERVER=argocd.example.com\nARGOCD_AUTH_TOKEN=env:CI_ARGOCD_TOKEN\n",
        )
        .unwrap();
        let inputs = load_inputs(&path, None, &empty_plan()).unwrap();
        assert_eq!(
            inputs["ARGOCD_SERVER"],
            InputValue::literal("argocd.example.com")
        );
        assert_eq!(
            inputs["ARGOCD_AUTH_TOKEN"],
            InputValue::secret("CI_ARGOCD_TOKEN")
        );
    }

    #[test]
    fn explicit_identity_is_used_as_is() {
        let path = Path::new("/keys/ci.key");
        assert_eq!(resolve_identity(Some(path)).unwrap(), path);
    }
}
