//! Execution engine: runs a plan stage by stage, one fresh sandbox per action.
//!
//! Within a stage every dispatched action runs to completion even if a
//! sibling fails; the first failure in plan order then aborts all later
//! stages. There is no retry and no rollback.

use crate::action::Action;
use crate::config::Config;
use crate::error::{Result, StackplanError};
use crate::fact::FactSet;
use crate::inputs::{merge_input_names, InputValue, ResolvedInputs, ResolvedValue, SecretStore, StaticSecretStore};
use crate::plan::{ActionPlan, PlanAction};
use crate::registry::Registry;
use crate::sandbox::{Sandbox, SandboxContext, SandboxProvider, SecretScope};
use crate::types::Stage;
use crate::utilities::ActionUtilities;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Options and report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Run only these stages. `None` runs every stage.
    pub stages: Option<Vec<Stage>>,
    /// Action names to skip.
    pub exclusions: Vec<String>,
    /// Run stage members one at a time in plan order.
    pub sequential: bool,
}

impl ExecuteOptions {
    fn skips(&self, action: &PlanAction) -> bool {
        self.exclusions.iter().any(|e| e == &action.name)
            || self
                .stages
                .as_ref()
                .is_some_and(|stages| !stages.contains(&action.stage))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed,
    Skipped,
    NotRun,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Succeeded => "succeeded",
            ActionStatus::Failed => "failed",
            ActionStatus::Skipped => "skipped",
            ActionStatus::NotRun => "not_run",
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub name: String,
    pub stage: Stage,
    pub status: ActionStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub plan: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<ActionOutcome>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.status, ActionStatus::Succeeded | ActionStatus::Skipped))
    }

    pub fn outcome(&self, name: &str) -> Option<&ActionOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn with_status(&self, status: ActionStatus) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.status == status)
            .map(|o| o.name.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Per-execution state shared by every action of one run.
struct RunContext<'a> {
    config: Arc<Config>,
    facts: Arc<FactSet>,
    inputs: &'a HashMap<String, InputValue>,
    cancel: &'a CancellationToken,
}

pub struct Executor {
    registry: Arc<Registry>,
    provider: Arc<dyn SandboxProvider>,
    secrets: Arc<dyn SecretStore>,
    source: PathBuf,
}

impl Executor {
    pub fn new(
        registry: Arc<Registry>,
        provider: Arc<dyn SandboxProvider>,
        source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            provider,
            secrets: Arc::new(StaticSecretStore::new()),
            source: source.into(),
        }
    }

    pub fn with_secret_store(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Run the plan. The first failing action's error is returned wrapped in
    /// `ActionFailed`.
    pub async fn execute(
        &self,
        plan: &ActionPlan,
        inputs: HashMap<String, InputValue>,
        options: ExecuteOptions,
        cancel: CancellationToken,
    ) -> Result<ExecutionReport> {
        let (report, result) = self.execute_with_report(plan, &inputs, &options, &cancel).await;
        result.map(|()| report)
    }

    /// Like `execute`, but always returns the per-action report alongside
    /// the overall result.
    pub async fn execute_with_report(
        &self,
        plan: &ActionPlan,
        inputs: &HashMap<String, InputValue>,
        options: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> (ExecutionReport, Result<()>) {
        let started_at = Utc::now();
        let mut outcomes: Vec<ActionOutcome> = plan
            .actions
            .iter()
            .map(|a| ActionOutcome {
                name: a.name.clone(),
                stage: a.stage,
                status: ActionStatus::NotRun,
                duration_ms: 0,
                finished_at: None,
                error: None,
            })
            .collect();

        let result = self
            .run_stages(plan, inputs, options, cancel, &mut outcomes)
            .await;
        let report = ExecutionReport {
            plan: plan.name.clone(),
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        (report, result)
    }

    async fn run_stages(
        &self,
        plan: &ActionPlan,
        inputs: &HashMap<String, InputValue>,
        options: &ExecuteOptions,
        cancel: &CancellationToken,
        outcomes: &mut [ActionOutcome],
    ) -> Result<()> {
        if let Some(unknown) = plan.actions.iter().find(|a| self.registry.get(&a.name).is_none()) {
            return Err(StackplanError::UnknownAction(unknown.name.clone()));
        }
        for (i, action) in plan.actions.iter().enumerate() {
            if options.skips(action) {
                outcomes[i].status = ActionStatus::Skipped;
            }
        }

        let ctx = RunContext {
            config: Arc::new(Config::load(&self.source)?),
            facts: Arc::new(self.registry.evaluate(&self.source)?),
            inputs,
            cancel,
        };
        info!(plan = %plan.name, actions = plan.actions.len(), "execution started");

        for stage in Stage::all() {
            let members: Vec<usize> = (0..plan.actions.len())
                .filter(|&i| plan.actions[i].stage == *stage)
                .filter(|&i| outcomes[i].status != ActionStatus::Skipped)
                .collect();
            if members.is_empty() {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(StackplanError::Cancelled);
            }
            info!(stage = %stage, actions = members.len(), "stage started");

            let results: Vec<(usize, Duration, Result<()>)> = if options.sequential {
                let mut results = Vec::with_capacity(members.len());
                for &i in &members {
                    let (elapsed, result) = self.run_action(&plan.actions[i], &ctx).await;
                    let failed = result.is_err();
                    results.push((i, elapsed, result));
                    if failed {
                        break;
                    }
                }
                results
            } else {
                let runs = members.iter().map(|&i| {
                    let ctx = &ctx;
                    async move {
                        let (elapsed, result) = self.run_action(&plan.actions[i], ctx).await;
                        (i, elapsed, result)
                    }
                });
                futures::future::join_all(runs).await
            };

            let mut first_failure: Option<StackplanError> = None;
            for (i, elapsed, result) in results {
                let outcome = &mut outcomes[i];
                outcome.duration_ms = elapsed.as_millis() as u64;
                outcome.finished_at = Some(Utc::now());
                match result {
                    Ok(()) => {
                        outcome.status = ActionStatus::Succeeded;
                        info!(action = %outcome.name, stage = %stage, duration_ms = outcome.duration_ms, "action succeeded");
                    }
                    Err(e) => {
                        outcome.status = ActionStatus::Failed;
                        outcome.error = Some(e.to_string());
                        error!(action = %outcome.name, stage = %stage, error = %e, "action failed");
                        if first_failure.is_none() {
                            first_failure = Some(match e {
                                StackplanError::Cancelled => StackplanError::Cancelled,
                                other => StackplanError::ActionFailed {
                                    action: outcome.name.clone(),
                                    source: Box::new(other),
                                },
                            });
                        }
                    }
                }
            }
            if let Some(failure) = first_failure {
                warn!(stage = %stage, "aborting remaining stages");
                return Err(failure);
            }
        }
        info!(plan = %plan.name, "execution finished");
        Ok(())
    }

    async fn run_action(&self, planned: &PlanAction, ctx: &RunContext<'_>) -> (Duration, Result<()>) {
        let started = Instant::now();
        let result = self.run_action_inner(planned, ctx).await;
        (started.elapsed(), result)
    }

    async fn run_action_inner(&self, planned: &PlanAction, ctx: &RunContext<'_>) -> Result<()> {
        let entry = self
            .registry
            .get(&planned.name)
            .ok_or_else(|| StackplanError::UnknownAction(planned.name.clone()))?;
        let action = &entry.action;

        // Inputs are bound before anything is provisioned.
        let required = merge_input_names(&planned.inputs, &action.inputs);
        let inputs = ResolvedInputs::resolve(action.name(), &required, ctx.inputs, &*self.secrets)?;

        let image = action.image_for(&ctx.config);
        let scope = SecretScope::new();
        let utils = ActionUtilities::new(
            Arc::clone(&ctx.config),
            Arc::clone(&ctx.facts),
            self.source.clone(),
            scope.clone(),
        );
        let sandbox_ctx = SandboxContext {
            action: action.name().to_string(),
            source: self.source.clone(),
            secrets: scope,
        };

        info!(action = %action.name(), stage = %action.stage, image = %image, "action started");
        // Provisioning is never raced against cancellation: a dropped provision
        // future could leave a started container with nothing to remove it.
        let mut sandbox = self.provider.provision(&image, sandbox_ctx).await?;
        if ctx.cancel.is_cancelled() {
            if let Err(e) = self.provider.teardown(sandbox).await {
                warn!(action = %action.name(), error = %e, "sandbox teardown failed");
            }
            return Err(StackplanError::Cancelled);
        }

        let result = {
            let run = bind_and_run(action, sandbox.as_mut(), &inputs, &utils);
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => Err(StackplanError::Cancelled),
                result = run => result,
            }
        };

        if let Err(e) = self.provider.teardown(sandbox).await {
            warn!(action = %action.name(), error = %e, "sandbox teardown failed");
        }
        result
    }
}

async fn bind_and_run(
    action: &Action,
    sandbox: &mut dyn Sandbox,
    inputs: &ResolvedInputs,
    utils: &ActionUtilities,
) -> Result<()> {
    for (name, value) in inputs.iter() {
        match value {
            ResolvedValue::Plain(v) => sandbox.with_env(name, v),
            ResolvedValue::Secret(secret) => {
                let handle = utils.set_secret(name, secret.clone());
                sandbox
                    .with_secret_env(name, &handle)
                    .map_err(|e| StackplanError::SecretBinding {
                        action: action.name().to_string(),
                        input: name.to_string(),
                        reason: e.to_string(),
                    })?;
            }
        }
    }
    action.script.run(sandbox, inputs, utils).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_skip_excluded_and_filtered() {
        let build = PlanAction {
            name: "npmBuild".into(),
            inputs: vec![],
            stage: Stage::Build,
        };
        let opts = ExecuteOptions {
            stages: Some(vec![Stage::Test]),
            ..Default::default()
        };
        assert!(opts.skips(&build));

        let opts = ExecuteOptions {
            exclusions: vec!["npmBuild".into()],
            ..Default::default()
        };
        assert!(opts.skips(&build));
        assert!(!ExecuteOptions::default().skips(&build));
    }

    #[test]
    fn report_success_ignores_skipped() {
        let report = ExecutionReport {
            plan: "p".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcomes: vec![ActionOutcome {
                name: "a".into(),
                stage: Stage::Build,
                status: ActionStatus::Skipped,
                duration_ms: 0,
                finished_at: None,
                error: None,
            }],
        };
        assert!(report.succeeded());
        assert_eq!(report.with_status(ActionStatus::Skipped), vec!["a"]);
    }
}
