use crate::output::{join_or_dash, print_json, print_table};
use anyhow::Context;
use stackplan_core::actions::default_registry;
use stackplan_core::plan::{ActionPlan, FilePlanStore, PlanBuilder, PlanOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct PlanArgs {
    pub name: Option<String>,
    pub out_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub require_actions: bool,
}

pub fn run(source: &Path, args: PlanArgs, json: bool) -> anyhow::Result<()> {
    let registry = Arc::new(default_registry().context("failed to register actions")?);
    let out_dir = args.out_dir.unwrap_or_else(|| source.to_path_buf());
    let store = FilePlanStore::new(&out_dir);
    let builder = PlanBuilder::new(registry, Arc::new(store.clone())).with_options(PlanOptions {
        name: args.name,
        require_actions: args.require_actions,
    });

    let document = builder
        .create_action_plan(source, args.dry_run)
        .with_context(|| format!("failed to build plan for {}", source.display()))?;

    if args.dry_run {
        // The document is the output.
        println!("{document}");
        return Ok(());
    }

    let plan = ActionPlan::from_document(&document)?;
    let path = store.path_for(&plan.name);

    if json {
        print_json(&serde_json::json!({
            "plan": plan.name,
            "path": path,
            "actions": plan.actions.len(),
        }))?;
        return Ok(());
    }

    if plan.actions.is_empty() {
        println!("No actions admitted for {}.", source.display());
    } else {
        let rows = plan
            .actions
            .iter()
            .map(|a| vec![a.stage.to_string(), a.name.clone(), join_or_dash(&a.inputs)])
            .collect();
        print_table(&["STAGE", "ACTION", "INPUTS"], rows);
    }
    println!("\nPlan '{}' written to {}", plan.name, path.display());
    Ok(())
}
