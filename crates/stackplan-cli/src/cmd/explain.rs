use crate::output::{join_or_dash, print_json, print_table};
use anyhow::Context;
use stackplan_core::plan::ActionPlan;
use std::path::Path;

pub fn run(plan_path: &Path, json: bool) -> anyhow::Result<()> {
    let plan = ActionPlan::load(plan_path)
        .with_context(|| format!("failed to load plan {}", plan_path.display()))?;

    if json {
        print_json(&serde_json::json!({
            "plan": plan.name,
            "stages": plan
                .stages()
                .iter()
                .map(|(stage, members)| serde_json::json!({
                    "stage": stage,
                    "actions": members,
                }))
                .collect::<Vec<_>>(),
            "inputs": plan.required_inputs(),
            "fields": plan.fields,
        }))?;
        return Ok(());
    }

    println!("Plan: {}", plan.name);
    if plan.actions.is_empty() {
        println!("\nNo actions.");
        return Ok(());
    }

    println!();
    let mut rows = Vec::new();
    for (stage, members) in plan.stages() {
        for action in members {
            rows.push(vec![
                stage.to_string(),
                action.name.clone(),
                join_or_dash(&action.inputs),
            ]);
        }
    }
    print_table(&["STAGE", "ACTION", "INPUTS"], rows);

    if !plan.fields.is_empty() {
        println!();
        let rows = plan
            .fields
            .iter()
            .map(|f| vec![f.name.clone(), f.kind.to_string(), f.default.to_string()])
            .collect();
        print_table(&["FIELD", "TYPE", "DEFAULT"], rows);
    }

    println!("\nRequired inputs: {}", join_or_dash(&plan.required_inputs()));
    Ok(())
}
