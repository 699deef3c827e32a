use crate::output::{join_or_dash, print_json, print_table};
use anyhow::Context;
use stackplan_core::actions::default_registry;
use stackplan_core::config::Config;

pub fn run(json: bool) -> anyhow::Result<()> {
    let registry = default_registry().context("failed to register actions")?;
    let defaults = Config::default();

    if json {
        let entries: Vec<_> = registry
            .actions()
            .map(|entry| {
                serde_json::json!({
                    "name": entry.action.name(),
                    "display_name": entry.action.spec.display_name,
                    "description": entry.action.spec.description,
                    "stage": entry.action.stage,
                    "image": entry.action.image_for(&defaults),
                    "required_facts": entry.resolver.required_facts,
                    "optional_facts": entry.resolver.optional_facts,
                    "inputs": entry.action.inputs,
                })
            })
            .collect();
        return print_json(&entries);
    }

    let rows = registry
        .actions()
        .map(|entry| {
            vec![
                entry.action.name().to_string(),
                entry.action.stage.to_string(),
                join_or_dash(&entry.resolver.required_facts),
                join_or_dash(&entry.action.inputs),
                entry.action.image_for(&defaults),
            ]
        })
        .collect();
    print_table(&["ACTION", "STAGE", "FACTS", "INPUTS", "IMAGE"], rows);
    Ok(())
}
