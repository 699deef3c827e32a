use crate::output::print_json;
use crate::root::resolve_source;
use anyhow::Context;
use clap::Subcommand;
use stackplan_core::config::{Config, WarnLevel};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate .stackplan.yaml for common mistakes
    Validate {
        /// Repository holding .stackplan.yaml (default: auto-detect)
        #[arg(long, env = "STACKPLAN_SOURCE")]
        source: Option<PathBuf>,
    },
}

pub fn run(subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Validate { source } => {
            validate(&resolve_source(source.as_deref()), json)
        }
    }
}

fn validate(source: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(source).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
