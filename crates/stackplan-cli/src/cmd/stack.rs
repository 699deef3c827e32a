use crate::cmd::run::resolve_identity;
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use stackplan_core::io::{self, parse_env_pairs};
use stackplan_core::plan::ActionPlan;
use stackplan_core::stack::{self, InputBundle};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand tree
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum StackSubcommand {
    /// Write an `export KEY=` inputs template for every input a plan requires
    Init {
        /// Plan whose inputs the template lists
        #[arg(long)]
        from_plan: PathBuf,
        /// Template path (default: inputs.env next to the plan)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Overwrite an existing template
        #[arg(long)]
        force: bool,
    },
    /// Encrypt a KEY=VALUE inputs file into a bundle
    Encrypt {
        /// Filled-in inputs file
        inputs: PathBuf,
        /// age X25519 recipient (age1...)
        #[arg(long, env = "STACKPLAN_AGE_RECIPIENT")]
        recipient: String,
        /// Deployment target this bundle belongs to (e.g. production)
        #[arg(long)]
        name: String,
        /// Bundle path (default: <name>.json next to the inputs file)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Decrypt a bundle and print KEY=VALUE pairs to stdout
    Decrypt {
        /// Bundle file
        bundle: PathBuf,
        /// age identity (default: ~/.config/stackplan/age.key or ~/.age/key.txt)
        #[arg(long, env = "STACKPLAN_AGE_IDENTITY")]
        identity: Option<PathBuf>,
    },
    /// List the input names a bundle carries (no decryption required)
    Names {
        /// Bundle file
        bundle: PathBuf,
        /// Also report inputs this plan requires that the bundle lacks
        #[arg(long)]
        plan: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(subcommand: StackSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        StackSubcommand::Init {
            from_plan,
            output,
            force,
        } => init(&from_plan, output, force, json),
        StackSubcommand::Encrypt {
            inputs,
            recipient,
            name,
            output,
        } => encrypt(&inputs, &recipient, &name, output, json),
        StackSubcommand::Decrypt { bundle, identity } => decrypt(&bundle, identity.as_deref()),
        StackSubcommand::Names { bundle, plan } => names(&bundle, plan.as_deref(), json),
    }
}

fn sibling(path: &Path, file_name: &str) -> PathBuf {
    path.parent()
        .map(|dir| dir.join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(plan_path: &Path, output: Option<PathBuf>, force: bool, json: bool) -> anyhow::Result<()> {
    let plan = ActionPlan::load(plan_path)
        .with_context(|| format!("failed to load plan {}", plan_path.display()))?;
    let output = output.unwrap_or_else(|| sibling(plan_path, "inputs.env"));
    let template = stack::inputs_template(&plan);

    let written = if force {
        io::atomic_write(&output, template.as_bytes())?;
        true
    } else {
        io::write_if_missing(&output, template.as_bytes())?
    };
    if !written {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }

    let inputs = plan.required_inputs();
    if json {
        print_json(&serde_json::json!({ "path": output, "inputs": inputs }))?;
    } else {
        println!(
            "Wrote {} with {} input(s).",
            output.display(),
            inputs.len()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// encrypt / decrypt
// ---------------------------------------------------------------------------

fn encrypt(
    inputs_path: &Path,
    recipient: &str,
    name: &str,
    output: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(inputs_path)
        .with_context(|| format!("failed to read {}", inputs_path.display()))?;
    let pairs = parse_env_pairs(&content)?;
    let empty: Vec<&str> = pairs
        .iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(k, _)| k.as_str())
        .collect();
    if !empty.is_empty() {
        anyhow::bail!("inputs without a value: {}", empty.join(", "));
    }

    let bundle = stack::encrypt(name, &pairs, recipient).context("failed to encrypt inputs")?;
    let output = output.unwrap_or_else(|| sibling(inputs_path, &format!("{name}.json")));
    bundle.save(&output)?;

    if json {
        print_json(&serde_json::json!({ "path": output, "inputs": bundle.key_names() }))?;
    } else {
        println!(
            "Encrypted {} input(s) into {}.",
            bundle.inputs.len(),
            output.display()
        );
    }
    Ok(())
}

fn decrypt(bundle_path: &Path, identity: Option<&Path>) -> anyhow::Result<()> {
    let bundle = InputBundle::load(bundle_path)
        .with_context(|| format!("failed to load bundle {}", bundle_path.display()))?;
    let identity = resolve_identity(identity)?;
    let values = stack::decrypt(&bundle, &identity).context("failed to decrypt bundle")?;
    for (key, value) in values {
        println!("{key}={value}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// names
// ---------------------------------------------------------------------------

fn names(bundle_path: &Path, plan: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let bundle = InputBundle::load(bundle_path)
        .with_context(|| format!("failed to load bundle {}", bundle_path.display()))?;
    let missing = match plan {
        Some(path) => {
            let plan = ActionPlan::load(path)
                .with_context(|| format!("failed to load plan {}", path.display()))?;
            bundle.missing_for(&plan)
        }
        None => Vec::new(),
    };

    if json {
        print_json(&serde_json::json!({
            "name": bundle.name,
            "recipient": bundle.recipient,
            "inputs": bundle.key_names(),
            "missing": missing,
        }))?;
        return Ok(());
    }

    let mut rows: Vec<Vec<String>> = bundle
        .key_names()
        .into_iter()
        .map(|k| vec![k.to_string(), "present".to_string()])
        .collect();
    rows.extend(missing.iter().map(|k| vec![k.clone(), "missing".to_string()]));
    print_table(&["INPUT", "STATUS"], rows);
    if !missing.is_empty() {
        anyhow::bail!("bundle '{}' lacks {} plan input(s)", bundle.name, missing.len());
    }
    Ok(())
}
