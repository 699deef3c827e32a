mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, stack::StackSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stackplan",
    about = "Build stage-ordered CI/CD action plans from a repository and run them in sandboxes",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a repository and build its action plan
    Plan {
        /// Repository to evaluate (default: auto-detect from .stackplan.yaml or .git/)
        #[arg(long, env = "STACKPLAN_SOURCE")]
        source: Option<PathBuf>,
        /// Plan name (default: the repository directory name)
        #[arg(long)]
        name: Option<String>,
        /// Directory the plan file is written to (default: the repository)
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Print the plan without writing it
        #[arg(long)]
        dry_run: bool,
        /// Fail when no action is admitted
        #[arg(long)]
        require_actions: bool,
    },

    /// Show a plan's stages, actions, inputs and fields
    Explain {
        /// Path to a .plan file
        plan: PathBuf,
    },

    /// List the registered action catalog
    Actions,

    /// Execute a plan against a repository
    Run {
        /// Path to a .plan file
        plan: PathBuf,
        /// Repository the plan runs against (default: auto-detect)
        #[arg(long, env = "STACKPLAN_SOURCE")]
        source: Option<PathBuf>,
        /// Input values: a KEY=VALUE env file or an encrypted bundle (.json)
        #[arg(long)]
        inputs: Option<PathBuf>,
        /// age identity used to decrypt a bundle
        #[arg(long, env = "STACKPLAN_AGE_IDENTITY")]
        identity: Option<PathBuf>,
        /// Run only these stages (comma-separated)
        #[arg(long, value_delimiter = ',')]
        stages: Vec<String>,
        /// Skip this action (repeatable)
        #[arg(long = "exclude")]
        exclude: Vec<String>,
        /// Run the actions of a stage one at a time
        #[arg(long)]
        sequential: bool,
    },

    /// Manage encrypted input bundles
    Stack {
        #[command(subcommand)]
        subcommand: StackSubcommand,
    },

    /// Inspect repository configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Plan {
            source,
            name,
            out_dir,
            dry_run,
            require_actions,
        } => {
            let source = root::resolve_source(source.as_deref());
            cmd::plan::run(
                &source,
                cmd::plan::PlanArgs {
                    name,
                    out_dir,
                    dry_run,
                    require_actions,
                },
                cli.json,
            )
        }
        Commands::Explain { plan } => cmd::explain::run(&plan, cli.json),
        Commands::Actions => cmd::actions::run(cli.json),
        Commands::Run {
            plan,
            source,
            inputs,
            identity,
            stages,
            exclude,
            sequential,
        } => {
            let source = root::resolve_source(source.as_deref());
            cmd::run::run(
                &source,
                cmd::run::RunArgs {
                    plan,
                    inputs,
                    identity,
                    stages,
                    exclude,
                    sequential,
                },
                cli.json,
            )
        }
        Commands::Stack { subcommand } => cmd::stack::run(subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
