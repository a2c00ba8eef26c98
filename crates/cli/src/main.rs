//! agentrun CLI: the main entry point.
//!
//! Commands:
//! - `run`     : Execute a manifest and print the result as JSON
//! - `render`  : Print the rendered prompts without calling a model
//! - `validate`: Check a manifest for structural errors
//! - `config`  : Show the config path or write a default config

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentrun",
    about = "agentrun: execute LLM agent manifests",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a manifest
    Run {
        /// Manifest file (.json or .toml)
        manifest: PathBuf,

        #[command(flatten)]
        vars: commands::VarArgs,

        /// Image to attach after the user prompt (repeatable)
        #[arg(short, long = "attach")]
        attachments: Vec<PathBuf>,

        /// Config file (defaults to ~/.agentrun/config.toml)
        #[arg(short, long, env = "AGENTRUN_CONFIG")]
        config: Option<PathBuf>,

        /// Print the full message stack along with the result
        #[arg(long)]
        messages: bool,
    },

    /// Print the rendered system and user prompts
    Render {
        /// Manifest file (.json or .toml)
        manifest: PathBuf,

        #[command(flatten)]
        vars: commands::VarArgs,
    },

    /// Validate a manifest
    Validate {
        /// Manifest file (.json or .toml)
        manifest: PathBuf,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run {
            manifest,
            vars,
            attachments,
            config,
            messages,
        } => {
            commands::run::run(commands::run::RunArgs {
                manifest,
                vars,
                attachments,
                config,
                messages,
            })
            .await?
        }
        Commands::Render { manifest, vars } => commands::render::run(&manifest, &vars)?,
        Commands::Validate { manifest } => commands::validate::run(&manifest)?,
        Commands::Config { action } => commands::config::run(action)?,
    }

    Ok(())
}
