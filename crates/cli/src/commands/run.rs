//! `agentrun run`: Execute a manifest and print the result.

use std::path::PathBuf;

use agentrun_agent::Orchestrator;
use agentrun_config::AppConfig;
use serde_json::json;
use tracing::{info, warn};

use super::{CliResult, VarArgs, load_attachment, load_manifest};

pub struct RunArgs {
    pub manifest: PathBuf,
    pub vars: VarArgs,
    pub attachments: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub messages: bool,
}

pub async fn run(args: RunArgs) -> CliResult<()> {
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;

    let manifest = load_manifest(&args.manifest)?;
    let variables = args.vars.bindings()?;
    let attachments = args
        .attachments
        .iter()
        .map(|path| load_attachment(path))
        .collect::<CliResult<Vec<_>>>()?;

    let mut orchestrator = Orchestrator::from_config(manifest, &config)?
        .with_variables(variables)
        .with_attachments(attachments);
    info!(run_id = %orchestrator.run_id(), manifest = %args.manifest.display(), "Starting execution");

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling execution");
            cancel.cancel();
        }
    });

    let result = orchestrator.execute().await;

    let output = if args.messages {
        serde_json::to_value(&result)?
    } else {
        json!({
            "ok": result.ok,
            "usage": result.usage,
            "result": &result.result,
            "error": &result.error,
        })
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    if !result.ok {
        let reason = result
            .error
            .unwrap_or_else(|| "execution cancelled".to_string());
        return Err(reason.into());
    }
    Ok(())
}
