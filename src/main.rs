//! Playground bridge CLI entry point.
//!
//! Boots a runtime module in a worker, waits for it to become ready and
//! runs or checks one script, printing every callback payload as a JSON line.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playground_bridge_common::{ConfigFile, Operation, Outcome};
use playground_bridge_core::{Bindings, ExecutionRequest};
use playground_bridge_worker::RuntimeLoader;

#[derive(Debug, Parser)]
#[command(name = "playground-bridge", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "PLAYGROUND_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Runtime module path or URL, overriding the configuration file
    #[arg(short, long, env = "PLAYGROUND_BRIDGE_MODULE")]
    module: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a script
    Run(ScriptArgs),
    /// Validate a script without executing it
    Check(ScriptArgs),
}

#[derive(Debug, Args)]
struct ScriptArgs {
    /// Script source
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    script: Option<String>,

    /// Read the script from a file
    #[arg(short, long)]
    file: Option<PathBuf>,
}

impl ScriptArgs {
    fn load(self) -> anyhow::Result<String> {
        match (self.script, self.file) {
            (Some(script), _) => Ok(script),
            (None, Some(path)) => std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read script '{}'", path.display())),
            (None, None) => anyhow::bail!("No script given"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warn,playground_bridge=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let file = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => ConfigFile::default(),
    };

    let (operation, script) = match cli.command {
        Command::Run(args) => (Operation::Run, args.load()?),
        Command::Check(args) => (Operation::Check, args.load()?),
    };

    let client = RuntimeLoader::from_config_file(file, cli.module.as_deref())?.spawn()?;
    client
        .wait_ready()
        .await
        .context("Runtime did not become ready")?;
    info!(bridge_id = %client.id(), "Runtime ready");

    let print = |payload: serde_json::Value| println!("{payload}");
    let bindings = match operation {
        Operation::Run => Bindings::new().with_result_callback(print),
        Operation::Check => Bindings::new().with_check_callback(print),
    };

    let call = client.submit(operation, ExecutionRequest::new(script, bindings))?;
    let wait = call.wait();
    tokio::pin!(wait);

    let outcome = tokio::select! {
        outcome = &mut wait => outcome?,
        _ = tokio::signal::ctrl_c() => {
            if !client.cancel() {
                warn!("Runtime cannot be cancelled; waiting for the call to finish");
            }
            wait.await?
        }
    };

    client.shutdown().await;

    Ok(match outcome {
        Outcome::Success => ExitCode::SUCCESS,
        Outcome::Failure { .. } => ExitCode::FAILURE,
    })
}
