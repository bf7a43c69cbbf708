//! bimsync CLI - Synchronize BIM projects and objectives from the terminal
//!
//! Runs the three-way synchronization engine against a local libSQL store
//! and a remote snapshot file.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::{Directive, EnvFilter};

use crate::cli::{Cli, Commands};
use crate::commands::common::{load_config, resolve_db_path};
use crate::commands::{run_status, run_sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "bimsync=info".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;

    match cli.command {
        Commands::Sync { remote, json } => {
            let config = load_config(cli.config.as_deref(), cli.user_id)?;
            let cancel = cancel_on_ctrl_c();
            run_sync(&remote, json, &db_path, config, &cancel).await?;
        }
        Commands::Status { json } => run_status(json, &db_path).await?,
    }

    Ok(())
}

/// Token cancelled by the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling synchronization");
            token.cancel();
        }
    });
    cancel
}
