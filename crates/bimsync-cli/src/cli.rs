use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bimsync")]
#[command(about = "Synchronize BIM projects and objectives with a remote connection")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Synchronization config (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Acting user linked to synchronized projects; overrides the config
    #[arg(long, global = true, value_name = "ID")]
    pub user_id: Option<i64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one synchronization against a remote snapshot file
    Sync {
        /// Remote snapshot (JSON); rewritten with the remote state after the run
        #[arg(long, value_name = "FILE")]
        remote: PathBuf,
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show row counts of the local store
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
