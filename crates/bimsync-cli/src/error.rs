use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] bimsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Could not read {path}: {source}")]
    ReadFile { path: PathBuf, source: io::Error },
    #[error("Could not resolve a data directory; pass --db-path")]
    NoDataDir,
    #[error("Synchronization cancelled")]
    Cancelled,
    #[error("{0} entities failed to synchronize")]
    SyncFailures(usize),
}
