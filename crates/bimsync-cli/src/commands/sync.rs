use std::fs;
use std::path::Path;

use bimsync_core::config::SynchronizationConfig;
use bimsync_core::db::LibSqlStore;
use bimsync_core::remote::memory::InMemoryConnection;
use bimsync_core::sync::{SyncReport, Synchronizer};
use tokio_util::sync::CancellationToken;

use crate::commands::common::{format_report_lines, open_database, read_file};
use crate::error::CliError;

/// Synchronize the store at `db_path` with the snapshot at `remote_path`.
///
/// The snapshot file is rewritten with the remote state after the run, also
/// when the run was cancelled.
pub async fn execute_sync(
    remote_path: &Path,
    db_path: &Path,
    config: SynchronizationConfig,
    cancel: &CancellationToken,
) -> Result<SyncReport, CliError> {
    let payload = read_file(remote_path)?;
    let connection = InMemoryConnection::from_json(config.connection_info_id, &payload)?;

    let db = open_database(db_path).await?;
    let store = LibSqlStore::new(db.connection());
    let mut context = store.load().await?;

    let outcome = Synchronizer::new(&connection, config)
        .run(&mut context, &store, cancel)
        .await;
    fs::write(remote_path, connection.to_json().await?)?;

    match outcome {
        Ok(report) => Ok(report),
        Err(error) if error.is_cancelled() => Err(CliError::Cancelled),
        Err(error) => Err(error.into()),
    }
}

pub async fn run_sync(
    remote_path: &Path,
    as_json: bool,
    db_path: &Path,
    config: SynchronizationConfig,
    cancel: &CancellationToken,
) -> Result<(), CliError> {
    let report = execute_sync(remote_path, db_path, config, cancel).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }

    match report.failure_count() {
        0 => Ok(()),
        failures => Err(CliError::SyncFailures(failures)),
    }
}
