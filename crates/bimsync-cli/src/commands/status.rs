use std::path::Path;

use bimsync_core::db::LibSqlStore;

use crate::commands::common::{open_database, StoreCounts};
use crate::error::CliError;

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let context = LibSqlStore::new(db.connection()).load().await?;
    let counts = StoreCounts::of(&context);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        println!("Database: {}", db_path.display());
        for line in counts.lines() {
            println!("{line}");
        }
    }
    Ok(())
}
