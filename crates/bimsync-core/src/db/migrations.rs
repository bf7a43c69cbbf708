//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Run statements in one transaction, rolling back on the first failure
async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: projects, objectives and their children
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                login TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY,
                external_id TEXT,
                title TEXT NOT NULL,
                synchronization_mate_id INTEGER UNIQUE REFERENCES projects(id) ON DELETE SET NULL,
                is_synchronized INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS user_projects (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, project_id)
            )",
            "CREATE TABLE IF NOT EXISTS objectives (
                id INTEGER PRIMARY KEY,
                external_id TEXT,
                project_id INTEGER NOT NULL,
                parent_objective_id INTEGER REFERENCES objectives(id) ON DELETE SET NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status INTEGER NOT NULL DEFAULT 0,
                creation_date INTEGER NOT NULL,
                due_date INTEGER NOT NULL,
                objective_type TEXT NOT NULL DEFAULT '',
                author_external_id TEXT,
                synchronization_mate_id INTEGER UNIQUE REFERENCES objectives(id) ON DELETE SET NULL,
                is_synchronized INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_objectives_project ON objectives(project_id)",
            "CREATE INDEX IF NOT EXISTS idx_objectives_parent ON objectives(parent_objective_id)",
            "CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY,
                external_id TEXT,
                relative_path TEXT NOT NULL,
                name TEXT NOT NULL,
                item_type INTEGER NOT NULL DEFAULT 0,
                project_id INTEGER REFERENCES projects(id) ON DELETE SET NULL,
                synchronization_mate_id INTEGER UNIQUE REFERENCES items(id) ON DELETE SET NULL,
                is_synchronized INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_items_project ON items(project_id)",
            "CREATE INDEX IF NOT EXISTS idx_items_path ON items(relative_path)",
            "CREATE TABLE IF NOT EXISTS objective_items (
                objective_id INTEGER NOT NULL REFERENCES objectives(id) ON DELETE CASCADE,
                item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                PRIMARY KEY (objective_id, item_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_objective_items_item ON objective_items(item_id)",
            "CREATE TABLE IF NOT EXISTS bim_elements (
                id INTEGER PRIMARY KEY,
                global_id TEXT NOT NULL,
                parent_name TEXT NOT NULL,
                element_name TEXT NOT NULL DEFAULT '',
                element_type TEXT NOT NULL DEFAULT ''
            )",
            "CREATE INDEX IF NOT EXISTS idx_bim_elements_global ON bim_elements(global_id, parent_name COLLATE NOCASE)",
            "CREATE TABLE IF NOT EXISTS bim_element_objectives (
                objective_id INTEGER NOT NULL REFERENCES objectives(id) ON DELETE CASCADE,
                bim_element_id INTEGER NOT NULL REFERENCES bim_elements(id) ON DELETE CASCADE,
                PRIMARY KEY (objective_id, bim_element_id)
            )",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: dynamic fields
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS dynamic_fields (
                id INTEGER PRIMARY KEY,
                external_id TEXT,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                value TEXT NOT NULL DEFAULT '',
                objective_id INTEGER REFERENCES objectives(id) ON DELETE CASCADE,
                parent_field_id INTEGER REFERENCES dynamic_fields(id) ON DELETE CASCADE,
                connection_info_id INTEGER,
                synchronization_mate_id INTEGER UNIQUE REFERENCES dynamic_fields(id) ON DELETE SET NULL,
                is_synchronized INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_dynamic_fields_objective ON dynamic_fields(objective_id)",
            "CREATE INDEX IF NOT EXISTS idx_dynamic_fields_parent ON dynamic_fields(parent_field_id)",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = ?
                )",
                [name],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_create_sync_tables() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in [
            "projects",
            "objectives",
            "items",
            "objective_items",
            "bim_elements",
            "bim_element_objectives",
            "dynamic_fields",
            "user_projects",
        ] {
            assert!(table_exists(&conn, table).await, "missing table {table}");
        }
    }
}
