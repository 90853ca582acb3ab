//! SQLite catalog database
//!
//! Connection setup follows the shared-database rules used across WKMP:
//! WAL journaling so many import workers can read while one writes, a busy
//! timeout instead of immediate lock errors, and foreign keys enforced on
//! every pooled connection.

pub mod catalog;

pub use catalog::SqliteCatalog;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to each connection
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Open (or create) the catalog database and ensure the schema exists
pub async fn init_catalog_pool(db_path: &Path, max_connections: u32) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new catalog database: {}", db_path.display());
    } else {
        info!("Opened existing catalog database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create catalog tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS objects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id INTEGER NOT NULL,
            ref_id INTEGER REFERENCES objects(id) ON DELETE CASCADE,
            object_type INTEGER NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            upnp_class TEXT NOT NULL DEFAULT '',
            location TEXT,
            path TEXT UNIQUE,
            mtime INTEGER NOT NULL DEFAULT 0,
            size_on_disk INTEGER NOT NULL DEFAULT 0,
            flags INTEGER NOT NULL DEFAULT 0,
            restricted INTEGER NOT NULL DEFAULT 0,
            is_virtual INTEGER NOT NULL DEFAULT 0,
            mime_type TEXT,
            service_id TEXT,
            track_number INTEGER NOT NULL DEFAULT 0,
            part_number INTEGER NOT NULL DEFAULT 0,
            update_id INTEGER NOT NULL DEFAULT 0,
            searchable INTEGER NOT NULL DEFAULT 1,
            provenance_id INTEGER,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_objects_parent ON objects(parent_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_objects_ref ON objects(ref_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metadata (
            object_id INTEGER NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (object_id, field)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS aux_data (
            object_id INTEGER NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (object_id, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            object_id INTEGER NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
            res_index INTEGER NOT NULL,
            handler_type INTEGER NOT NULL,
            attributes TEXT NOT NULL DEFAULT '{}',
            parameters TEXT NOT NULL DEFAULT '{}',
            options TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (object_id, res_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Well-known root container
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO objects
            (id, parent_id, object_type, title, upnp_class, path, created_at)
        VALUES (0, -1, 1, 'Root', 'object.container', '/', 0)
        "#,
    )
    .execute(pool)
    .await?;

    info!("Catalog schema initialized (objects, metadata, aux_data, resources)");

    Ok(())
}
