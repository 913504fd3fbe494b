//! Database initialization
//!
//! Opens (creating if needed) the SQLite file holding the persisted replica
//! and creates the tables. Safe to call on every startup.

use crate::error::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open the database at `db_path` and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all replica tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_records_table(pool).await?;
    create_record_comments_table(pool).await?;
    create_record_tags_table(pool).await?;
    create_tag_palette_table(pool).await?;
    create_replica_state_table(pool).await?;
    Ok(())
}

async fn create_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY,
            summary TEXT NOT NULL DEFAULT '',
            assignee TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT '',
            severity TEXT NOT NULL DEFAULT '',
            target_milestone TEXT NOT NULL DEFAULT '',
            component TEXT NOT NULL DEFAULT '',
            operating_system TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL,
            local_priority INTEGER NOT NULL,
            is_new INTEGER NOT NULL DEFAULT 0,
            requires_refresh INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_priority ON records(local_priority)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_record_comments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS record_comments (
            record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            author TEXT NOT NULL,
            text TEXT NOT NULL,
            time TIMESTAMP NOT NULL,
            is_private INTEGER NOT NULL DEFAULT 0,
            attachment TEXT,
            PRIMARY KEY (record_id, seq)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_record_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS record_tags (
            record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (record_id, tag)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tag_palette_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tag_palette (
            name TEXT PRIMARY KEY,
            seq INTEGER NOT NULL,
            r INTEGER NOT NULL CHECK (r BETWEEN 0 AND 255),
            g INTEGER NOT NULL CHECK (g BETWEEN 0 AND 255),
            b INTEGER NOT NULL CHECK (b BETWEEN 0 AND 255)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_replica_state_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS replica_state (
            key TEXT PRIMARY KEY,
            value TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
