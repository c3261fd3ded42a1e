use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema in the configured database. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Repository documents and their sync state
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            sync_status TEXT NOT NULL DEFAULT 'idle',
            last_synced_at INTEGER,
            first_indexed_at INTEGER,
            last_sync_stats_json TEXT,
            file_counts_json TEXT,
            progress_processed INTEGER,
            progress_total INTEGER,
            last_error TEXT,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per repository path, soft-deleted rows included
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            repo_id TEXT NOT NULL,
            file_key TEXT NOT NULL,
            path TEXT NOT NULL,
            name TEXT NOT NULL,
            language TEXT,
            size INTEGER NOT NULL DEFAULT 0,
            fingerprint TEXT,
            last_modified INTEGER,
            last_change_summary TEXT,
            structure_json TEXT NOT NULL DEFAULT '{}',
            search_json TEXT NOT NULL DEFAULT '{}',
            enrichment_json TEXT,
            enrichment_generated_at INTEGER,
            enrichment_model TEXT,
            status TEXT NOT NULL,
            first_seen_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            PRIMARY KEY (repo_id, file_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only per-run metrics
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_metrics (
            id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            recorded_at INTEGER NOT NULL,
            stats_json TEXT NOT NULL,
            active_files INTEGER NOT NULL,
            deleted_files INTEGER NOT NULL,
            total_files INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_repo_status ON files(repo_id, status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sync_metrics_repo ON sync_metrics(repo_id, recorded_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
