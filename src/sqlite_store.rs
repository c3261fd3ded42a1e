//! SQLite-backed [`SyncStateStore`] implementation.
//!
//! Timestamps are stored as Unix seconds. Structured fields (structure,
//! search fields, enrichment, stats) are stored as JSON text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use repo_sync_core::models::{
    storage_key, Enrichment, EnrichmentMetadata, FileCounts, FileRecord, FileStatus,
    RepositoryMetadata, RepositoryRecord, StatusUpdate, SyncMetrics, SyncProgress, SyncStats,
    SyncStatus,
};
use repo_sync_core::store::{check_transition, SyncStateStore};

/// SQLite implementation of the [`SyncStateStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).with_context(|| format!("Invalid timestamp in database: {}", ts))
}

fn from_opt_ts(ts: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ts.map(from_ts).transpose()
}

fn from_json_opt<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Result<Option<T>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .context("Invalid JSON column in database")
}

fn row_to_file(row: &SqliteRow) -> Result<FileRecord> {
    let status: String = row.get("status");
    let structure: String = row.get("structure_json");
    let search: String = row.get("search_json");
    let enrichment: Option<Enrichment> = from_json_opt(row.get("enrichment_json"))?;
    let generated_at: Option<i64> = row.get("enrichment_generated_at");
    let model: Option<String> = row.get("enrichment_model");
    let enrichment_metadata = match (generated_at, model) {
        (Some(ts), Some(model_version)) => Some(EnrichmentMetadata {
            generated_at: from_ts(ts)?,
            model_version,
        }),
        _ => None,
    };
    let size: i64 = row.get("size");

    Ok(FileRecord {
        key: row.get("file_key"),
        path: row.get("path"),
        name: row.get("name"),
        language: row.get("language"),
        size: size.max(0) as u64,
        fingerprint: row.get("fingerprint"),
        last_modified: from_opt_ts(row.get("last_modified"))?,
        last_change_summary: row.get("last_change_summary"),
        structure: serde_json::from_str(&structure).context("Invalid structure_json")?,
        search: serde_json::from_str(&search).context("Invalid search_json")?,
        enrichment,
        enrichment_metadata,
        status: status.parse::<FileStatus>()?,
        first_seen_at: from_ts(row.get("first_seen_at"))?,
        updated_at: from_ts(row.get("updated_at"))?,
        deleted_at: from_opt_ts(row.get("deleted_at"))?,
    })
}

fn row_to_repository(row: &SqliteRow) -> Result<RepositoryRecord> {
    let metadata: String = row.get("metadata_json");
    let status: String = row.get("sync_status");
    let processed: Option<i64> = row.get("progress_processed");
    let total: Option<i64> = row.get("progress_total");
    let progress = match (processed, total) {
        (Some(p), Some(t)) => Some(SyncProgress {
            processed: p.max(0) as u64,
            total: t.max(0) as u64,
        }),
        _ => None,
    };

    Ok(RepositoryRecord {
        id: row.get("id"),
        metadata: serde_json::from_str::<RepositoryMetadata>(&metadata)
            .context("Invalid metadata_json")?,
        sync_status: status.parse::<SyncStatus>()?,
        last_synced_at: from_opt_ts(row.get("last_synced_at"))?,
        first_indexed_at: from_opt_ts(row.get("first_indexed_at"))?,
        last_sync_stats: from_json_opt::<SyncStats>(row.get("last_sync_stats_json"))?,
        file_counts: from_json_opt::<FileCounts>(row.get("file_counts_json"))?,
        progress,
        last_error: row.get("last_error"),
    })
}

fn row_to_metrics(row: &SqliteRow) -> Result<SyncMetrics> {
    let stats: String = row.get("stats_json");
    let active: i64 = row.get("active_files");
    let deleted: i64 = row.get("deleted_files");
    let total: i64 = row.get("total_files");
    Ok(SyncMetrics {
        id: row.get("id"),
        repo_id: row.get("repo_id"),
        recorded_at: from_ts(row.get("recorded_at"))?,
        stats: serde_json::from_str(&stats).context("Invalid stats_json")?,
        totals: FileCounts {
            active: active as u64,
            deleted: deleted as u64,
            total: total as u64,
        },
    })
}

#[async_trait]
impl SyncStateStore for SqliteStore {
    async fn upsert_metadata(&self, repo_id: &str, metadata: &RepositoryMetadata) -> Result<()> {
        let now = to_ts(Utc::now());
        let metadata_json = serde_json::to_string(metadata)?;

        sqlx::query(
            r#"
            INSERT INTO repositories (id, full_name, metadata_json, sync_status,
                                      first_indexed_at, updated_at)
            VALUES (?, ?, ?, 'idle', ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                full_name = excluded.full_name,
                metadata_json = excluded.metadata_json,
                sync_status = 'idle',
                first_indexed_at = COALESCE(repositories.first_indexed_at, excluded.first_indexed_at),
                progress_processed = NULL,
                progress_total = NULL,
                last_error = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(repo_id)
        .bind(&metadata.full_name)
        .bind(&metadata_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_repository(&self, repo_id: &str) -> Result<Option<RepositoryRecord>> {
        let row = sqlx::query("SELECT * FROM repositories WHERE id = ?")
            .bind(repo_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_repository).transpose()
    }

    async fn list_files(&self, repo_id: &str) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query("SELECT * FROM files WHERE repo_id = ? ORDER BY path")
            .bind(repo_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_file).collect()
    }

    async fn get_file(&self, repo_id: &str, path: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM files WHERE repo_id = ? AND file_key = ?")
            .bind(repo_id)
            .bind(storage_key(path))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_file).transpose()
    }

    async fn upsert_file_batch(&self, repo_id: &str, records: &[FileRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let structure_json = serde_json::to_string(&record.structure)?;
            let search_json = serde_json::to_string(&record.search)?;
            let enrichment_json = record
                .enrichment
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let (generated_at, model) = match &record.enrichment_metadata {
                Some(m) => (Some(to_ts(m.generated_at)), Some(m.model_version.as_str())),
                None => (None, None),
            };

            sqlx::query(
                r#"
                INSERT INTO files (repo_id, file_key, path, name, language, size, fingerprint,
                                   last_modified, last_change_summary, structure_json,
                                   search_json, enrichment_json, enrichment_generated_at,
                                   enrichment_model, status, first_seen_at, updated_at,
                                   deleted_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(repo_id, file_key) DO UPDATE SET
                    path = excluded.path,
                    name = excluded.name,
                    language = excluded.language,
                    size = excluded.size,
                    fingerprint = excluded.fingerprint,
                    last_modified = excluded.last_modified,
                    last_change_summary = excluded.last_change_summary,
                    structure_json = excluded.structure_json,
                    search_json = excluded.search_json,
                    enrichment_json = excluded.enrichment_json,
                    enrichment_generated_at = excluded.enrichment_generated_at,
                    enrichment_model = excluded.enrichment_model,
                    status = excluded.status,
                    updated_at = excluded.updated_at,
                    deleted_at = excluded.deleted_at
                "#,
            )
            .bind(repo_id)
            .bind(&record.key)
            .bind(&record.path)
            .bind(&record.name)
            .bind(&record.language)
            .bind(record.size as i64)
            .bind(&record.fingerprint)
            .bind(record.last_modified.map(to_ts))
            .bind(&record.last_change_summary)
            .bind(&structure_json)
            .bind(&search_json)
            .bind(&enrichment_json)
            .bind(generated_at)
            .bind(model)
            .bind(record.status.as_str())
            .bind(to_ts(record.first_seen_at))
            .bind(to_ts(record.updated_at))
            .bind(record.deleted_at.map(to_ts))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert file record: {}", record.path))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_status(&self, repo_id: &str, update: &StatusUpdate) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = to_ts(Utc::now());

        let current: Option<String> =
            sqlx::query_scalar("SELECT sync_status FROM repositories WHERE id = ?")
                .bind(repo_id)
                .fetch_optional(&mut *tx)
                .await?;
        let from = match current {
            Some(s) => s.parse::<SyncStatus>()?,
            None => {
                sqlx::query(
                    "INSERT INTO repositories (id, full_name, sync_status, updated_at) VALUES (?, ?, 'idle', ?)",
                )
                .bind(repo_id)
                .bind(repo_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                SyncStatus::Idle
            }
        };
        check_transition(from, update.status)?;

        let error = match update.status {
            SyncStatus::Error => update.error.as_deref(),
            _ => None,
        };
        let replace_progress = update.progress.is_some() || update.status != SyncStatus::InProgress;
        let (processed, total) = match update.progress {
            Some(p) => (Some(p.processed as i64), Some(p.total as i64)),
            None => (None, None),
        };
        let synced_at = (update.status == SyncStatus::Completed).then_some(now);

        sqlx::query(
            r#"
            UPDATE repositories SET
                sync_status = ?,
                last_error = ?,
                progress_processed = CASE WHEN ? THEN ? ELSE progress_processed END,
                progress_total = CASE WHEN ? THEN ? ELSE progress_total END,
                last_synced_at = COALESCE(?, last_synced_at),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(error)
        .bind(replace_progress)
        .bind(processed)
        .bind(replace_progress)
        .bind(total)
        .bind(synced_at)
        .bind(now)
        .bind(repo_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_sync(&self, metrics: &SyncMetrics) -> Result<()> {
        let stats_json = serde_json::to_string(&metrics.stats)?;
        let counts_json = serde_json::to_string(&metrics.totals)?;
        let mut tx = self.pool.begin().await?;

        // Plain INSERT: a duplicate id violates the primary key.
        sqlx::query(
            r#"
            INSERT INTO sync_metrics (id, repo_id, recorded_at, stats_json,
                                      active_files, deleted_files, total_files)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metrics.id)
        .bind(&metrics.repo_id)
        .bind(to_ts(metrics.recorded_at))
        .bind(&stats_json)
        .bind(metrics.totals.active as i64)
        .bind(metrics.totals.deleted as i64)
        .bind(metrics.totals.total as i64)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to record sync metrics {}", metrics.id))?;

        sqlx::query(
            r#"
            UPDATE repositories SET
                last_sync_stats_json = ?,
                file_counts_json = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&stats_json)
        .bind(&counts_json)
        .bind(to_ts(Utc::now()))
        .bind(&metrics.repo_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_metrics(&self, repo_id: &str, limit: usize) -> Result<Vec<SyncMetrics>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_metrics WHERE repo_id = ? ORDER BY recorded_at DESC, rowid DESC LIMIT ?",
        )
        .bind(repo_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_metrics).collect()
    }

    async fn purge_files(&self, repo_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM files WHERE repo_id = ?")
            .bind(repo_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
