//! Stored file inspection and removal.
//!
//! Backs `reposync files`, `reposync get` and `reposync purge`. All three
//! read or write the SQLite store directly and never contact a source.

use anyhow::{bail, Result};
use serde::Serialize;

use repo_sync_core::models::{repository_id, FileRecord, FileStatus};
use repo_sync_core::store::SyncStateStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// One row of the `files` listing.
#[derive(Debug, Clone, Serialize)]
pub struct FileRow {
    pub path: String,
    pub status: FileStatus,
    pub language: Option<String>,
    pub size: u64,
    /// `yes`, `failed`, or `-` when no enrichment was stored.
    pub enriched: &'static str,
    pub updated_at: String,
}

impl FileRow {
    fn from_record(record: &FileRecord) -> Self {
        let enriched = if record.enrichment_failed() {
            "failed"
        } else if record.analysis().is_some() {
            "yes"
        } else {
            "-"
        };
        Self {
            path: record.path.clone(),
            status: record.status,
            language: record.language.clone(),
            size: record.size,
            enriched,
            updated_at: record.updated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

/// Stored files of a repository, optionally filtered by status.
pub async fn list_file_rows(
    config: &Config,
    repo: &str,
    status: Option<FileStatus>,
) -> Result<Vec<FileRow>> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let records = store.list_files(&repository_id(repo)).await;
    store.pool().close().await;

    Ok(records?
        .iter()
        .filter(|r| status.map_or(true, |s| r.status == s))
        .map(FileRow::from_record)
        .collect())
}

/// CLI entry point for `reposync files`.
pub async fn run_files(config: &Config, repo: &str, status: Option<FileStatus>) -> Result<()> {
    let rows = list_file_rows(config, repo, status).await?;

    if rows.is_empty() {
        println!("No files stored for {}.", repo);
        return Ok(());
    }

    println!(
        "{:<10} {:<8} {:>9} {:<8} {:<20} PATH",
        "STATUS", "LANG", "SIZE", "ENRICHED", "UPDATED"
    );
    println!("{}", "-".repeat(76));
    for row in &rows {
        println!(
            "{:<10} {:<8} {:>9} {:<8} {:<20} {}",
            row.status,
            row.language.as_deref().unwrap_or("-"),
            row.size,
            row.enriched,
            row.updated_at,
            row.path
        );
    }
    println!();
    println!("{} file(s)", rows.len());
    Ok(())
}

/// Fetch one stored file record by its repository-relative path.
pub async fn get_file(config: &Config, repo: &str, path: &str) -> Result<FileRecord> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let record = store.get_file(&repository_id(repo), path).await;
    store.pool().close().await;

    match record? {
        Some(r) => Ok(r),
        None => bail!("file not found: {} in {}", path, repo),
    }
}

/// CLI entry point for `reposync get`: prints the record as JSON.
pub async fn run_get(config: &Config, repo: &str, path: &str) -> Result<()> {
    let record = get_file(config, repo, path).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// CLI entry point for `reposync purge`: hard-deletes every stored file of
/// a repository. The repository record and metrics history are kept.
pub async fn run_purge(config: &Config, repo: &str, yes: bool) -> Result<()> {
    if !yes {
        bail!(
            "purge removes all stored files for {}; re-run with --yes to confirm",
            repo
        );
    }

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let removed = store.purge_files(&repository_id(repo)).await;
    store.pool().close().await;

    println!("Purged {} file record(s) for {}.", removed?, repo);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use repo_sync_core::models::{Enrichment, EnrichmentFailure, SourceFile};

    fn record(path: &str) -> FileRecord {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        FileRecord::from_source(
            SourceFile {
                path: path.to_string(),
                name: path.rsplit('/').next().unwrap_or(path).to_string(),
                size: 42,
                language: Some("rs".to_string()),
                fingerprint: Some("abc".to_string()),
                ..Default::default()
            },
            now,
        )
    }

    #[test]
    fn row_marks_enrichment_state() {
        let plain = FileRow::from_record(&record("src/a.rs"));
        assert_eq!(plain.enriched, "-");
        assert_eq!(plain.updated_at, "2024-03-01T12:00:00Z");

        let mut failed = record("src/b.rs");
        failed.enrichment = Some(Enrichment::Failed(EnrichmentFailure {
            error: "boom".to_string(),
            attempts: 3,
        }));
        assert_eq!(FileRow::from_record(&failed).enriched, "failed");
    }
}
