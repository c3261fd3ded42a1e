//! Sync state store abstraction.
//!
//! The [`SyncStateStore`] trait persists file records, per-run metrics and
//! the repository-level [`SyncStatus`](crate::models::SyncStatus) state
//! machine. The sync engine only talks to this trait, so the SQLite store
//! used by the CLI and the [`memory::InMemoryStore`] used in tests are
//! interchangeable.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::models::{
    FileRecord, RepositoryMetadata, RepositoryRecord, StatusUpdate, SyncMetrics, SyncStatus,
};

/// Largest number of records committed in one atomic batch.
pub const MAX_WRITE_BATCH: usize = 500;

/// Abstract storage backend for sync state.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_metadata`](SyncStateStore::upsert_metadata) | Create/refresh the repository record, reset status to `idle` |
/// | [`get_repository`](SyncStateStore::get_repository) | Read the repository record |
/// | [`list_files`](SyncStateStore::list_files) | All file records of a repository, any status |
/// | [`get_file`](SyncStateStore::get_file) | One file record by path |
/// | [`upsert_file_batch`](SyncStateStore::upsert_file_batch) | Atomically upsert up to [`MAX_WRITE_BATCH`] records |
/// | [`set_status`](SyncStateStore::set_status) | Validated status transition |
/// | [`record_sync`](SyncStateStore::record_sync) | Append a metrics row and refresh last-sync stats |
/// | [`list_metrics`](SyncStateStore::list_metrics) | Most recent metrics rows first |
/// | [`purge_files`](SyncStateStore::purge_files) | Administrative removal of all file records |
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Create or refresh the repository record.
    ///
    /// Replaces the descriptive metadata, sets the status to `idle`, clears
    /// the last error and progress, and sets `first_indexed_at` only if it
    /// was never set.
    async fn upsert_metadata(&self, repo_id: &str, metadata: &RepositoryMetadata) -> Result<()>;

    async fn get_repository(&self, repo_id: &str) -> Result<Option<RepositoryRecord>>;

    async fn list_files(&self, repo_id: &str) -> Result<Vec<FileRecord>>;

    async fn get_file(&self, repo_id: &str, path: &str) -> Result<Option<FileRecord>>;

    /// Upsert one batch in a single atomic commit.
    ///
    /// Records are keyed by [`FileRecord::key`]. An existing record's
    /// `first_seen_at` wins over the incoming one; every other field is
    /// overwritten, so repeating a batch leaves identical state.
    async fn upsert_file_batch(&self, repo_id: &str, records: &[FileRecord]) -> Result<()>;

    /// Move the repository to `update.status`.
    ///
    /// Rejects transitions not allowed by
    /// [`SyncStatus::can_transition_to`] with
    /// [`SyncError::InvalidTransition`]. A missing repository record is
    /// treated as `idle`. The error is stored only for `error`, the
    /// progress payload only when given, and `completed` stamps
    /// `last_synced_at`.
    async fn set_status(&self, repo_id: &str, update: &StatusUpdate) -> Result<()>;

    /// Append a write-once metrics row and copy its stats and totals onto
    /// the repository record.
    async fn record_sync(&self, metrics: &SyncMetrics) -> Result<()>;

    async fn list_metrics(&self, repo_id: &str, limit: usize) -> Result<Vec<SyncMetrics>>;

    /// Remove every file record of a repository. Returns how many were
    /// removed. Never called by a sync run.
    async fn purge_files(&self, repo_id: &str) -> Result<u64>;
}

/// Result of [`bulk_upsert_files`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteSummary {
    pub written: usize,
    pub chunks: usize,
}

/// Reject a status change the state machine does not allow.
pub fn check_transition(from: SyncStatus, to: SyncStatus) -> Result<(), SyncError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(SyncError::InvalidTransition { from, to })
    }
}

/// Write `records` in chunks of at most `batch_size` (clamped to
/// `1..=MAX_WRITE_BATCH`).
///
/// Each chunk is committed on its own, so a failure leaves earlier chunks
/// persisted and the rest unwritten; re-running the same call converges
/// because the upsert is idempotent. Cancellation is checked before every
/// chunk. `on_chunk(written, total)` runs after each commit.
pub async fn bulk_upsert_files<S, F>(
    store: &S,
    repo_id: &str,
    records: &[FileRecord],
    batch_size: usize,
    cancel: &CancellationToken,
    mut on_chunk: F,
) -> Result<BulkWriteSummary>
where
    S: SyncStateStore + ?Sized,
    F: FnMut(usize, usize),
{
    let size = batch_size.clamp(1, MAX_WRITE_BATCH);
    let mut summary = BulkWriteSummary::default();

    for chunk in records.chunks(size) {
        if cancel.is_cancelled() {
            return Err(SyncError::Interrupted(format!(
                "cancelled after writing {} of {} records",
                summary.written,
                records.len()
            ))
            .into());
        }
        store.upsert_file_batch(repo_id, chunk).await.map_err(|e| {
            e.context(format!(
                "Failed to write batch {} ({} records) for {}",
                summary.chunks + 1,
                chunk.len(),
                repo_id
            ))
        })?;
        summary.written += chunk.len();
        summary.chunks += 1;
        tracing::debug!(
            repo = repo_id,
            written = summary.written,
            total = records.len(),
            "committed file batch"
        );
        on_chunk(summary.written, records.len());
    }

    Ok(summary)
}
