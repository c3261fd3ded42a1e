//! In-memory [`SyncStateStore`] implementation for tests.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. A batch upsert takes the
//! write lock once, so it is atomic with respect to other callers.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::error::SyncError;
use crate::models::{
    storage_key, FileRecord, RepositoryMetadata, RepositoryRecord, StatusUpdate, SyncMetrics,
    SyncStatus,
};

use super::{check_transition, SyncStateStore};

/// In-memory store keyed by repository id.
pub struct InMemoryStore {
    repos: RwLock<HashMap<String, RepositoryRecord>>,
    files: RwLock<HashMap<String, HashMap<String, FileRecord>>>,
    metrics: RwLock<Vec<SyncMetrics>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            repos: RwLock::new(HashMap::new()),
            files: RwLock::new(HashMap::new()),
            metrics: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, SyncError> {
    lock.read()
        .map_err(|_| SyncError::Store("in-memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, SyncError> {
    lock.write()
        .map_err(|_| SyncError::Store("in-memory store lock poisoned".to_string()))
}

#[async_trait]
impl SyncStateStore for InMemoryStore {
    async fn upsert_metadata(&self, repo_id: &str, metadata: &RepositoryMetadata) -> Result<()> {
        let mut repos = write(&self.repos)?;
        let record = repos
            .entry(repo_id.to_string())
            .or_insert_with(|| RepositoryRecord::new(repo_id));
        record.metadata = metadata.clone();
        record.sync_status = SyncStatus::Idle;
        record.last_error = None;
        record.progress = None;
        if record.first_indexed_at.is_none() {
            record.first_indexed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_repository(&self, repo_id: &str) -> Result<Option<RepositoryRecord>> {
        Ok(read(&self.repos)?.get(repo_id).cloned())
    }

    async fn list_files(&self, repo_id: &str) -> Result<Vec<FileRecord>> {
        let files = read(&self.files)?;
        let mut out: Vec<FileRecord> = files
            .get(repo_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    async fn get_file(&self, repo_id: &str, path: &str) -> Result<Option<FileRecord>> {
        let files = read(&self.files)?;
        Ok(files
            .get(repo_id)
            .and_then(|m| m.get(&storage_key(path)))
            .cloned())
    }

    async fn upsert_file_batch(&self, repo_id: &str, records: &[FileRecord]) -> Result<()> {
        let mut files = write(&self.files)?;
        let repo_files = files.entry(repo_id.to_string()).or_default();
        for record in records {
            let mut incoming = record.clone();
            if let Some(existing) = repo_files.get(&record.key) {
                incoming.first_seen_at = existing.first_seen_at;
            }
            repo_files.insert(record.key.clone(), incoming);
        }
        Ok(())
    }

    async fn set_status(&self, repo_id: &str, update: &StatusUpdate) -> Result<()> {
        let mut repos = write(&self.repos)?;
        let record = repos
            .entry(repo_id.to_string())
            .or_insert_with(|| RepositoryRecord::new(repo_id));
        check_transition(record.sync_status, update.status)?;

        record.sync_status = update.status;
        record.last_error = match update.status {
            SyncStatus::Error => update.error.clone(),
            _ => None,
        };
        if update.progress.is_some() || update.status != SyncStatus::InProgress {
            record.progress = update.progress;
        }
        if update.status == SyncStatus::Completed {
            record.last_synced_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn record_sync(&self, metrics: &SyncMetrics) -> Result<()> {
        {
            let mut rows = write(&self.metrics)?;
            if rows.iter().any(|m| m.id == metrics.id) {
                return Err(SyncError::Store(format!(
                    "metrics row {} already recorded",
                    metrics.id
                ))
                .into());
            }
            rows.push(metrics.clone());
        }
        let mut repos = write(&self.repos)?;
        let record = repos
            .entry(metrics.repo_id.clone())
            .or_insert_with(|| RepositoryRecord::new(metrics.repo_id.as_str()));
        record.last_sync_stats = Some(metrics.stats);
        record.file_counts = Some(metrics.totals);
        Ok(())
    }

    async fn list_metrics(&self, repo_id: &str, limit: usize) -> Result<Vec<SyncMetrics>> {
        let rows = read(&self.metrics)?;
        let mut out: Vec<SyncMetrics> = rows
            .iter()
            .filter(|m| m.repo_id == repo_id)
            .cloned()
            .collect();
        // stable sort keeps insertion order within the same second
        out.reverse();
        out.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        out.truncate(limit);
        Ok(out)
    }

    async fn purge_files(&self, repo_id: &str) -> Result<u64> {
        let mut files = write(&self.files)?;
        Ok(files.remove(repo_id).map(|m| m.len() as u64).unwrap_or(0))
    }
}
