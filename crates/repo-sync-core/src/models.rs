//! Core data models shared by the sync engine and its stores.
//!
//! A repository owns a collection of [`FileRecord`]s keyed by path. Records
//! are never physically removed by a sync: a path missing from the source
//! listing becomes [`FileStatus::Deleted`], and a deleted path that shows up
//! again goes through [`FileStatus::Restored`] back to
//! [`FileStatus::Active`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{CodeAnalysis, SearchFields};

/// Lifecycle status of a file record, re-derived on every sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    New,
    Modified,
    Unchanged,
    Unknown,
    Active,
    Deleted,
    Restored,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::New => "new",
            FileStatus::Modified => "modified",
            FileStatus::Unchanged => "unchanged",
            FileStatus::Unknown => "unknown",
            FileStatus::Active => "active",
            FileStatus::Deleted => "deleted",
            FileStatus::Restored => "restored",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(FileStatus::New),
            "modified" => Ok(FileStatus::Modified),
            "unchanged" => Ok(FileStatus::Unchanged),
            "unknown" => Ok(FileStatus::Unknown),
            "active" => Ok(FileStatus::Active),
            "deleted" => Ok(FileStatus::Deleted),
            "restored" => Ok(FileStatus::Restored),
            other => anyhow::bail!("Unknown file status: '{}'", other),
        }
    }
}

/// Repository-level sync state.
///
/// ```text
/// idle ──▶ in_progress ──▶ completed
///   │          │  ▲
///   │          └──┘ (progress payload updates)
///   │          │
///   └──────────┴──────▶ error
/// ```
///
/// `completed` and `error` end a run; the next run starts again from `idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    InProgress,
    Completed,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Completed => "completed",
            SyncStatus::Error => "error",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SyncStatus) -> bool {
        use SyncStatus::*;
        match (self, next) {
            (_, Idle) => true,
            (Idle, InProgress) | (Idle, Error) => true,
            (InProgress, InProgress) | (InProgress, Completed) | (InProgress, Error) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Error)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SyncStatus::Idle),
            "in_progress" => Ok(SyncStatus::InProgress),
            "completed" => Ok(SyncStatus::Completed),
            "error" => Ok(SyncStatus::Error),
            other => anyhow::bail!("Unknown sync status: '{}'", other),
        }
    }
}

/// Cheap, locally computed code structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeStructure {
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub exports: Vec<String>,
}

impl CodeStructure {
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.functions.is_empty()
            && self.classes.is_empty()
            && self.exports.is_empty()
    }
}

/// A file as reported by a source adapter listing, before reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceFile {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub language: Option<String>,
    /// Opaque content version token (git blob SHA, content hash, ...).
    pub fingerprint: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Last commit message touching this path, when the source knows it.
    pub last_change_summary: Option<String>,
    pub structure: CodeStructure,
}

/// Terminal failure marker attached to a file whose enrichment gave up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentFailure {
    pub error: String,
    pub attempts: u32,
}

/// Enrichment result stored on a file record.
///
/// Serialized untagged so the stored JSON is either the analysis object
/// itself or `{"error": ..., "attempts": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Enrichment {
    Failed(EnrichmentFailure),
    Analysis(Box<CodeAnalysis>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentMetadata {
    pub generated_at: DateTime<Utc>,
    pub model_version: String,
}

/// A persisted file of a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Storage key derived from `path`, see [`storage_key`].
    pub key: String,
    pub path: String,
    pub name: String,
    pub language: Option<String>,
    pub size: u64,
    pub fingerprint: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub last_change_summary: Option<String>,
    pub structure: CodeStructure,
    pub search: SearchFields,
    pub enrichment: Option<Enrichment>,
    pub enrichment_metadata: Option<EnrichmentMetadata>,
    pub status: FileStatus,
    /// Set on first persistence, never overwritten.
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Build a fresh record from a listing entry. Enrichment is empty and
    /// the status is [`FileStatus::New`]; the reconciler adjusts both.
    pub fn from_source(file: SourceFile, now: DateTime<Utc>) -> Self {
        Self {
            key: storage_key(&file.path),
            path: file.path,
            name: file.name,
            language: file.language,
            size: file.size,
            fingerprint: file.fingerprint,
            last_modified: file.last_modified,
            last_change_summary: file.last_change_summary,
            structure: file.structure,
            search: SearchFields::default(),
            enrichment: None,
            enrichment_metadata: None,
            status: FileStatus::New,
            first_seen_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// True when the last enrichment attempt ended in a failure marker.
    pub fn enrichment_failed(&self) -> bool {
        matches!(self.enrichment, Some(Enrichment::Failed(_)))
    }

    pub fn analysis(&self) -> Option<&CodeAnalysis> {
        match &self.enrichment {
            Some(Enrichment::Analysis(a)) => Some(&**a),
            _ => None,
        }
    }
}

/// Derive the storage key for a repository-relative path.
///
/// `%` is escaped first so the mapping stays injective: `a/b.py` and
/// `a_b.py` or `a%2Fb.py` never share a key.
pub fn storage_key(path: &str) -> String {
    path.replace('%', "%25").replace('/', "%2F")
}

/// Normalize a repository name (`Owner/Repo`) into its record id.
pub fn repository_id(full_name: &str) -> String {
    full_name.trim().trim_matches('/').to_lowercase().replace('/', "_")
}

/// Descriptive repository metadata, passed through from the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub default_branch: Option<String>,
    pub language: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub size: u64,
    pub stars: u64,
    pub forks: u64,
}

/// Per-category counts for one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub new: u64,
    pub modified: u64,
    pub unchanged: u64,
    pub unknown: u64,
    pub deleted: u64,
    pub restored: u64,
    /// Work items carrying a failure marker after enrichment.
    pub failed: u64,
    /// Work items passed through without a summarizer call.
    pub skipped: u64,
}

impl SyncStats {
    /// Number of files that went through the enrichment pipeline.
    pub fn changed(&self) -> u64 {
        self.new + self.modified + self.unknown + self.restored
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCounts {
    pub active: u64,
    pub deleted: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub processed: u64,
    pub total: u64,
}

/// Write-once metrics row appended after every completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetrics {
    pub id: String,
    pub repo_id: String,
    pub recorded_at: DateTime<Utc>,
    pub stats: SyncStats,
    pub totals: FileCounts,
}

/// The repository document and its sync state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub id: String,
    pub metadata: RepositoryMetadata,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Set by the first metadata upsert, never overwritten.
    pub first_indexed_at: Option<DateTime<Utc>>,
    pub last_sync_stats: Option<SyncStats>,
    pub file_counts: Option<FileCounts>,
    pub progress: Option<SyncProgress>,
    pub last_error: Option<String>,
}

impl RepositoryRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: RepositoryMetadata::default(),
            sync_status: SyncStatus::Idle,
            last_synced_at: None,
            first_indexed_at: None,
            last_sync_stats: None,
            file_counts: None,
            progress: None,
            last_error: None,
        }
    }
}

/// Payload for a status write.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: SyncStatus,
    pub error: Option<String>,
    pub progress: Option<SyncProgress>,
}

impl StatusUpdate {
    pub fn idle() -> Self {
        Self {
            status: SyncStatus::Idle,
            error: None,
            progress: None,
        }
    }

    pub fn in_progress(processed: u64, total: u64) -> Self {
        Self {
            status: SyncStatus::InProgress,
            error: None,
            progress: Some(SyncProgress { processed, total }),
        }
    }

    pub fn completed() -> Self {
        Self {
            status: SyncStatus::Completed,
            error: None,
            progress: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Error,
            error: Some(message.into()),
            progress: None,
        }
    }
}
