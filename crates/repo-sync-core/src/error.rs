//! Error taxonomy for sync runs.
//!
//! Per-file enrichment failures never surface here; they are downgraded to
//! failure markers on the file record. Everything in [`SyncError`] is
//! run-level: it aborts the run and is written to the repository's status.

use thiserror::Error;

use crate::models::SyncStatus;

/// Run-level error kinds.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing token, missing API key, invalid config value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Listing, metadata or content fetch failed at the source.
    #[error("Source error: {0}")]
    Source(String),

    /// The sync state store rejected a read or write.
    #[error("Store error: {0}")]
    Store(String),

    /// The summarizer could not be constructed or returned garbage.
    #[error("Summarizer error: {0}")]
    Summarize(String),

    /// The run was cancelled from outside (signal or caller).
    #[error("Sync interrupted: {0}")]
    Interrupted(String),

    #[error("Invalid sync status transition: {from} -> {to}")]
    InvalidTransition { from: SyncStatus, to: SyncStatus },
}

impl SyncError {
    /// True for [`SyncError::Interrupted`], including when wrapped in an
    /// `anyhow::Error` chain.
    pub fn is_interrupted(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<SyncError>(),
                Some(SyncError::Interrupted(_))
            )
        })
    }
}
