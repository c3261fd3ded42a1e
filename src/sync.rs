//! Sync run orchestration.
//!
//! One run for one repository:
//!
//! ```text
//! metadata ─▶ upsert_metadata (idle) ─▶ in_progress
//!   ─▶ store.list_files ─▶ source.list_files ─▶ reconcile
//!   ─▶ enrich(work) ─▶ merge(processed + unchanged + deleted)
//!   ─▶ bulk upsert (chunked) ─▶ record_sync ─▶ completed
//! ```
//!
//! Any failure after the run starts moves the repository to `error` with a
//! message before the error is returned. Per-file enrichment failures do not
//! fail the run; they are counted in `SyncStats::failed`.

use anyhow::{Context, Result};
use chrono::{SubsecRound, Utc};
use std::future::Future;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use repo_sync_core::models::{
    repository_id, FileCounts, StatusUpdate, SyncMetrics, SyncStats,
};
use repo_sync_core::reconcile::{file_counts, merge, reconcile, MissingFingerprintPolicy};
use repo_sync_core::store::{bulk_upsert_files, SyncStateStore};
use repo_sync_core::SyncError;

use crate::config::{Config, SyncConfig};
use crate::connector_fs::LocalSource;
use crate::connector_github::GitHubSource;
use crate::db;
use crate::enrich::{enrich, EnrichOptions, EnrichProgress};
use crate::progress::{ProgressMode, SyncProgressEvent, SyncProgressReporter};
use crate::sqlite_store::SqliteStore;
use crate::summarizer::{create_summarizer, DisabledSummarizer};
use crate::traits::{FileSource, ListOptions, SummaryGenerator};

/// What to sync, as given on the command line.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// `owner/repo`.
    pub repo: String,
    pub account: Option<String>,
    /// Sync a local checkout instead of GitHub.
    pub local: Option<PathBuf>,
    pub max_files: Option<usize>,
    pub skip_types: Vec<String>,
    pub dry_run: bool,
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub repo: String,
    pub repo_id: String,
    pub listed: u64,
    pub stats: SyncStats,
    pub enriched: u64,
    pub totals: FileCounts,
    pub dry_run: bool,
    pub metrics_id: Option<String>,
}

impl SyncOutcome {
    /// One-line human summary.
    pub fn status_line(&self) -> String {
        let s = &self.stats;
        format!(
            "{} {}: {} new, {} modified, {} unchanged, {} unknown, {} restored, {} deleted, {} failed",
            if self.dry_run { "dry-run" } else { "completed" },
            self.repo,
            s.new,
            s.modified,
            s.unchanged,
            s.unknown,
            s.restored,
            s.deleted,
            s.failed
        )
    }
}

/// Everything a run needs besides the request.
pub struct SyncContext<'a> {
    pub store: &'a dyn SyncStateStore,
    pub source: &'a dyn FileSource,
    pub summarizer: &'a dyn SummaryGenerator,
    pub settings: &'a SyncConfig,
    pub reporter: &'a dyn SyncProgressReporter,
}

/// CLI entry point: build the store, source and summarizer from `config`,
/// run, and print a summary.
pub async fn run_sync(
    config: &Config,
    request: &SyncRequest,
    progress: ProgressMode,
    cancel: &CancellationToken,
) -> Result<SyncOutcome> {
    // Configuration problems surface before anything is written.
    let source: Box<dyn FileSource> = match &request.local {
        Some(root) => Box::new(LocalSource::new(root, &config.sync.exclude_globs)?),
        None => {
            let token = config.github_token(request.account.as_deref())?;
            Box::new(GitHubSource::new(&config.github, token)?)
        }
    };
    let summarizer: Box<dyn SummaryGenerator> = if request.dry_run {
        Box::new(DisabledSummarizer)
    } else {
        create_summarizer(config)?
    };

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let reporter = progress.reporter();

    let ctx = SyncContext {
        store: &store,
        source: source.as_ref(),
        summarizer: summarizer.as_ref(),
        settings: &config.sync,
        reporter: reporter.as_ref(),
    };
    let result = run_sync_with(&ctx, request, cancel).await;
    store.pool().close().await;
    let outcome = result?;

    print_outcome(&outcome);
    Ok(outcome)
}

fn print_outcome(o: &SyncOutcome) {
    if o.dry_run {
        println!("sync {} (dry-run)", o.repo);
    } else {
        println!("sync {}", o.repo);
    }
    println!("  listed: {} files", o.listed);
    println!(
        "  new: {}  modified: {}  unknown: {}  restored: {}",
        o.stats.new, o.stats.modified, o.stats.unknown, o.stats.restored
    );
    println!(
        "  unchanged: {}  deleted: {}",
        o.stats.unchanged, o.stats.deleted
    );
    if !o.dry_run {
        println!(
            "  enriched: {}  skipped: {}  failed: {}",
            o.enriched, o.stats.skipped, o.stats.failed
        );
    }
    println!(
        "  files: {} active, {} deleted, {} total",
        o.totals.active, o.totals.deleted, o.totals.total
    );
    println!("{}", o.status_line());
    println!("ok");
}

/// Run one sync against explicit collaborators.
///
/// On failure the repository is moved to `error` (best effort) unless the
/// request is a dry run, which never writes.
pub async fn run_sync_with(
    ctx: &SyncContext<'_>,
    request: &SyncRequest,
    cancel: &CancellationToken,
) -> Result<SyncOutcome> {
    let repo_id = repository_id(&request.repo);

    match execute(ctx, request, &repo_id, cancel).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            let message = failure_message(&err);
            tracing::error!(repo = %request.repo, error = %message, "sync failed");
            if !request.dry_run {
                mark_failed(ctx.store, &repo_id, &message).await;
            }
            Err(err)
        }
    }
}

/// Text stored as `last_error`. Interruptions always read "Sync interrupted: ...".
fn failure_message(err: &anyhow::Error) -> String {
    err.chain()
        .find_map(|cause| match cause.downcast_ref::<SyncError>() {
            Some(e @ SyncError::Interrupted(_)) => Some(e.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| format!("{:#}", err))
}

async fn mark_failed(store: &dyn SyncStateStore, repo_id: &str, message: &str) {
    let update = StatusUpdate::failed(message);
    let first = store.set_status(repo_id, &update).await;
    let Err(e) = first else { return };

    // A run that failed before reaching in_progress may find the previous
    // run's terminal state; restart the cycle so the error is still recorded.
    let invalid = matches!(
        e.downcast_ref::<SyncError>(),
        Some(SyncError::InvalidTransition { .. })
    );
    let retried = if invalid {
        match store.set_status(repo_id, &StatusUpdate::idle()).await {
            Ok(()) => store.set_status(repo_id, &update).await,
            Err(e) => Err(e),
        }
    } else {
        Err(e)
    };
    if let Err(e) = retried {
        tracing::error!(repo_id, error = %format!("{:#}", e), "could not record sync failure");
    }
}

/// Await `fut` unless `cancel` fires first; an in-flight request is dropped.
async fn until_cancelled<T, F>(cancel: &CancellationToken, stage: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            Err(SyncError::Interrupted(format!("cancelled while {}", stage)).into())
        }
        result = fut => result,
    }
}

fn check_cancel(cancel: &CancellationToken, stage: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(SyncError::Interrupted(format!("cancelled before {}", stage)).into());
    }
    Ok(())
}

async fn execute(
    ctx: &SyncContext<'_>,
    request: &SyncRequest,
    repo_id: &str,
    cancel: &CancellationToken,
) -> Result<SyncOutcome> {
    let repo = request.repo.as_str();
    let store = ctx.store;
    let write = !request.dry_run;

    ctx.reporter.report(SyncProgressEvent::Listing {
        repo: repo.to_string(),
    });

    check_cancel(cancel, "fetching metadata")?;
    let metadata = until_cancelled(
        cancel,
        "fetching metadata",
        ctx.source.get_repository_metadata(repo),
    )
    .await
    .with_context(|| format!("Failed to fetch repository metadata for {}", repo))?;

    if write {
        store.upsert_metadata(repo_id, &metadata).await?;
        store
            .set_status(repo_id, &StatusUpdate::in_progress(0, 0))
            .await?;
    }
    tracing::info!(repo, repo_id, source = ctx.source.name(), "sync started");

    let stored = until_cancelled(cancel, "reading stored files", store.list_files(repo_id))
        .await
        .with_context(|| format!("Failed to read stored files for {}", repo_id))?;

    let list_opts = ListOptions {
        skip_extensions: request.skip_types.clone(),
        max_files: request.max_files,
        skip_dirs: ctx.settings.skip_dirs.clone(),
    };
    let current = until_cancelled(
        cancel,
        "listing files",
        ctx.source.list_files(repo, &list_opts, cancel),
    )
    .await
    .with_context(|| format!("Failed to list files for {}", repo))?;
    let listed = current.len() as u64;

    let now = Utc::now().trunc_subsecs(0);
    let policy: MissingFingerprintPolicy = ctx.settings.missing_fingerprint;
    let rec = reconcile(current, stored, policy, now);
    let mut stats = rec.stats();

    ctx.reporter.report(SyncProgressEvent::Reconciled {
        repo: repo.to_string(),
        work: rec.work.len() as u64,
        unchanged: rec.unchanged.len() as u64,
        deleted: rec.deleted.len() as u64,
    });
    tracing::info!(
        repo,
        listed,
        work = rec.work.len(),
        unchanged = stats.unchanged,
        deleted = stats.deleted,
        restored = stats.restored,
        "reconciled"
    );

    if !write {
        let deleted = stats.deleted;
        return Ok(SyncOutcome {
            repo: repo.to_string(),
            repo_id: repo_id.to_string(),
            listed,
            stats,
            enriched: 0,
            totals: FileCounts {
                active: listed,
                deleted,
                total: listed + deleted,
            },
            dry_run: true,
            metrics_id: None,
        });
    }

    let work_total = rec.work.len() as u64;
    store
        .set_status(repo_id, &StatusUpdate::in_progress(0, work_total))
        .await?;

    let on_progress = |p: EnrichProgress| {
        ctx.reporter.report(SyncProgressEvent::Enriching {
            repo: repo.to_string(),
            processed: p.processed,
            total: p.total,
        });
        async move {
            let update = StatusUpdate::in_progress(p.processed, p.total);
            if let Err(e) = store.set_status(repo_id, &update).await {
                tracing::warn!(repo_id, error = %e, "failed to record progress");
            }
        }
    };

    let opts = EnrichOptions::from(ctx.settings);
    let report = enrich(
        repo,
        rec.work,
        ctx.source,
        ctx.summarizer,
        &opts,
        cancel,
        on_progress,
    )
    .await?;
    stats.failed = report.failed;
    stats.skipped = report.skipped;

    let records = merge(report.items, rec.unchanged, rec.deleted);
    let total_records = records.len() as u64;
    bulk_upsert_files(
        store,
        repo_id,
        &records,
        ctx.settings.write_batch_size,
        cancel,
        |written, _| {
            ctx.reporter.report(SyncProgressEvent::Committing {
                repo: repo.to_string(),
                written: written as u64,
                total: total_records,
            })
        },
    )
    .await?;

    let totals = file_counts(&records);
    let metrics = SyncMetrics {
        id: Uuid::new_v4().to_string(),
        repo_id: repo_id.to_string(),
        recorded_at: Utc::now().trunc_subsecs(0),
        stats,
        totals,
    };
    store.record_sync(&metrics).await?;
    store
        .set_status(repo_id, &StatusUpdate::completed())
        .await?;

    tracing::info!(
        repo,
        new = stats.new,
        modified = stats.modified,
        failed = stats.failed,
        total = totals.total,
        "sync completed"
    );

    Ok(SyncOutcome {
        repo: repo.to_string(),
        repo_id: repo_id.to_string(),
        listed,
        stats,
        enriched: report.enriched,
        totals,
        dry_run: false,
        metrics_id: Some(metrics.id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interruption_message_wins_over_context() {
        let err = anyhow::Error::new(SyncError::Interrupted("signal".into()))
            .context("Failed to list files for acme/app");
        assert_eq!(failure_message(&err), "Sync interrupted: signal");

        let other = anyhow::anyhow!("404").context("Failed to list files");
        assert_eq!(failure_message(&other), "Failed to list files: 404");
    }

    #[test]
    fn status_line_summarizes_counts() {
        let outcome = SyncOutcome {
            repo: "acme/app".into(),
            repo_id: "acme_app".into(),
            listed: 2,
            stats: SyncStats {
                new: 1,
                unchanged: 1,
                deleted: 1,
                ..SyncStats::default()
            },
            enriched: 1,
            totals: FileCounts {
                active: 2,
                deleted: 1,
                total: 3,
            },
            dry_run: false,
            metrics_id: None,
        };
        assert_eq!(
            outcome.status_line(),
            "completed acme/app: 1 new, 0 modified, 1 unchanged, 0 unknown, 0 restored, 1 deleted, 0 failed"
        );
    }
}
