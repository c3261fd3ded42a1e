//! Bounded enrichment pipeline.
//!
//! Drives the summarizer over the reconciled work set with a fixed number of
//! in-flight items (`futures` `buffer_unordered`). Every input record comes
//! back exactly once, either enriched, passed through untouched, or carrying
//! a failure marker after `max_attempts` tries. Output order is completion
//! order.
//!
//! Per item:
//!
//! 1. Not enrichable (extension, skipped directory, disabled summarizer):
//!    pass through without fetching content.
//! 2. Fetch content (cached across attempts), compute structure if the
//!    record has none, summarize.
//! 3. On failure wait `retry_delay` and try again; after the last attempt
//!    attach `{error, attempts}` and move on.
//!
//! Cancellation abandons in-flight items and returns
//! [`SyncError::Interrupted`]; nothing partial is handed back.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use repo_sync_core::analysis::SearchFields;
use repo_sync_core::language::is_enrichable;
use repo_sync_core::models::{Enrichment, EnrichmentFailure, EnrichmentMetadata, FileRecord};
use repo_sync_core::structure::extract_structure;
use repo_sync_core::SyncError;

use crate::config::SyncConfig;
use crate::traits::{FileSource, SummaryGenerator};

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub progress_every: usize,
    pub enrich_extensions: Vec<String>,
    pub skip_dirs: Vec<String>,
}

impl From<&SyncConfig> for EnrichOptions {
    fn from(c: &SyncConfig) -> Self {
        Self {
            concurrency: c.concurrency,
            max_attempts: c.max_attempts,
            retry_delay: Duration::from_millis(c.retry_delay_ms),
            progress_every: c.progress_every,
            enrich_extensions: c.enrich_extensions.clone(),
            skip_dirs: c.skip_dirs.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichProgress {
    pub processed: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Enriched,
    Skipped,
    Failed,
}

#[derive(Debug, Default)]
pub struct EnrichReport {
    pub items: Vec<FileRecord>,
    pub enriched: u64,
    pub skipped: u64,
    pub failed: u64,
}

fn interrupted(repo: &str) -> anyhow::Error {
    SyncError::Interrupted(format!("enrichment of {} cancelled", repo)).into()
}

async fn process_one(
    repo: &str,
    mut record: FileRecord,
    source: &dyn FileSource,
    summarizer: &dyn SummaryGenerator,
    opts: &EnrichOptions,
    cancel: &CancellationToken,
) -> Result<(FileRecord, Outcome)> {
    if !summarizer.is_enabled()
        || !is_enrichable(&record.path, &opts.enrich_extensions, &opts.skip_dirs)
    {
        tracing::debug!(path = %record.path, "pass-through, not enrichable");
        return Ok((record, Outcome::Skipped));
    }

    let attempts = opts.max_attempts.max(1);
    let mut content: Option<String> = None;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(interrupted(repo));
        }

        let result = async {
            if content.is_none() {
                let fetched = source.get_file_content(repo, &record.path).await?;
                if record.structure.is_empty() {
                    record.structure = extract_structure(&record.path, &fetched);
                }
                content = Some(fetched);
            }
            let text = content.as_deref().unwrap_or_default();
            summarizer.summarize(text, &record.path).await
        }
        .await;

        match result {
            Ok(summary) => {
                record.search = SearchFields::from_analysis(&summary.analysis);
                record.enrichment = Some(Enrichment::Analysis(Box::new(summary.analysis)));
                record.enrichment_metadata = Some(EnrichmentMetadata {
                    generated_at: summary.generated_at,
                    model_version: summary.model_version,
                });
                tracing::debug!(path = %record.path, attempt, "enriched");
                return Ok((record, Outcome::Enriched));
            }
            Err(e) => {
                last_error = format!("{:#}", e);
                tracing::warn!(
                    path = %record.path,
                    attempt,
                    max_attempts = attempts,
                    error = %last_error,
                    "enrichment attempt failed"
                );
                if attempt < attempts {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(interrupted(repo)),
                        _ = tokio::time::sleep(opts.retry_delay) => {}
                    }
                }
            }
        }
    }

    record.search = SearchFields::default();
    record.enrichment = Some(Enrichment::Failed(EnrichmentFailure {
        error: last_error,
        attempts,
    }));
    record.enrichment_metadata = None;
    Ok((record, Outcome::Failed))
}

/// Enrich `work` with at most `opts.concurrency` items in flight.
///
/// `on_progress` is awaited after every `progress_every` completions and
/// after the last one.
pub async fn enrich<F, Fut>(
    repo: &str,
    work: Vec<FileRecord>,
    source: &dyn FileSource,
    summarizer: &dyn SummaryGenerator,
    opts: &EnrichOptions,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<EnrichReport>
where
    F: FnMut(EnrichProgress) -> Fut,
    Fut: Future<Output = ()>,
{
    let total = work.len() as u64;
    let every = opts.progress_every.max(1) as u64;
    let mut report = EnrichReport {
        items: Vec::with_capacity(work.len()),
        ..EnrichReport::default()
    };

    let mut results = stream::iter(
        work.into_iter()
            .map(|record| process_one(repo, record, source, summarizer, opts, cancel)),
    )
    .buffer_unordered(opts.concurrency.max(1));

    let mut processed = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(interrupted(repo)),
            next = results.next() => next,
        };
        let Some(result) = next else { break };
        let (record, outcome) = result?;

        match outcome {
            Outcome::Enriched => report.enriched += 1,
            Outcome::Skipped => report.skipped += 1,
            Outcome::Failed => report.failed += 1,
        }
        report.items.push(record);
        processed += 1;

        if processed % every == 0 || processed == total {
            on_progress(EnrichProgress { processed, total }).await;
        }
    }

    tracing::info!(
        repo,
        total,
        enriched = report.enriched,
        skipped = report.skipped,
        failed = report.failed,
        "enrichment finished"
    );
    Ok(report)
}
