//! Sync progress reporting.
//!
//! Reports observable progress during `reposync sync` so users see what is
//! being listed, how much enrichment is left, and when records are being
//! committed. Progress goes to **stderr** so stdout stays parseable.

use std::io::Write;
use std::str::FromStr;

/// A single progress event for a sync run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncProgressEvent {
    /// Source listing in progress (total unknown).
    Listing { repo: String },
    /// Reconciliation finished.
    Reconciled {
        repo: String,
        work: u64,
        unchanged: u64,
        deleted: u64,
    },
    /// `processed` of `total` work items enriched.
    Enriching {
        repo: String,
        processed: u64,
        total: u64,
    },
    /// `written` of `total` records committed.
    Committing {
        repo: String,
        written: u64,
        total: u64,
    },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync acme/app  enriching  40 / 1,250 files".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Listing { repo } => format!("sync {}  listing...\n", repo),
            SyncProgressEvent::Reconciled {
                repo,
                work,
                unchanged,
                deleted,
            } => format!(
                "sync {}  reconciled  {} to process, {} unchanged, {} deleted\n",
                repo,
                format_number(*work),
                format_number(*unchanged),
                format_number(*deleted)
            ),
            SyncProgressEvent::Enriching {
                repo,
                processed,
                total,
            } => format!(
                "sync {}  enriching  {} / {} files\n",
                repo,
                format_number(*processed),
                format_number(*total)
            ),
            SyncProgressEvent::Committing {
                repo,
                written,
                total,
            } => format!(
                "sync {}  committing  {} / {} records\n",
                repo,
                format_number(*written),
                format_number(*total)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Listing { repo } => serde_json::json!({
                "event": "progress",
                "repo": repo,
                "phase": "listing"
            }),
            SyncProgressEvent::Reconciled {
                repo,
                work,
                unchanged,
                deleted,
            } => serde_json::json!({
                "event": "progress",
                "repo": repo,
                "phase": "reconciled",
                "work": work,
                "unchanged": unchanged,
                "deleted": deleted
            }),
            SyncProgressEvent::Enriching {
                repo,
                processed,
                total,
            } => serde_json::json!({
                "event": "progress",
                "repo": repo,
                "phase": "enriching",
                "n": processed,
                "total": total
            }),
            SyncProgressEvent::Committing {
                repo,
                written,
                total,
            } => serde_json::json!({
                "event": "progress",
                "repo": repo,
                "phase": "committing",
                "n": written,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl FromStr for ProgressMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode: '{}'. Use off, human, or json.", other),
        }
    }
}
