//! Adapter traits at the sync engine's two external seams.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐        ┌──────────────────────┐
//! │    FileSource     │        │   SummaryGenerator   │
//! │  GitHub / Local   │        │  Gemini / Disabled   │
//! └────────┬─────────┘        └──────────┬───────────┘
//!          │ list_files / content        │ summarize
//!          ▼                             ▼
//!      reconcile ──────────────▶ enrich ──▶ SyncStateStore
//! ```
//!
//! Both traits are object-safe and used behind `&dyn` by
//! [`run_sync_with`](crate::sync::run_sync_with), which lets tests drive the
//! real engine with fakes.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use repo_sync_core::analysis::CodeAnalysis;
use repo_sync_core::models::{RepositoryMetadata, SourceFile};

// ═══════════════════════════════════════════════════════════════════════
// FileSource
// ═══════════════════════════════════════════════════════════════════════

/// Listing filters applied by every [`FileSource`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Language tags (extensions without dot) to leave out of the listing.
    pub skip_extensions: Vec<String>,
    /// Truncate the listing to this many files after sorting by path.
    pub max_files: Option<usize>,
    /// Directory names never descended into.
    pub skip_dirs: Vec<String>,
}

impl ListOptions {
    /// Whether a listed file with this language tag should be dropped.
    pub fn skips(&self, language: Option<&str>) -> bool {
        match language {
            Some(lang) => self
                .skip_extensions
                .iter()
                .any(|s| s.trim_start_matches('.').eq_ignore_ascii_case(lang)),
            None => false,
        }
    }

    /// Sort by path and apply `max_files`.
    pub fn finish(&self, mut files: Vec<SourceFile>) -> Vec<SourceFile> {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(max) = self.max_files {
            files.truncate(max);
        }
        files
    }
}

/// A repository provider that lists files with content fingerprints and
/// serves file content on demand.
///
/// # Example
///
/// ```rust,ignore
/// #[async_trait]
/// impl FileSource for FixtureSource {
///     fn name(&self) -> &str { "fixture" }
///
///     async fn list_files(&self, repo: &str, opts: &ListOptions, cancel: &CancellationToken)
///         -> Result<Vec<SourceFile>> {
///         Ok(opts.finish(self.files.clone()))
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Short label for logs (e.g. `"github"`, `"local"`).
    fn name(&self) -> &str;

    /// List every file of `repo` as a flat set.
    ///
    /// Implementations check `cancel` between traversal steps and return
    /// [`SyncError::Interrupted`](repo_sync_core::SyncError::Interrupted)
    /// when it fires. Any other failure is fatal for the run.
    async fn list_files(
        &self,
        repo: &str,
        opts: &ListOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceFile>>;

    /// Fetch the UTF-8 content of one file.
    async fn get_file_content(&self, repo: &str, path: &str) -> Result<String>;

    async fn get_repository_metadata(&self, repo: &str) -> Result<RepositoryMetadata>;
}

// ═══════════════════════════════════════════════════════════════════════
// SummaryGenerator
// ═══════════════════════════════════════════════════════════════════════

/// A successful summarizer call.
#[derive(Debug, Clone)]
pub struct Summary {
    pub analysis: CodeAnalysis,
    pub generated_at: DateTime<Utc>,
    pub model_version: String,
}

/// Turns file content into a structured [`CodeAnalysis`].
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    /// Model identifier recorded in enrichment metadata.
    fn model_name(&self) -> &str;

    /// When `false`, every work item passes through without a call.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn summarize(&self, content: &str, path: &str) -> Result<Summary>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use repo_sync_core::models::CodeStructure;

    fn file(path: &str) -> SourceFile {
        SourceFile {
            path: path.to_string(),
            name: path.to_string(),
            size: 0,
            language: repo_sync_core::language::detect_language(path),
            fingerprint: None,
            last_modified: None,
            last_change_summary: None,
            structure: CodeStructure::default(),
        }
    }

    #[test]
    fn skip_types_match_language_tags() {
        let opts = ListOptions {
            skip_extensions: vec![".md".into(), "JSON".into()],
            ..ListOptions::default()
        };
        assert!(opts.skips(Some("md")));
        assert!(opts.skips(Some("json")));
        assert!(!opts.skips(Some("py")));
        assert!(!opts.skips(None));
    }

    #[test]
    fn finish_sorts_then_truncates() {
        let opts = ListOptions {
            max_files: Some(2),
            ..ListOptions::default()
        };
        let out = opts.finish(vec![file("c.py"), file("a.py"), file("b.py")]);
        let paths: Vec<&str> = out.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py"]);
    }
}
