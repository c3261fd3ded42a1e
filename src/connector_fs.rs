//! Local checkout source.
//!
//! Lists a directory tree with `walkdir`, fingerprints each file with a
//! SHA-256 of its content, and computes code structure at listing time since
//! the content is already in hand.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use repo_sync_core::language::detect_language;
use repo_sync_core::models::{RepositoryMetadata, SourceFile};
use repo_sync_core::structure::extract_structure;
use repo_sync_core::SyncError;

use crate::traits::{FileSource, ListOptions};

pub struct LocalSource {
    root: PathBuf,
    exclude: GlobSet,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>, exclude_globs: &[String]) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            bail!("Local source root does not exist: {}", root.display());
        }
        Ok(Self {
            root,
            exclude: build_globset(exclude_globs)?,
        })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        if rel.is_absolute() || rel.components().any(|c| c.as_os_str() == "..") {
            bail!("Path escapes the source root: {}", path);
        }
        Ok(self.root.join(rel))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Hex SHA-256 of a byte slice.
pub fn content_fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn file_to_source(path: &Path, rel: String) -> Result<SourceFile> {
    let metadata = std::fs::metadata(path)?;
    let modified: Option<DateTime<Utc>> = metadata.modified().ok().map(DateTime::<Utc>::from);
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let structure = match std::str::from_utf8(&bytes) {
        Ok(text) => extract_structure(&rel, text),
        Err(_) => Default::default(),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(SourceFile {
        language: detect_language(&rel),
        fingerprint: Some(content_fingerprint(&bytes)),
        size: metadata.len(),
        // second precision, matching what the store keeps
        last_modified: modified.and_then(|m| DateTime::from_timestamp(m.timestamp(), 0)),
        last_change_summary: None,
        structure,
        name,
        path: rel,
    })
}

#[async_trait]
impl FileSource for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    async fn list_files(
        &self,
        repo: &str,
        opts: &ListOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !opts
                        .skip_dirs
                        .iter()
                        .any(|d| e.file_name().to_string_lossy() == d.as_str())
            });

        for entry in walker {
            if cancel.is_cancelled() {
                return Err(SyncError::Interrupted(format!("listing {} cancelled", repo)).into());
            }
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = relative_path(&self.root, entry.path());
            if self.exclude.is_match(&rel) {
                continue;
            }
            if opts.skips(detect_language(&rel).as_deref()) {
                continue;
            }
            files.push(file_to_source(entry.path(), rel)?);
        }

        tracing::debug!(repo, root = %self.root.display(), count = files.len(), "listed local files");
        Ok(opts.finish(files))
    }

    async fn get_file_content(&self, _repo: &str, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        let content = tokio::fs::read_to_string(&full)
            .await
            .with_context(|| format!("Failed to read {}", full.display()))?;
        Ok(content)
    }

    async fn get_repository_metadata(&self, repo: &str) -> Result<RepositoryMetadata> {
        let name = repo
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(repo)
            .to_string();
        Ok(RepositoryMetadata {
            name,
            full_name: repo.to_string(),
            description: Some(format!("Local checkout at {}", self.root.display())),
            ..RepositoryMetadata::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, body).unwrap();
    }

    fn opts() -> ListOptions {
        ListOptions {
            skip_dirs: vec!["node_modules".into(), ".git".into()],
            ..ListOptions::default()
        }
    }

    #[tokio::test]
    async fn lists_with_fingerprints_and_structure() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/app.py", "import os\ndef run():\n    pass\n");
        write(tmp.path(), "README.md", "# hi");
        write(tmp.path(), "node_modules/x/index.js", "function x() {}");

        let source = LocalSource::new(tmp.path(), &[]).unwrap();
        let files = source
            .list_files("acme/app", &opts(), &CancellationToken::new())
            .await
            .unwrap();

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/app.py"]);
        let app = &files[1];
        assert_eq!(app.language.as_deref(), Some("py"));
        assert_eq!(app.structure.functions, vec!["run"]);
        assert_eq!(
            app.fingerprint.as_deref(),
            Some(content_fingerprint(b"import os\ndef run():\n    pass\n").as_str())
        );
    }

    #[tokio::test]
    async fn honours_skip_types_and_excludes() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.py", "x = 1");
        write(tmp.path(), "b.md", "doc");
        write(tmp.path(), "gen/c.py", "y = 2");

        let source = LocalSource::new(tmp.path(), &["gen/**".to_string()]).unwrap();
        let mut o = opts();
        o.skip_extensions = vec!["md".into()];
        let files = source
            .list_files("r", &o, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "a.py");
    }

    #[tokio::test]
    async fn cancelled_listing_is_interrupted() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.py", "x = 1");
        let source = LocalSource::new(tmp.path(), &[]).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = source.list_files("r", &opts(), &cancel).await.unwrap_err();
        assert!(SyncError::is_interrupted(&err));
    }

    #[tokio::test]
    async fn content_reads_stay_inside_root() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.py", "x = 1");
        let source = LocalSource::new(tmp.path(), &[]).unwrap();
        assert_eq!(source.get_file_content("r", "a.py").await.unwrap(), "x = 1");
        assert!(source.get_file_content("r", "../etc/passwd").await.is_err());
    }
}
