//! GitHub REST API source.
//!
//! The repository tree is walked with an explicit worklist over the
//! contents API, one directory per request, so cancellation is checked
//! between steps. Listing failures are fatal. Per-file last-commit lookups
//! are best effort: a failure leaves `last_change_summary` empty.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use repo_sync_core::language::detect_language;
use repo_sync_core::models::{CodeStructure, RepositoryMetadata, SourceFile};
use repo_sync_core::SyncError;

use crate::config::GithubConfig;
use crate::traits::{FileSource, ListOptions};

const USER_AGENT: &str = concat!("reposync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    path: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
    #[serde(default)]
    committer: Option<CommitSignature>,
}

#[derive(Debug, Deserialize)]
struct CommitSignature {
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    name: String,
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
}

impl From<RepoResponse> for RepositoryMetadata {
    fn from(r: RepoResponse) -> Self {
        RepositoryMetadata {
            name: r.name,
            full_name: r.full_name,
            description: r.description,
            default_branch: r.default_branch,
            language: r.language,
            created_at: r.created_at,
            updated_at: r.updated_at,
            size: r.size,
            stars: r.stargazers_count,
            forks: r.forks_count,
        }
    }
}

/// Decode a contents API payload into UTF-8 text.
fn decode_content(payload: &FileContent, path: &str) -> Result<String> {
    if payload.encoding != "base64" {
        bail!("Unsupported content encoding '{}' for {}", payload.encoding, path);
    }
    // GitHub wraps base64 at 60 columns
    let compact: String = payload
        .content
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .with_context(|| format!("Invalid base64 content for {}", path))?;
    String::from_utf8(bytes).with_context(|| format!("{} is not UTF-8 text", path))
}

pub struct GitHubSource {
    client: Client,
    api_url: Url,
    token: String,
}

impl GitHubSource {
    pub fn new(config: &GithubConfig, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        let api_url = Url::parse(&config.api_url)
            .with_context(|| format!("Invalid github.api_url: {}", config.api_url))?;
        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    /// `{api}/repos/{owner}/{repo}/{tail...}` with each segment escaped.
    fn repo_url(&self, repo: &str, tail: &[&str]) -> Result<Url> {
        let (owner, name) = repo
            .split_once('/')
            .filter(|(o, n)| !o.is_empty() && !n.is_empty() && !n.contains('/'))
            .ok_or_else(|| {
                SyncError::Configuration(format!("Repository must be 'owner/repo', got '{}'", repo))
            })?;
        let mut url = self.api_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("github.api_url cannot be a base URL"))?;
            segments.pop_if_empty().extend(["repos", owner, name]);
            segments.extend(tail.iter().flat_map(|t| t.split('/')).filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .client
            .get(url.clone())
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .with_context(|| format!("GitHub request failed: {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("GitHub API error {} for {}: {}", status, url.path(), body_text);
        }
        Ok(response.json().await?)
    }

    async fn list_dir(&self, repo: &str, dir: &str) -> Result<Vec<ContentEntry>> {
        let url = self.repo_url(repo, &["contents", dir])?;
        self.get_json(url).await
    }

    async fn last_commit(&self, repo: &str, path: &str) -> Result<Option<CommitDetail>> {
        let mut url = self.repo_url(repo, &["commits"])?;
        url.query_pairs_mut()
            .append_pair("path", path)
            .append_pair("per_page", "1");
        let commits: Vec<CommitEntry> = self.get_json(url).await?;
        Ok(commits.into_iter().next().map(|c| c.commit))
    }
}

#[async_trait]
impl FileSource for GitHubSource {
    fn name(&self) -> &str {
        "github"
    }

    async fn list_files(
        &self,
        repo: &str,
        opts: &ListOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceFile>> {
        let mut pending: VecDeque<String> = VecDeque::from([String::new()]);
        let mut files = Vec::new();

        while let Some(dir) = pending.pop_front() {
            if cancel.is_cancelled() {
                return Err(SyncError::Interrupted(format!("listing {} cancelled", repo)).into());
            }
            let entries = self
                .list_dir(repo, &dir)
                .await
                .map_err(|e| SyncError::Source(format!("listing '{}/{}': {:#}", repo, dir, e)))?;

            for entry in entries {
                match entry.kind.as_str() {
                    "dir" => {
                        if !opts.skip_dirs.iter().any(|d| *d == entry.name) {
                            pending.push_back(entry.path);
                        }
                    }
                    "file" => {
                        let language = detect_language(&entry.path);
                        if opts.skips(language.as_deref()) {
                            continue;
                        }
                        files.push(SourceFile {
                            path: entry.path,
                            name: entry.name,
                            size: entry.size,
                            language,
                            fingerprint: entry.sha,
                            last_modified: None,
                            last_change_summary: None,
                            structure: CodeStructure::default(),
                        });
                    }
                    // symlinks and submodules are not synced
                    _ => {}
                }
            }
            tracing::debug!(repo, dir = %dir, queued = pending.len(), "listed directory");
        }

        let mut files = opts.finish(files);

        for file in files.iter_mut() {
            if cancel.is_cancelled() {
                return Err(SyncError::Interrupted(format!("listing {} cancelled", repo)).into());
            }
            match self.last_commit(repo, &file.path).await {
                Ok(Some(commit)) => {
                    file.last_modified = commit.committer.and_then(|c| c.date);
                    file.last_change_summary = Some(commit.message);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(repo, path = %file.path, error = %e, "last commit lookup failed");
                }
            }
        }

        Ok(files)
    }

    async fn get_file_content(&self, repo: &str, path: &str) -> Result<String> {
        let url = self.repo_url(repo, &["contents", path])?;
        let payload: FileContent = self.get_json(url).await?;
        decode_content(&payload, path)
    }

    async fn get_repository_metadata(&self, repo: &str) -> Result<RepositoryMetadata> {
        let url = self.repo_url(repo, &[])?;
        let response: RepoResponse = self
            .get_json(url)
            .await
            .map_err(|e| SyncError::Source(format!("repository {}: {:#}", repo, e)))?;
        Ok(response.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> GitHubSource {
        GitHubSource::new(&GithubConfig::default(), "t".into()).unwrap()
    }

    #[test]
    fn builds_escaped_repo_urls() {
        let s = source();
        let url = s.repo_url("acme/widgets", &["contents", "src/my file.rs"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/widgets/contents/src/my%20file.rs"
        );
        let root = s.repo_url("acme/widgets", &["contents", ""]).unwrap();
        assert_eq!(root.as_str(), "https://api.github.com/repos/acme/widgets/contents");
        assert!(s.repo_url("widgets", &[]).is_err());
        assert!(s.repo_url("a/b/c", &[]).is_err());
    }

    #[test]
    fn decodes_wrapped_base64() {
        let payload = FileContent {
            content: "aW1wb3J0IG9z\nCg==\n".into(),
            encoding: "base64".into(),
        };
        assert_eq!(decode_content(&payload, "a.py").unwrap(), "import os\n");

        let other = FileContent {
            content: String::new(),
            encoding: "none".into(),
        };
        assert!(decode_content(&other, "big.bin").is_err());
    }

    #[test]
    fn parses_contents_listing() {
        let json = r#"[
            {"type": "file", "name": "a.py", "path": "a.py", "size": 12, "sha": "abc"},
            {"type": "dir", "name": "src", "path": "src", "size": 0, "sha": "def"}
        ]"#;
        let entries: Vec<ContentEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].kind, "file");
        assert_eq!(entries[0].sha.as_deref(), Some("abc"));
        assert_eq!(entries[1].path, "src");
    }

    #[test]
    fn maps_repository_metadata() {
        let json = r#"{
            "name": "widgets", "full_name": "acme/widgets", "description": null,
            "default_branch": "main", "language": "Rust",
            "created_at": "2024-01-02T03:04:05Z", "updated_at": "2024-02-02T03:04:05Z",
            "size": 321, "stargazers_count": 9, "forks_count": 2
        }"#;
        let meta: RepositoryMetadata = serde_json::from_str::<RepoResponse>(json).unwrap().into();
        assert_eq!(meta.full_name, "acme/widgets");
        assert_eq!(meta.stars, 9);
        assert_eq!(meta.forks, 2);
        assert_eq!(meta.default_branch.as_deref(), Some("main"));
        assert!(meta.description.is_none());
    }
}
