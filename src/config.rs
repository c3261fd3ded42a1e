use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use repo_sync_core::language::{DEFAULT_ENRICH_EXTENSIONS, DEFAULT_SKIP_DIRS};
use repo_sync_core::reconcile::MissingFingerprintPolicy;
use repo_sync_core::store::MAX_WRITE_BATCH;
use repo_sync_core::SyncError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GithubConfig,
    /// Per-account credentials, selected with `sync --account <id>`.
    #[serde(default)]
    pub accounts: HashMap<String, AccountConfig>,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Environment variable holding the token used when an account does not
    /// name its own.
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token_env: default_github_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AccountConfig {
    #[serde(default)]
    pub token_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_summarizer_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            endpoint: default_endpoint(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            timeout_secs: default_summarizer_timeout_secs(),
        }
    }
}

impl SummarizerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_top_k() -> u32 {
    40
}
fn default_top_p() -> f32 {
    0.8
}
fn default_summarizer_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Enrichment worker count.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Total attempts per file, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
    #[serde(default = "default_enrich_extensions")]
    pub enrich_extensions: Vec<String>,
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,
    #[serde(default)]
    pub missing_fingerprint: MissingFingerprintPolicy,
    /// Glob patterns excluded from local checkouts (`--local`).
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            progress_every: default_progress_every(),
            write_batch_size: default_write_batch_size(),
            enrich_extensions: default_enrich_extensions(),
            skip_dirs: default_skip_dirs(),
            missing_fingerprint: MissingFingerprintPolicy::default(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    2000
}
fn default_progress_every() -> usize {
    10
}
fn default_write_batch_size() -> usize {
    MAX_WRITE_BATCH
}
fn default_enrich_extensions() -> Vec<String> {
    DEFAULT_ENRICH_EXTENSIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_skip_dirs() -> Vec<String> {
    DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Resolve the GitHub token for `account`.
    ///
    /// The account's `token_env` wins over `[github] token_env`. A missing
    /// account entry or an unset variable is a configuration error.
    pub fn github_token(&self, account: Option<&str>) -> Result<String, SyncError> {
        let var = match account {
            Some(id) => {
                let entry = self.accounts.get(id).ok_or_else(|| {
                    SyncError::Configuration(format!("No [accounts.{}] section in config", id))
                })?;
                entry
                    .token_env
                    .clone()
                    .unwrap_or_else(|| self.github.token_env.clone())
            }
            None => self.github.token_env.clone(),
        };
        read_secret(&var)
    }

    pub fn summarizer_api_key(&self) -> Result<String, SyncError> {
        read_secret(&self.summarizer.api_key_env)
    }
}

fn read_secret(var: &str) -> Result<String, SyncError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SyncError::Configuration(format!(
            "Environment variable {} is not set",
            var
        ))),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate sync
    if config.sync.concurrency == 0 {
        anyhow::bail!("sync.concurrency must be > 0");
    }
    if config.sync.max_attempts == 0 {
        anyhow::bail!("sync.max_attempts must be >= 1");
    }
    if config.sync.progress_every == 0 {
        anyhow::bail!("sync.progress_every must be > 0");
    }
    if !(1..=MAX_WRITE_BATCH).contains(&config.sync.write_batch_size) {
        anyhow::bail!("sync.write_batch_size must be in [1, {}]", MAX_WRITE_BATCH);
    }

    // Validate summarizer
    match config.summarizer.provider.as_str() {
        "disabled" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown summarizer provider: '{}'. Must be disabled or gemini.",
            other
        ),
    }
    if config.summarizer.is_enabled() {
        if config.summarizer.model.trim().is_empty() {
            anyhow::bail!("summarizer.model must be specified when provider is 'gemini'");
        }
        if !(0.0..=2.0).contains(&config.summarizer.temperature) {
            anyhow::bail!("summarizer.temperature must be in [0.0, 2.0]");
        }
        if !(0.0..=1.0).contains(&config.summarizer.top_p) {
            anyhow::bail!("summarizer.top_p must be in [0.0, 1.0]");
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("reposync.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[db]\npath = \"./data/reposync.sqlite\"\n");
        let config = load_config(&path).unwrap();

        assert_eq!(config.sync.concurrency, 4);
        assert_eq!(config.sync.max_attempts, 3);
        assert_eq!(config.sync.retry_delay_ms, 2000);
        assert_eq!(config.sync.progress_every, 10);
        assert_eq!(config.sync.write_batch_size, 500);
        assert!(config.sync.enrich_extensions.contains(&"rs".to_string()));
        assert!(config.sync.skip_dirs.contains(&"node_modules".to_string()));
        assert_eq!(
            config.sync.missing_fingerprint,
            MissingFingerprintPolicy::Reprocess
        );
        assert_eq!(config.summarizer.model, "gemini-2.0-flash-lite");
        assert_eq!(config.summarizer.top_k, 40);
        assert_eq!(config.github.api_url, "https://api.github.com");
    }

    #[test]
    fn rejects_oversized_write_batch() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            "[db]\npath = \"x.sqlite\"\n[sync]\nwrite_batch_size = 501\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("write_batch_size"));
    }

    #[test]
    fn rejects_unknown_provider() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            "[db]\npath = \"x.sqlite\"\n[summarizer]\nprovider = \"gpt\"\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn parses_policy_and_accounts() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "x.sqlite"

[accounts.acme]
token_env = "REPOSYNC_TEST_ACME_TOKEN_UNSET"

[sync]
missing_fingerprint = "compare-metadata"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(
            config.sync.missing_fingerprint,
            MissingFingerprintPolicy::CompareMetadata
        );
        let err = config.github_token(Some("acme")).unwrap_err();
        assert!(err.to_string().contains("REPOSYNC_TEST_ACME_TOKEN_UNSET"));
        assert!(config.github_token(Some("other")).is_err());
    }
}
