//! Summary generator implementations.
//!
//! - **[`GeminiSummarizer`]** calls the Gemini `generateContent` REST
//!   endpoint and parses the reply with
//!   [`parse_analysis`](repo_sync_core::analysis::parse_analysis).
//! - **[`DisabledSummarizer`]** makes every work item a pass-through.
//!
//! Neither implementation retries; the enrichment pipeline owns the retry
//! policy so attempts are counted in one place.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use repo_sync_core::analysis::parse_analysis;
use repo_sync_core::SyncError;

use crate::config::{Config, SummarizerConfig};
use crate::traits::{Summary, SummaryGenerator};

/// Build the summarizer named by `[summarizer] provider`.
///
/// The Gemini provider needs its API key at construction time; a missing key
/// fails here, before the run starts.
pub fn create_summarizer(config: &Config) -> Result<Box<dyn SummaryGenerator>> {
    match config.summarizer.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledSummarizer)),
        "gemini" => {
            let key = config.summarizer_api_key()?;
            Ok(Box::new(GeminiSummarizer::new(&config.summarizer, key)?))
        }
        other => Err(SyncError::Configuration(format!(
            "Unknown summarizer provider: {}",
            other
        ))
        .into()),
    }
}

// ============ Disabled ============

pub struct DisabledSummarizer;

#[async_trait]
impl SummaryGenerator for DisabledSummarizer {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn summarize(&self, _content: &str, path: &str) -> Result<Summary> {
        bail!("Summarizer is disabled (asked to summarize {})", path)
    }
}

// ============ Gemini ============

pub struct GeminiSummarizer {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    top_k: u32,
    top_p: f32,
}

impl GeminiSummarizer {
    pub fn new(config: &SummarizerConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "topK": self.top_k,
                "topP": self.top_p,
                "responseMimeType": "application/json",
            },
        })
    }
}

/// The analysis prompt. The JSON skeleton doubles as the schema the reply
/// is validated against.
pub fn analysis_prompt(path: &str, content: &str) -> String {
    format!(
        r#"You are a code analysis expert. Analyze the file below and reply with one JSON object of this shape:

{{
  "summary": "brief, development-focused summary",
  "searchMetadata": {{
    "primaryFeatures": ["key features and patterns"],
    "dataTypes": ["data structures and types used"],
    "stateManagement": ["state management approaches"],
    "commonModifications": ["typical changes a developer would make here"],
    "dependencies": {{
      "external": ["external package dependencies"],
      "internal": ["internal module dependencies"]
    }}
  }},
  "imports": [
    {{ "path": "import path", "items": ["imported items"], "purpose": "why they are needed" }}
  ],
  "functions": [
    {{
      "name": "function name",
      "purpose": "what it does",
      "params": ["parameters"],
      "returns": "return value",
      "dependencies": ["what it depends on"],
      "stateInteractions": {{ "reads": ["state read"], "writes": ["state modified"] }}
    }}
  ],
  "classes": [
    {{
      "name": "class name",
      "purpose": "what it does",
      "methods": ["method names"],
      "properties": ["property names"],
      "dependencies": ["what it depends on"]
    }}
  ],
  "integrationPoints": [
    {{ "type": "API/Component/Hook/Service/Store", "name": "integration point", "purpose": "how it is used" }}
  ]
}}

Focus on integration points, state management, dependencies and data flow.

FILE PATH: {path}

CODE CONTENT:
{content}

Return only valid JSON matching the structure exactly."#
    )
}

/// Concatenate the text parts of the first candidate.
fn response_text(json: &Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            anyhow::anyhow!("Invalid Gemini response: {}", reason)
        })?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        bail!("Gemini returned an empty response");
    }
    Ok(text)
}

#[async_trait]
impl SummaryGenerator for GeminiSummarizer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, content: &str, path: &str) -> Result<Summary> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = self.request_body(&analysis_prompt(path, content));

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, body_text);
        }

        let json: Value = response.json().await?;
        let text = response_text(&json)?;
        let analysis = parse_analysis(&text)?;

        Ok(Summary {
            analysis,
            generated_at: Utc::now(),
            model_version: self.model.clone(),
        })
    }
}
