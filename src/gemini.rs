//! Minimal Gemini client for our use-cases.
//!
//! We only call `models/{model}:generateContent` and request either free text or
//! a JSON object constrained by a response schema. Calls are instrumented and log
//! model name, latency and response sizes (not contents).
//!
//! NOTE: the credential is supplied per call by the teacher; it is never logged.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::ModelError;
use crate::media::MediaAttachment;

/// One piece of a multimodal prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Part {
  Text(String),
  Inline(MediaAttachment),
}

/// What we send to the model: ordered parts plus an optional JSON schema.
#[derive(Clone, Debug, Default)]
pub struct ModelRequest {
  pub parts: Vec<Part>,
  pub response_schema: Option<serde_json::Value>,
}

impl ModelRequest {
  pub fn text(prompt: impl Into<String>) -> Self {
    Self { parts: vec![Part::Text(prompt.into())], response_schema: None }
  }

  pub fn json(prompt: impl Into<String>, schema: serde_json::Value) -> Self {
    Self { parts: vec![Part::Text(prompt.into())], response_schema: Some(schema) }
  }

  /// Attachment first, then the instruction text.
  pub fn with_attachment(attachment: MediaAttachment, prompt: impl Into<String>) -> Self {
    Self { parts: vec![Part::Inline(attachment), Part::Text(prompt.into())], response_schema: None }
  }
}

/// Text-producing generative model. Returns the raw response text.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
  async fn generate(&self, api_key: &str, request: ModelRequest) -> Result<String, ModelError>;
}

#[derive(Clone)]
pub struct GeminiClient {
  pub client: reqwest::Client,
  pub base_url: String,
  pub model: String,
}

impl GeminiClient {
  /// Build the client from GEMINI_BASE_URL / GEMINI_MODEL / GEMINI_TIMEOUT_SECS.
  pub fn from_env() -> Result<Self, ModelError> {
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".into());
    let timeout = std::env::var("GEMINI_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(60);

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(timeout))
      .build()?;

    Ok(Self { client, base_url, model })
  }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
  #[instrument(level = "info", skip(self, api_key, request), fields(model = %self.model, parts = request.parts.len(), json = request.response_schema.is_some()))]
  async fn generate(&self, api_key: &str, request: ModelRequest) -> Result<String, ModelError> {
    let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
    let body = GenerateContentRequest::from(request);

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "quest-trainer/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", api_key)
      .json(&body).send().await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_gemini_error(&body).unwrap_or(body);
      error!(elapsed = ?start.elapsed(), %status, "Gemini call rejected");
      return Err(ModelError::Api { status: status.as_u16(), message });
    }

    let body: GenerateContentResponse = res.json().await?;
    if let Some(usage) = &body.usage_metadata {
      info!(prompt_tokens = ?usage.prompt_token_count, completion_tokens = ?usage.candidates_token_count, total_tokens = ?usage.total_token_count, "Gemini usage");
    }
    let text = body.text();
    info!(elapsed = ?start.elapsed(), response_len = text.len(), "Gemini response received");
    Ok(text)
  }
}

// --- Wire DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  contents: Vec<Content>,
  #[serde(skip_serializing_if = "Option::is_none")]
  generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
  role: &'static str,
  parts: Vec<WirePart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum WirePart {
  #[serde(rename = "text")]
  Text(String),
  #[serde(rename_all = "camelCase")]
  InlineData { mime_type: String, data: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  response_mime_type: &'static str,
  response_schema: serde_json::Value,
}

impl From<ModelRequest> for GenerateContentRequest {
  fn from(req: ModelRequest) -> Self {
    let parts = req
      .parts
      .into_iter()
      .map(|p| match p {
        Part::Text(t) => WirePart::Text(t),
        Part::Inline(a) => WirePart::InlineData { data: a.to_base64(), mime_type: a.mime_type },
      })
      .collect();
    Self {
      contents: vec![Content { role: "user", parts }],
      generation_config: req.response_schema.map(|schema| GenerationConfig {
        response_mime_type: "application/json",
        response_schema: schema,
      }),
    }
  }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
  #[serde(default)]
  usage_metadata: Option<UsageMetadata>,
}

impl GenerateContentResponse {
  /// Concatenated text of the first candidate.
  fn text(&self) -> String {
    self.candidates
      .first()
      .and_then(|c| c.content.as_ref())
      .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect::<String>())
      .unwrap_or_default()
  }
}

#[derive(Deserialize)]
struct Candidate {
  #[serde(default)]
  content: Option<CandidateContent>,
}
#[derive(Deserialize)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<CandidatePart>,
}
#[derive(Deserialize)]
struct CandidatePart {
  #[serde(default)]
  text: Option<String>,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u32>,
  #[serde(default)] candidates_token_count: Option<u32>,
  #[serde(default)] total_token_count: Option<u32>,
}

/// Try to extract a clean error message from a Gemini error body.
fn extract_gemini_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
