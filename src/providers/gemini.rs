//! Minimal Gemini client: `models/{model}:generateContent` with a single text part.
//!
//! Calls are instrumented and log model name, latency and response size (not contents).
//! The API key is never logged.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{extract_api_error, TextGenerator};
use crate::config::SamplingParams;
use crate::error::ProviderError;

const BACKEND: &str = "Gemini";

#[derive(Clone)]
pub struct GeminiText {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
}

impl std::fmt::Debug for GeminiText {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("GeminiText")
      .field("base_url", &self.base_url)
      .field("model", &self.model)
      .finish_non_exhaustive()
  }
}

impl GeminiText {
  pub fn new(api_key: String, base_url: String, model: String) -> Result<Self, ProviderError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(90))
      .build()
      .map_err(ProviderError::ClientBuild)?;
    Ok(Self { client, api_key, base_url, model })
  }

  /// Construct the client if we find GEMINI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty())?;
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".into());
    Self::new(api_key, base_url, model).ok()
  }
}

#[async_trait]
impl TextGenerator for GeminiText {
  #[instrument(level = "info", target = "providers", skip(self, prompt, params), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String, ProviderError> {
    let url = format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), self.model);
    let req = GenerateContentRequest {
      contents: vec![Content { parts: vec![Part { text: prompt.to_string() }] }],
      generation_config: GenerationConfig {
        temperature: params.temperature,
        top_k: params.top_k,
        top_p: params.top_p,
        max_output_tokens: params.max_output_tokens,
      },
    };

    let start = Instant::now();
    let res = self
      .client
      .post(&url)
      .query(&[("key", &self.api_key)])
      .header(USER_AGENT, "chaptergen-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&req)
      .send()
      .await
      .map_err(|source| ProviderError::Request { backend: BACKEND, source })?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_api_error(&body).unwrap_or(body);
      return Err(ProviderError::Api { backend: BACKEND, status, message });
    }

    let body: GenerateContentResponse = res
      .json()
      .await
      .map_err(|source| ProviderError::Decode { backend: BACKEND, source })?;
    if let Some(usage) = &body.usage_metadata {
      info!(target: "providers", prompt_tokens = ?usage.prompt_token_count, output_tokens = ?usage.candidates_token_count, "Gemini usage");
    }

    let text: String = body
      .candidates
      .first()
      .and_then(|c| c.content.as_ref())
      .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
      .unwrap_or_default();
    if text.trim().is_empty() {
      return Err(ProviderError::Empty(BACKEND));
    }
    info!(target: "providers", elapsed = ?start.elapsed(), response_len = text.len(), "Gemini response received");
    Ok(text)
  }
}

// --- Gemini DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  contents: Vec<Content>,
  generation_config: GenerationConfig,
}
#[derive(Serialize)]
struct Content {
  parts: Vec<Part>,
}
#[derive(Serialize)]
struct Part {
  text: String,
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  temperature: f32,
  top_k: u32,
  top_p: f32,
  max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
  #[serde(default)]
  usage_metadata: Option<UsageMetadata>,
}
#[derive(Deserialize)]
struct Candidate {
  #[serde(default)]
  content: Option<ContentResponse>,
}
#[derive(Deserialize)]
struct ContentResponse {
  #[serde(default)]
  parts: Vec<PartResponse>,
}
#[derive(Deserialize)]
struct PartResponse {
  #[serde(default)]
  text: Option<String>,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)]
  prompt_token_count: Option<u32>,
  #[serde(default)]
  candidates_token_count: Option<u32>,
}
