//! OpenAI Images client (`/images/generations`, URL response format).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{extract_api_error, ImageGenerator};
use crate::error::ProviderError;

const BACKEND: &str = "OpenAI Images";

#[derive(Clone)]
pub struct OpenAiImages {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
}

impl std::fmt::Debug for OpenAiImages {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OpenAiImages")
      .field("base_url", &self.base_url)
      .field("model", &self.model)
      .finish_non_exhaustive()
  }
}

impl OpenAiImages {
  pub fn new(api_key: String, base_url: String, model: String) -> Result<Self, ProviderError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .map_err(ProviderError::ClientBuild)?;
    Ok(Self { client, api_key, base_url, model })
  }

  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_IMAGE_MODEL").unwrap_or_else(|_| "dall-e-3".into());
    Self::new(api_key, base_url, model).ok()
  }
}

#[async_trait]
impl ImageGenerator for OpenAiImages {
  #[instrument(level = "info", target = "providers", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn generate_images(&self, prompt: &str, count: u8) -> Result<Vec<String>, ProviderError> {
    let url = format!("{}/images/generations", self.base_url.trim_end_matches('/'));
    let req = ImageRequest {
      model: self.model.clone(),
      prompt: prompt.to_string(),
      n: count.max(1),
      size: "1024x1024",
      response_format: "url",
    };

    let start = Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "chaptergen-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
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

    let body: ImageResponse = res
      .json()
      .await
      .map_err(|source| ProviderError::Decode { backend: BACKEND, source })?;
    let urls: Vec<String> = body.data.into_iter().filter_map(|d| d.url).collect();
    if urls.is_empty() {
      return Err(ProviderError::Empty(BACKEND));
    }
    info!(target: "providers", elapsed = ?start.elapsed(), images = urls.len(), "Images generated");
    Ok(urls)
  }
}

#[derive(Serialize)]
struct ImageRequest {
  model: String,
  prompt: String,
  n: u8,
  size: &'static str,
  response_format: &'static str,
}

#[derive(Deserialize)]
struct ImageResponse {
  #[serde(default)]
  data: Vec<ImageData>,
}
#[derive(Deserialize)]
struct ImageData {
  #[serde(default)]
  url: Option<String>,
}
