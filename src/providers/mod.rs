//! External backends behind traits: text generation, image generation and
//! object storage. The orchestrator only sees these traits, so tests swap in
//! scripted implementations.

pub mod bucket;
pub mod gemini;
pub mod openai_images;

use std::fmt::Debug;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SamplingParams;
use crate::error::ProviderError;

pub use bucket::BucketStore;
pub use gemini::GeminiText;
pub use openai_images::OpenAiImages;

/// Text-generation backend: one prompt in, raw text out.
/// Prompt construction and response parsing belong to the caller.
#[async_trait]
pub trait TextGenerator: Send + Sync + Debug {
  async fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String, ProviderError>;
}

/// Image-generation backend. Returns transient URLs.
#[async_trait]
pub trait ImageGenerator: Send + Sync + Debug {
  async fn generate_images(&self, prompt: &str, count: u8) -> Result<Vec<String>, ProviderError>;
}

/// Durable publishing of a transient URL; returns a stable public URL.
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
  async fn publish(&self, source_url: &str, name_hint: &str) -> Result<String, ProviderError>;
}

/// Try to extract a clean error message from an API error body
/// (`{"error": {"message": "..."}}`, shared by Gemini and OpenAI).
pub(crate) fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
