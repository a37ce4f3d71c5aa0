//! Meme and illustration generation for lessons.
//!
//! Each call goes through the request's `ImageCallLimiter`; generated images are
//! published to the object store when one is configured, and fall back to the
//! backend's transient URL when publishing fails.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{Prompts, SamplingParams};
use crate::domain::{LessonMedia, MediaType};
use crate::error::ProviderError;
use crate::providers::{ImageGenerator, ObjectStore, TextGenerator};
use crate::rate_limit::ImageCallLimiter;
use crate::util::{fill_template, sanitize_object_name, trunc_for_log, truncate_chars};

const MAX_MEME_PROMPT_CHARS: usize = 950;

/// A generated media item that has not been attached to a lesson yet.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDraft {
  pub media_type: MediaType,
  pub url: String,
  pub description: String,
}

impl MediaDraft {
  pub fn into_media(self, lesson_id: Uuid) -> LessonMedia {
    LessonMedia {
      id: Uuid::new_v4(),
      lesson_id,
      media_type: self.media_type,
      url: self.url,
      description: self.description,
      created_at: Utc::now(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct MediaService {
  text: Arc<dyn TextGenerator>,
  images: Arc<dyn ImageGenerator>,
  store: Option<Arc<dyn ObjectStore>>,
  prompts: Arc<Prompts>,
  sampling: SamplingParams,
}

impl MediaService {
  pub fn new(
    text: Arc<dyn TextGenerator>,
    images: Arc<dyn ImageGenerator>,
    store: Option<Arc<dyn ObjectStore>>,
    prompts: Arc<Prompts>,
    sampling: SamplingParams,
  ) -> Self {
    Self { text, images, store, prompts, sampling }
  }

  /// Ask the text backend for a short meme prompt; fall back to the fixed template.
  async fn meme_prompt(&self, topic: &str) -> String {
    let fallback = fill_template(&self.prompts.meme_fallback, &[("topic", topic)]);
    let request = fill_template(&self.prompts.meme_prompt, &[("topic", topic)]);
    match self.text.generate(&request, &self.sampling).await {
      Ok(raw) => {
        let enhanced = raw.trim();
        if enhanced.is_empty() {
          return fallback;
        }
        if enhanced.chars().count() > MAX_MEME_PROMPT_CHARS {
          warn!(target: "media", "Truncated meme prompt to {} characters", MAX_MEME_PROMPT_CHARS);
        }
        let prompt = truncate_chars(enhanced, MAX_MEME_PROMPT_CHARS);
        debug!(target: "media", prompt = %trunc_for_log(&prompt, 200), "Using enhanced meme prompt");
        prompt
      }
      Err(e) => {
        warn!(target: "media", error = %e, "Meme prompt enhancement failed; using default prompt");
        fallback
      }
    }
  }

  /// One meme about `topic`. `Ok(None)` means the request's image budget is spent.
  #[instrument(level = "info", target = "media", skip(self, limiter))]
  pub async fn generate_meme(
    &self,
    topic: &str,
    limiter: &ImageCallLimiter,
  ) -> Result<Option<MediaDraft>, ProviderError> {
    if !limiter.has_budget() {
      return Ok(None);
    }
    let prompt = self.meme_prompt(topic).await;

    let Some(slot) = limiter.acquire().await else {
      return Ok(None);
    };
    let urls = self.images.generate_images(&prompt, 1).await?;
    slot.succeeded();

    let Some(transient) = urls.into_iter().next() else {
      return Err(ProviderError::Empty("image backend"));
    };
    let name = format!("meme_{}_{}", sanitize_object_name(topic), 1);
    let url = self.publish_or_fallback(&transient, &name).await;
    info!(target: "media", %url, "Meme generated");
    Ok(Some(MediaDraft {
      media_type: MediaType::Meme,
      url,
      description: format!("Educational meme about {} (#{})", topic, 1),
    }))
  }

  /// One illustration for an image prompt. `Ok(None)` means the budget is spent.
  #[instrument(level = "info", target = "media", skip(self, prompt, limiter), fields(prompt = %trunc_for_log(prompt, 80)))]
  pub async fn generate_illustration(
    &self,
    prompt: &str,
    limiter: &ImageCallLimiter,
  ) -> Result<Option<MediaDraft>, ProviderError> {
    let Some(slot) = limiter.acquire().await else {
      return Ok(None);
    };
    let urls = self.images.generate_images(prompt, 1).await?;
    slot.succeeded();

    let Some(transient) = urls.into_iter().next() else {
      return Err(ProviderError::Empty("image backend"));
    };
    let name = format!("illustration_{}", sanitize_object_name(prompt));
    let url = self.publish_or_fallback(&transient, &name).await;
    Ok(Some(MediaDraft {
      media_type: MediaType::Image,
      url,
      description: format!("Generated illustration: {}", prompt),
    }))
  }

  async fn publish_or_fallback(&self, transient: &str, name: &str) -> String {
    let Some(store) = &self.store else {
      return transient.to_string();
    };
    match store.publish(transient, name).await {
      Ok(url) => url,
      Err(e) => {
        warn!(target: "media", error = %e, "Publishing failed; using transient URL");
        transient.to_string()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::GenerationSettings;
  use crate::testing::{FakeImages, FakeStore, ScriptedText};

  fn service(text: ScriptedText, images: FakeImages, store: Option<FakeStore>) -> MediaService {
    MediaService::new(
      Arc::new(text),
      Arc::new(images),
      store.map(|s| Arc::new(s) as Arc<dyn ObjectStore>),
      Arc::new(Prompts::default()),
      GenerationSettings::default().sampling(),
    )
  }

  #[tokio::test]
  async fn meme_uses_enhanced_prompt_and_published_url() {
    let text = ScriptedText::new().on("concise prompt", "A cat explaining chlorophyll");
    let images = FakeImages::ok();
    let svc = service(text, images.clone(), Some(FakeStore::ok()));
    let limiter = ImageCallLimiter::new(4, 4);

    let draft = svc.generate_meme("Photosynthesis", &limiter).await.unwrap().unwrap();
    assert_eq!(draft.media_type, MediaType::Meme);
    assert_eq!(draft.description, "Educational meme about Photosynthesis (#1)");
    assert_eq!(draft.url, "https://cdn.test/meme_Photosynthesis_1");
    assert_eq!(images.prompts(), vec!["A cat explaining chlorophyll".to_string()]);
    assert_eq!(limiter.images_generated(), 1);
  }

  #[tokio::test]
  async fn meme_prompt_falls_back_when_text_backend_fails() {
    let images = FakeImages::ok();
    let svc = service(ScriptedText::new(), images.clone(), None);
    let limiter = ImageCallLimiter::new(4, 4);

    let draft = svc.generate_meme("Gravity", &limiter).await.unwrap().unwrap();
    assert_eq!(images.prompts(), vec!["Create a funny and educational meme about Gravity".to_string()]);
    assert!(draft.url.starts_with("https://img.test/"));
  }

  #[tokio::test]
  async fn long_meme_prompt_is_truncated() {
    let text = ScriptedText::new().on("concise prompt", &"x".repeat(2000));
    let images = FakeImages::ok();
    let svc = service(text, images.clone(), None);
    svc.generate_meme("Gravity", &ImageCallLimiter::new(4, 4)).await.unwrap();
    assert_eq!(images.prompts()[0].chars().count(), 950);
  }

  #[tokio::test]
  async fn publish_failure_falls_back_to_transient_url() {
    let svc = service(ScriptedText::new(), FakeImages::ok(), Some(FakeStore::failing()));
    let draft = svc
      .generate_illustration("A leaf in sunlight", &ImageCallLimiter::new(4, 4))
      .await
      .unwrap()
      .unwrap();
    assert!(draft.url.starts_with("https://img.test/"));
    assert_eq!(draft.description, "Generated illustration: A leaf in sunlight");
  }

  #[tokio::test]
  async fn image_failure_does_not_consume_budget() {
    let svc = service(ScriptedText::new(), FakeImages::failing(), None);
    let limiter = ImageCallLimiter::new(4, 1);
    assert!(svc.generate_illustration("A leaf", &limiter).await.is_err());
    assert!(limiter.has_budget());
  }

  #[tokio::test]
  async fn exhausted_budget_skips_the_call() {
    let images = FakeImages::ok();
    let svc = service(ScriptedText::new(), images.clone(), None);
    let limiter = ImageCallLimiter::new(4, 0);
    assert_eq!(svc.generate_meme("Gravity", &limiter).await.unwrap(), None);
    assert_eq!(images.calls(), 0);
  }
}
