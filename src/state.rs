//! Application state: content repository and the optional generation orchestrator.
//!
//! Built from the TOML config (prompts, generation settings, seed users) and the
//! environment (backend credentials). Without GEMINI_API_KEY the server still
//! serves reads; generation endpoints report 503.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{load_app_config_from_env, AppConfig};
use crate::domain::User;
use crate::orchestrator::Orchestrator;
use crate::providers::{BucketStore, GeminiText, ImageGenerator, ObjectStore, OpenAiImages};
use crate::repository::{ContentRepository, InMemoryRepository};

#[derive(Clone, Debug)]
pub struct AppState {
  pub repo: Arc<dyn ContentRepository>,
  pub orchestrator: Option<Orchestrator>,
}

impl AppState {
  pub fn new(repo: Arc<dyn ContentRepository>, orchestrator: Option<Orchestrator>) -> Self {
    Self { repo, orchestrator }
  }

  /// Build state from env: load config, register seed users, init backends.
  #[instrument(level = "info", skip_all)]
  pub async fn from_env() -> Self {
    let cfg = load_app_config_from_env().unwrap_or_default();
    Self::from_config(cfg).await
  }

  pub async fn from_config(cfg: AppConfig) -> Self {
    let repo: Arc<dyn ContentRepository> = Arc::new(InMemoryRepository::new());
    for seed in &cfg.users {
      let user = User { id: seed.id, name: seed.name.clone() };
      if let Err(e) = repo.register_user(user).await {
        warn!(target: "chaptergen_backend", user_id = %seed.id, error = %e, "Failed to register seed user");
      }
    }
    info!(target: "chaptergen_backend", users = cfg.users.len(), "Seed users registered");

    let images: Option<Arc<dyn ImageGenerator>> = match OpenAiImages::from_env() {
      Some(client) => {
        info!(target: "chaptergen_backend", base_url = %client.base_url, model = %client.model, "Image generation enabled.");
        Some(Arc::new(client))
      }
      None => {
        info!(target: "chaptergen_backend", "Image generation disabled (no OPENAI_API_KEY). Lessons get no media.");
        None
      }
    };

    let store: Option<Arc<dyn ObjectStore>> = match BucketStore::from_env() {
      Some(store) => {
        info!(target: "chaptergen_backend", endpoint = %store.endpoint, bucket = %store.bucket, "Media publishing enabled.");
        Some(Arc::new(store))
      }
      None => {
        info!(target: "chaptergen_backend", "Media publishing disabled (no MEDIA_BUCKET_ENDPOINT). Using transient image URLs.");
        None
      }
    };

    let orchestrator = match GeminiText::from_env() {
      Some(text) => {
        info!(target: "chaptergen_backend", base_url = %text.base_url, model = %text.model, "Gemini enabled.");
        Some(Orchestrator::new(
          repo.clone(),
          Arc::new(text),
          images,
          store,
          cfg.prompts,
          cfg.generation,
        ))
      }
      None => {
        warn!(target: "chaptergen_backend", "Gemini disabled (no GEMINI_API_KEY). Generation endpoints will return 503.");
        None
      }
    };

    Self { repo, orchestrator }
  }
}
