//! Chapter Generation Backend
//!
//! - Axum HTTP API for AI-generated chapters, lessons, memes and quizzes
//! - Gemini text generation, optional OpenAI image generation and bucket publishing
//! - In-memory content repository
//!
//! Important env variables:
//!   PORT                   : u16 (default 3000)
//!   GEMINI_API_KEY         : enables generation if present
//!   GEMINI_BASE_URL        : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_MODEL           : default "gemini-2.0-flash"
//!   OPENAI_API_KEY         : enables image generation if present
//!   OPENAI_BASE_URL        : default "https://api.openai.com/v1"
//!   OPENAI_IMAGE_MODEL     : default "dall-e-3"
//!   MEDIA_BUCKET_ENDPOINT  : enables publishing generated images if present
//!   MEDIA_BUCKET_NAME      : default "educational-media"
//!   MEDIA_BUCKET_TOKEN     : optional bearer token for uploads
//!   MEDIA_PUBLIC_URL       : public base URL for published objects
//!   CHAPTERGEN_CONFIG_PATH : path to TOML config (prompts, generation settings, seed users)
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod cleaning;
mod content;
mod providers;
mod rate_limit;
mod media;
mod sequencer;
mod quiz;
mod repository;
mod orchestrator;
mod state;
mod protocol;
mod routes;
#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: repository, seed users and whichever backends are configured.
  let state = Arc::new(AppState::from_env().await);

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "chaptergen_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "chaptergen_backend", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
