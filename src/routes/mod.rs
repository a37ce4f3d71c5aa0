//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
  routing::{get, post},
  Router,
};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - CORS (allow any origin/method/headers); adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/api/v1/health", get(http::http_health))
    .route("/api/v1/users", post(http::http_register_user))
    .route("/api/v1/chapters", get(http::http_list_chapters))
    .route("/api/v1/chapters/generate", post(http::http_generate_chapter))
    .route("/api/v1/chapters/:id", get(http::http_get_chapter))
    .route("/api/v1/chapters/:id/memes", post(http::http_generate_memes))
    .route("/api/v1/chapters/:id/quiz", post(http::http_generate_quiz))
    .route("/api/v1/quizzes/submit", post(http::http_submit_quiz))
    .route("/api/v1/quizzes/:id", get(http::http_get_quiz))
    .with_state(state)
    .layer(
      CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any),
    )
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}
