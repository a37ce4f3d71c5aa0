//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; errors map to a status code and `{ "error": ... }`.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::User;
use crate::error::{GenerationError, QuizError, RepositoryError};
use crate::orchestrator::{GenerationRequest, Orchestrator};
use crate::protocol::*;
use crate::quiz::{load_quiz_for_client, strip_answers, submit_quiz, QuizSubmission};
use crate::state::AppState;

/// Error response: status plus message.
#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    if self.0.is_server_error() {
      warn!(target: "chaptergen_backend", status = %self.0, error = %self.1, "Request failed");
    }
    (self.0, Json(ErrorOut { error: self.1 })).into_response()
  }
}

fn repository_status(e: &RepositoryError) -> StatusCode {
  match e {
    RepositoryError::UnknownUser(_) => StatusCode::BAD_REQUEST,
    RepositoryError::NotFound { .. } => StatusCode::NOT_FOUND,
    RepositoryError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

fn quiz_status(e: &QuizError) -> StatusCode {
  match e {
    QuizError::Backend(_) | QuizError::Parse { .. } | QuizError::NoValidQuestions => StatusCode::BAD_GATEWAY,
    QuizError::UnknownQuestion(_) => StatusCode::BAD_REQUEST,
    QuizError::Repository(r) => repository_status(r),
  }
}

impl From<RepositoryError> for ApiError {
  fn from(e: RepositoryError) -> Self {
    ApiError(repository_status(&e), e.to_string())
  }
}

impl From<QuizError> for ApiError {
  fn from(e: QuizError) -> Self {
    ApiError(quiz_status(&e), e.to_string())
  }
}

impl From<GenerationError> for ApiError {
  fn from(e: GenerationError) -> Self {
    let status = match &e {
      GenerationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
      GenerationError::Backend { .. } | GenerationError::Parse { .. } | GenerationError::EmptyPlan => {
        StatusCode::BAD_GATEWAY
      }
      GenerationError::Repository { source, .. } => repository_status(source),
      GenerationError::Quiz(q) => quiz_status(q),
      GenerationError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      GenerationError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
    };
    ApiError(status, e.to_string())
  }
}

fn orchestrator(state: &AppState) -> Result<&Orchestrator, ApiError> {
  state.orchestrator.as_ref().ok_or_else(|| {
    ApiError(StatusCode::SERVICE_UNAVAILABLE, "content generation is not configured (GEMINI_API_KEY)".into())
  })
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let generation = state.orchestrator.is_some();
  let images = state.orchestrator.as_ref().is_some_and(|o| o.images_enabled());
  Json(HealthOut { ok: true, generation, images })
}

#[instrument(level = "info", skip(state, body), fields(name = %body.name))]
pub async fn http_register_user(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RegisterUserIn>,
) -> Result<(StatusCode, Json<User>), ApiError> {
  let user = User { id: body.id.unwrap_or_else(Uuid::new_v4), name: body.name };
  let user = state.repo.register_user(user).await?;
  info!(target: "chaptergen_backend", user_id = %user.id, "User registered");
  Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(level = "info", skip(state, body), fields(subject = %body.subject, grade = body.grade, prompt_len = body.prompt.len()))]
pub async fn http_generate_chapter(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateChapterIn>,
) -> Result<(StatusCode, Json<GenerateChapterOut>), ApiError> {
  let orch = orchestrator(&state)?;
  let generation = orch
    .generate_chapter(GenerationRequest {
      prompt: body.prompt,
      subject: body.subject,
      grade: body.grade,
      requested_by: body.user_id,
    })
    .await?;
  info!(target: "generation", chapter_id = %generation.chapter.id, lessons = generation.chapter.lessons.len(), "HTTP chapter generated");
  Ok((StatusCode::CREATED, Json(generation.into())))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_chapter(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<crate::domain::Chapter>, ApiError> {
  Ok(Json(state.repo.get_chapter_by_id(id).await?))
}

#[instrument(level = "info", skip(state), fields(subject = %q.subject, grade = ?q.grade))]
pub async fn http_list_chapters(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ChaptersQuery>,
) -> Result<Json<Vec<crate::domain::Chapter>>, ApiError> {
  Ok(Json(state.repo.get_chapters_by_subject(&q.subject, q.grade).await?))
}

#[instrument(level = "info", skip(state, body), fields(topic = %body.topic))]
pub async fn http_generate_memes(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<GenerateMemesIn>,
) -> Result<(StatusCode, Json<Vec<crate::domain::LessonMedia>>), ApiError> {
  let memes = orchestrator(&state)?
    .generate_memes_for_chapter(id, &body.topic, body.lesson_id)
    .await?;
  Ok((StatusCode::CREATED, Json(memes)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_generate_quiz(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<crate::domain::QuizWithQuestions>), ApiError> {
  let mut quiz = orchestrator(&state)?.generate_quiz_for_chapter(id).await?;
  strip_answers(&mut quiz.questions);
  Ok((StatusCode::CREATED, Json(quiz)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_quiz(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<crate::domain::QuizWithQuestions>, ApiError> {
  Ok(Json(load_quiz_for_client(state.repo.as_ref(), id).await?))
}

#[instrument(level = "info", skip(state, body), fields(quiz_id = %body.quiz_id, answers = body.answers.len()))]
pub async fn http_submit_quiz(
  State(state): State<Arc<AppState>>,
  Json(body): Json<QuizSubmission>,
) -> Result<Json<QuizResultOut>, ApiError> {
  let result = submit_quiz(state.repo.as_ref(), body).await?;
  Ok(Json(result.into()))
}
