//! Error taxonomy for backends, persistence, quiz parsing and chapter generation.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Failure talking to one of the external backends (text, image, object storage).
#[derive(Error, Debug)]
pub enum ProviderError {
  #[error("Failed to build HTTP client: {0}")]
  ClientBuild(reqwest::Error),
  #[error("Request to {backend} failed: {source}")]
  Request {
    backend: &'static str,
    #[source]
    source: reqwest::Error,
  },
  #[error("{backend} returned HTTP {status}: {message}")]
  Api {
    backend: &'static str,
    status: u16,
    message: String,
  },
  #[error("Failed to decode {backend} response: {source}")]
  Decode {
    backend: &'static str,
    #[source]
    source: reqwest::Error,
  },
  #[error("{0} returned an empty response")]
  Empty(&'static str),
}

#[derive(Error, Debug)]
pub enum RepositoryError {
  #[error("user with ID {0} does not exist")]
  UnknownUser(Uuid),
  #[error("{entity} {id} not found")]
  NotFound { entity: &'static str, id: Uuid },
  #[error("repository failure: {0}")]
  Backend(String),
}

#[derive(Error, Debug)]
pub enum QuizError {
  #[error("quiz generation request failed: {0}")]
  Backend(#[from] ProviderError),
  #[error("failed to parse quiz: {source} (response: {excerpt})")]
  Parse {
    #[source]
    source: serde_json::Error,
    excerpt: String,
  },
  #[error("no valid questions generated")]
  NoValidQuestions,
  #[error("question {0} is not part of this quiz")]
  UnknownQuestion(Uuid),
  #[error(transparent)]
  Repository(#[from] RepositoryError),
}

/// Which step of a generation call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStep {
  TopicAnalysis,
  ChapterNaming,
  LessonBatch { first: usize, last: usize },
  PersistChapter,
  ReloadChapter,
  QuizGeneration,
  PersistQuiz,
  MemeGeneration,
}

impl fmt::Display for GenerationStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GenerationStep::TopicAnalysis => write!(f, "topic analysis"),
      GenerationStep::ChapterNaming => write!(f, "chapter naming"),
      GenerationStep::LessonBatch { first, last } => write!(f, "lessons {}-{}", first, last),
      GenerationStep::PersistChapter => write!(f, "persist chapter"),
      GenerationStep::ReloadChapter => write!(f, "reload chapter"),
      GenerationStep::QuizGeneration => write!(f, "quiz generation"),
      GenerationStep::PersistQuiz => write!(f, "persist quiz"),
      GenerationStep::MemeGeneration => write!(f, "meme generation"),
    }
  }
}

/// Errors that abort a whole generation request.
#[derive(Error, Debug)]
pub enum GenerationError {
  #[error("invalid request: {0}")]
  InvalidRequest(String),
  #[error("{step} failed: {source}")]
  Backend {
    step: GenerationStep,
    #[source]
    source: ProviderError,
  },
  #[error("failed to parse {step}: {source} (response: {excerpt})")]
  Parse {
    step: GenerationStep,
    #[source]
    source: serde_json::Error,
    excerpt: String,
  },
  #[error("lesson generation produced no lessons")]
  EmptyPlan,
  #[error("{step} failed: {source}")]
  Repository {
    step: GenerationStep,
    #[source]
    source: RepositoryError,
  },
  #[error(transparent)]
  Quiz(#[from] QuizError),
  #[error("{0}")]
  Unavailable(String),
  #[error("generation did not finish within {0:?}")]
  DeadlineExceeded(Duration),
}
