//! Generation orchestrator: plans a chapter, persists it, then enriches every
//! lesson concurrently.
//!
//! Failure policy:
//! - planning failures (analysis, naming, any lesson batch) abort the request
//!   before anything is persisted;
//! - a lesson that cannot be persisted is reported and skipped, siblings continue;
//! - media and quiz failures are logged and reported per lesson, never raised.
//!
//! The returned chapter is always re-read from the repository.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::config::{GenerationSettings, Prompts};
use crate::domain::{
  Chapter, Lesson, LessonMedia, MediaType, Question, QuizWithQuestions, TopicAnalysis, UserId,
};
use crate::error::{GenerationError, GenerationStep, RepositoryError};
use crate::media::{MediaDraft, MediaService};
use crate::providers::{ImageGenerator, ObjectStore, TextGenerator};
use crate::quiz::{GeneratedQuiz, QuizGenerator};
use crate::rate_limit::ImageCallLimiter;
use crate::repository::ContentRepository;
use crate::sequencer::Sequencer;

/// Input to `generate_chapter`. Not persisted.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
  pub prompt: String,
  pub subject: String,
  pub grade: i64,
  pub requested_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuizOutcome {
  NotEligible,
  Created { quiz_id: Uuid, questions: usize },
  Failed { error: String },
}

/// What happened to one planned lesson.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LessonOutcome {
  Persisted {
    lesson_id: Uuid,
    order: u32,
    title: String,
    media: Vec<MediaType>,
    media_failures: usize,
    quiz: QuizOutcome,
  },
  NotPersisted {
    order: u32,
    title: String,
    error: String,
  },
}

impl LessonOutcome {
  pub fn order(&self) -> u32 {
    match self {
      LessonOutcome::Persisted { order, .. } | LessonOutcome::NotPersisted { order, .. } => *order,
    }
  }

  /// Errors this lesson contributes to the request summary.
  fn error_count(&self) -> usize {
    match self {
      LessonOutcome::NotPersisted { .. } => 1,
      LessonOutcome::Persisted { media_failures, quiz, .. } => {
        media_failures + usize::from(matches!(quiz, QuizOutcome::Failed { .. }))
      }
    }
  }
}

#[derive(Debug, Clone)]
pub struct ChapterGeneration {
  pub chapter: Chapter,
  pub analysis: TopicAnalysis,
  /// Sorted by lesson order.
  pub lessons: Vec<LessonOutcome>,
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
  repo: Arc<dyn ContentRepository>,
  sequencer: Sequencer,
  quizzes: QuizGenerator,
  /// None when no image backend is configured.
  media: Option<MediaService>,
  settings: GenerationSettings,
}

impl Orchestrator {
  pub fn new(
    repo: Arc<dyn ContentRepository>,
    text: Arc<dyn TextGenerator>,
    images: Option<Arc<dyn ImageGenerator>>,
    store: Option<Arc<dyn ObjectStore>>,
    prompts: Prompts,
    settings: GenerationSettings,
  ) -> Self {
    let prompts = Arc::new(prompts);
    let sampling = settings.sampling();
    let media = images.map(|images| {
      MediaService::new(text.clone(), images, store, prompts.clone(), sampling)
    });
    Self {
      repo,
      sequencer: Sequencer::new(text.clone(), prompts.clone(), settings.clone()),
      quizzes: QuizGenerator::new(text, prompts, sampling),
      media,
      settings,
    }
  }

  pub fn images_enabled(&self) -> bool {
    self.media.is_some()
  }

  /// Generate, persist and enrich a whole chapter, bounded by the request timeout.
  pub async fn generate_chapter(&self, req: GenerationRequest) -> Result<ChapterGeneration, GenerationError> {
    let limit = self.settings.request_timeout();
    match tokio::time::timeout(limit, self.run_generation(req)).await {
      Ok(result) => result,
      Err(_) => {
        error!(target: "generation", timeout = ?limit, "Chapter generation exceeded its deadline");
        Err(GenerationError::DeadlineExceeded(limit))
      }
    }
  }

  #[instrument(level = "info", target = "generation", skip(self, req), fields(prompt = %req.prompt, subject = %req.subject, grade = req.grade))]
  async fn run_generation(&self, req: GenerationRequest) -> Result<ChapterGeneration, GenerationError> {
    let grade = validate_request(&req)?;
    let plan = self.sequencer.plan_chapter(req.prompt.trim(), req.subject.trim(), grade).await?;

    let chapter = self
      .repo
      .create_chapter(Chapter {
        title: plan.title.clone(),
        description: plan.description.clone(),
        subject: req.subject.trim().to_string(),
        grade,
        order: 0,
        is_custom: true,
        created_by: req.requested_by,
        ..Default::default()
      })
      .await
      .map_err(|source| GenerationError::Repository { step: GenerationStep::PersistChapter, source })?;
    info!(target: "generation", chapter_id = %chapter.id, lessons = plan.lessons.len(), "Chapter persisted; enriching lessons");

    let worker = LessonWorker {
      repo: self.repo.clone(),
      media: self.media.clone(),
      quizzes: self.quizzes.clone(),
      limiter: ImageCallLimiter::new(
        self.settings.max_concurrent_image_calls,
        self.settings.max_images_per_request,
      ),
      quiz_every: self.settings.quiz_every_nth_lesson,
    };

    // Dropping the set aborts every lesson task still running.
    let mut tasks = JoinSet::new();
    for mut lesson in plan.lessons {
      lesson.chapter_id = chapter.id;
      lesson.created_by = req.requested_by;
      let span = info_span!(target: "generation", "lesson", lesson_order = lesson.order, lesson_title = %lesson.title);
      tasks.spawn(worker.clone().run(lesson).instrument(span));
    }

    let mut outcomes = Vec::new();
    let mut errors = 0;
    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok(outcome) => {
          errors += outcome.error_count();
          outcomes.push(outcome);
        }
        Err(e) => {
          error!(target: "generation", error = %e, "Lesson task did not complete");
          errors += 1;
        }
      }
    }
    outcomes.sort_by_key(LessonOutcome::order);
    if errors > 0 {
      warn!(target: "generation", chapter_id = %chapter.id, "{} errors while processing lessons", errors);
    }

    let chapter = self
      .repo
      .get_chapter_by_id(chapter.id)
      .await
      .map_err(|source| GenerationError::Repository { step: GenerationStep::ReloadChapter, source })?;
    info!(
      target: "generation",
      chapter_id = %chapter.id,
      lessons = chapter.lessons.len(),
      images = worker.limiter.images_generated(),
      "Chapter generation finished"
    );
    Ok(ChapterGeneration { chapter, analysis: plan.analysis, lessons: outcomes })
  }

  /// One meme for an existing chapter, attached to `lesson_id` or the first lesson.
  #[instrument(level = "info", target = "generation", skip(self))]
  pub async fn generate_memes_for_chapter(
    &self,
    chapter_id: Uuid,
    topic: &str,
    lesson_id: Option<Uuid>,
  ) -> Result<Vec<LessonMedia>, GenerationError> {
    let step = GenerationStep::MemeGeneration;
    let Some(media) = &self.media else {
      return Err(GenerationError::Unavailable("image generation is not configured".into()));
    };
    let topic = topic.trim();
    if topic.is_empty() {
      return Err(GenerationError::InvalidRequest("topic must not be empty".into()));
    }
    let chapter = self
      .repo
      .get_chapter_by_id(chapter_id)
      .await
      .map_err(|source| GenerationError::Repository { step, source })?;
    let lesson = target_lesson(&chapter, lesson_id)?;

    let limiter = ImageCallLimiter::new(
      self.settings.max_concurrent_image_calls,
      self.settings.max_images_per_request,
    );
    let draft = media
      .generate_meme(topic, &limiter)
      .await
      .map_err(|source| GenerationError::Backend { step, source })?
      .ok_or_else(|| GenerationError::Unavailable("image budget exhausted".into()))?;
    let stored = self
      .repo
      .create_lesson_media(draft.into_media(lesson.id))
      .await
      .map_err(|source| GenerationError::Repository { step, source })?;
    Ok(vec![stored])
  }

  /// Quiz from the chapter description, attached to the chapter's first lesson.
  #[instrument(level = "info", target = "generation", skip(self))]
  pub async fn generate_quiz_for_chapter(&self, chapter_id: Uuid) -> Result<QuizWithQuestions, GenerationError> {
    let chapter = self
      .repo
      .get_chapter_by_id(chapter_id)
      .await
      .map_err(|source| GenerationError::Repository { step: GenerationStep::QuizGeneration, source })?;
    let lesson = target_lesson(&chapter, None)?;

    let generated = self.quizzes.generate(&chapter.description).await?;
    persist_quiz(self.repo.as_ref(), lesson.id, generated)
      .await
      .map_err(|source| GenerationError::Repository { step: GenerationStep::PersistQuiz, source })
  }
}

fn validate_request(req: &GenerationRequest) -> Result<u8, GenerationError> {
  if req.prompt.trim().is_empty() {
    return Err(GenerationError::InvalidRequest("prompt must not be empty".into()));
  }
  if req.subject.trim().is_empty() {
    return Err(GenerationError::InvalidRequest("subject must not be empty".into()));
  }
  match u8::try_from(req.grade) {
    Ok(g) if (1..=12).contains(&g) => Ok(g),
    _ => Err(GenerationError::InvalidRequest(format!("grade must be between 1 and 12, got {}", req.grade))),
  }
}

fn target_lesson(chapter: &Chapter, lesson_id: Option<Uuid>) -> Result<&Lesson, GenerationError> {
  match lesson_id {
    Some(id) => chapter
      .lessons
      .iter()
      .find(|l| l.id == id)
      .ok_or_else(|| GenerationError::InvalidRequest(format!("lesson {} is not part of chapter {}", id, chapter.id))),
    None => chapter
      .lessons
      .first()
      .ok_or_else(|| GenerationError::InvalidRequest(format!("chapter {} has no lessons", chapter.id))),
  }
}

/// Persist the quiz, then its questions one by one. Question inserts that
/// fail are logged and skipped.
async fn persist_quiz(
  repo: &dyn ContentRepository,
  lesson_id: Uuid,
  generated: GeneratedQuiz,
) -> Result<QuizWithQuestions, RepositoryError> {
  let quiz = repo.create_quiz(crate::domain::Quiz { lesson_id, ..generated.quiz }).await?;
  let mut questions = Vec::with_capacity(generated.questions.len());
  for q in generated.questions {
    match repo.create_question(Question { quiz_id: quiz.id, ..q }).await {
      Ok(stored) => questions.push(stored),
      Err(e) => error!(target: "generation", quiz_id = %quiz.id, error = %e, "Failed to create question"),
    }
  }
  Ok(QuizWithQuestions { quiz, questions })
}

/// Per-lesson enrichment. Clones share the repository, backends and limiter.
#[derive(Debug, Clone)]
struct LessonWorker {
  repo: Arc<dyn ContentRepository>,
  media: Option<MediaService>,
  quizzes: QuizGenerator,
  limiter: ImageCallLimiter,
  quiz_every: u32,
}

impl LessonWorker {
  async fn run(self, lesson: Lesson) -> LessonOutcome {
    let order = lesson.order;
    let title = lesson.title.clone();
    let image_prompt = lesson.image_prompts.first().cloned();

    let stored = match self.repo.create_lesson(lesson).await {
      Ok(l) => l,
      Err(e) => {
        error!(target: "generation", error = %e, "Failed to create lesson");
        return LessonOutcome::NotPersisted { order, title, error: e.to_string() };
      }
    };

    let mut media = Vec::new();
    let mut media_failures = 0;
    if let Some(svc) = &self.media {
      let meme = svc.generate_meme(&title, &self.limiter).await;
      self.record_media(stored.id, "meme", meme, &mut media, &mut media_failures).await;

      if let Some(prompt) = &image_prompt {
        let illustration = svc.generate_illustration(prompt, &self.limiter).await;
        self.record_media(stored.id, "illustration", illustration, &mut media, &mut media_failures).await;
      }
    }

    let quiz = if self.quiz_every > 0 && order % self.quiz_every == 0 {
      self.quiz_for(&stored).await
    } else {
      QuizOutcome::NotEligible
    };

    LessonOutcome::Persisted { lesson_id: stored.id, order, title, media, media_failures, quiz }
  }

  async fn record_media(
    &self,
    lesson_id: Uuid,
    kind: &'static str,
    result: Result<Option<MediaDraft>, crate::error::ProviderError>,
    media: &mut Vec<MediaType>,
    failures: &mut usize,
  ) {
    match result {
      Ok(Some(draft)) => {
        let media_type = draft.media_type;
        match self.repo.create_lesson_media(draft.into_media(lesson_id)).await {
          Ok(_) => media.push(media_type),
          Err(e) => {
            warn!(target: "generation", kind, error = %e, "Failed to save lesson media");
            *failures += 1;
          }
        }
      }
      Ok(None) => debug!(target: "generation", kind, "Image budget exhausted; skipping"),
      Err(e) => {
        warn!(target: "generation", kind, error = %e, "Skipping media for lesson");
        *failures += 1;
      }
    }
  }

  async fn quiz_for(&self, lesson: &Lesson) -> QuizOutcome {
    let generated = match self.quizzes.generate(&lesson.content).await {
      Ok(q) => q,
      Err(e) => {
        error!(target: "generation", error = %e, "Failed to generate quiz for lesson");
        return QuizOutcome::Failed { error: e.to_string() };
      }
    };
    match persist_quiz(self.repo.as_ref(), lesson.id, generated).await {
      Ok(saved) => QuizOutcome::Created { quiz_id: saved.quiz.id, questions: saved.questions.len() },
      Err(e) => {
        error!(target: "generation", error = %e, "Failed to create quiz");
        QuizOutcome::Failed { error: e.to_string() }
      }
    }
  }
}
