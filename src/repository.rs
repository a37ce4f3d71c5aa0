//! Content repository: the persistence seam used by the orchestrator and the
//! HTTP layer, plus an in-memory implementation.
//!
//! Every operation is one round trip. There are no transactions spanning calls;
//! the orchestrator relies on that when it persists a chapter graph piece by piece.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::{
  Chapter, Lesson, LessonMedia, Question, Quiz, User, UserId, UserQuestionResponse, UserQuizAttempt,
};
use crate::error::RepositoryError;

/// Create operations assign ids and timestamps and return the stored entity.
#[async_trait]
pub trait ContentRepository: Send + Sync + Debug {
  async fn register_user(&self, user: User) -> Result<User, RepositoryError>;
  async fn create_chapter(&self, chapter: Chapter) -> Result<Chapter, RepositoryError>;
  async fn create_lesson(&self, lesson: Lesson) -> Result<Lesson, RepositoryError>;
  async fn create_lesson_media(&self, media: LessonMedia) -> Result<LessonMedia, RepositoryError>;
  async fn create_quiz(&self, quiz: Quiz) -> Result<Quiz, RepositoryError>;
  async fn create_question(&self, question: Question) -> Result<Question, RepositoryError>;
  /// Chapter with its lessons (by order), each with media and quizzes.
  async fn get_chapter_by_id(&self, id: Uuid) -> Result<Chapter, RepositoryError>;
  async fn get_chapters_by_subject(
    &self,
    subject: &str,
    grade: Option<u8>,
  ) -> Result<Vec<Chapter>, RepositoryError>;
  async fn get_quiz_by_id(&self, id: Uuid) -> Result<Quiz, RepositoryError>;
  async fn get_questions_by_quiz_id(&self, quiz_id: Uuid) -> Result<Vec<Question>, RepositoryError>;
  async fn create_quiz_attempt(
    &self,
    attempt: UserQuizAttempt,
  ) -> Result<UserQuizAttempt, RepositoryError>;
  async fn create_question_response(
    &self,
    response: UserQuestionResponse,
  ) -> Result<UserQuestionResponse, RepositoryError>;
}

#[derive(Debug, Default)]
struct Tables {
  users: HashMap<UserId, User>,
  chapters: HashMap<Uuid, Chapter>,
  lessons: HashMap<Uuid, Lesson>,
  // insertion order is kept for media and questions
  media: Vec<LessonMedia>,
  quizzes: HashMap<Uuid, Quiz>,
  questions: Vec<Question>,
  attempts: HashMap<Uuid, UserQuizAttempt>,
  responses: HashMap<Uuid, UserQuestionResponse>,
}

/// Process-local store. Cloning shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
  tables: Arc<RwLock<Tables>>,
}

impl InMemoryRepository {
  pub fn new() -> Self {
    Self::default()
  }

  fn assemble_chapter(tables: &Tables, chapter: &Chapter) -> Chapter {
    let mut lessons: Vec<Lesson> = tables
      .lessons
      .values()
      .filter(|l| l.chapter_id == chapter.id)
      .cloned()
      .collect();
    lessons.sort_by_key(|l| l.order);
    for lesson in &mut lessons {
      let media: Vec<LessonMedia> =
        tables.media.iter().filter(|m| m.lesson_id == lesson.id).cloned().collect();
      let mut quizzes: Vec<Quiz> =
        tables.quizzes.values().filter(|q| q.lesson_id == lesson.id).cloned().collect();
      quizzes.sort_by_key(|q| q.created_at);
      lesson.media = media;
      lesson.quizzes = quizzes;
    }
    Chapter { lessons, ..chapter.clone() }
  }
}

#[async_trait]
impl ContentRepository for InMemoryRepository {
  #[instrument(level = "debug", target = "repository", skip(self, user), fields(user_id = %user.id))]
  async fn register_user(&self, user: User) -> Result<User, RepositoryError> {
    let mut t = self.tables.write().await;
    t.users.insert(user.id, user.clone());
    Ok(user)
  }

  #[instrument(level = "debug", target = "repository", skip(self, chapter), fields(title = %chapter.title))]
  async fn create_chapter(&self, mut chapter: Chapter) -> Result<Chapter, RepositoryError> {
    let mut t = self.tables.write().await;
    if !t.users.contains_key(&chapter.created_by) {
      return Err(RepositoryError::UnknownUser(chapter.created_by));
    }
    let now = Utc::now();
    chapter.id = Uuid::new_v4();
    chapter.created_at = now;
    chapter.updated_at = now;
    chapter.lessons.clear();
    t.chapters.insert(chapter.id, chapter.clone());
    debug!(target: "repository", chapter_id = %chapter.id, "Chapter stored");
    Ok(chapter)
  }

  #[instrument(level = "debug", target = "repository", skip(self, lesson), fields(order = lesson.order))]
  async fn create_lesson(&self, mut lesson: Lesson) -> Result<Lesson, RepositoryError> {
    let mut t = self.tables.write().await;
    if !t.chapters.contains_key(&lesson.chapter_id) {
      return Err(RepositoryError::NotFound { entity: "chapter", id: lesson.chapter_id });
    }
    let now = Utc::now();
    lesson.id = Uuid::new_v4();
    lesson.created_at = now;
    lesson.updated_at = now;
    lesson.image_prompts.clear();
    lesson.media.clear();
    lesson.quizzes.clear();
    t.lessons.insert(lesson.id, lesson.clone());
    Ok(lesson)
  }

  #[instrument(level = "debug", target = "repository", skip(self, media), fields(lesson_id = %media.lesson_id))]
  async fn create_lesson_media(&self, mut media: LessonMedia) -> Result<LessonMedia, RepositoryError> {
    let mut t = self.tables.write().await;
    if !t.lessons.contains_key(&media.lesson_id) {
      return Err(RepositoryError::NotFound { entity: "lesson", id: media.lesson_id });
    }
    media.id = Uuid::new_v4();
    media.created_at = Utc::now();
    t.media.push(media.clone());
    Ok(media)
  }

  #[instrument(level = "debug", target = "repository", skip(self, quiz), fields(lesson_id = %quiz.lesson_id))]
  async fn create_quiz(&self, mut quiz: Quiz) -> Result<Quiz, RepositoryError> {
    let mut t = self.tables.write().await;
    if !t.lessons.contains_key(&quiz.lesson_id) {
      return Err(RepositoryError::NotFound { entity: "lesson", id: quiz.lesson_id });
    }
    let now = Utc::now();
    quiz.id = Uuid::new_v4();
    quiz.created_at = now;
    quiz.updated_at = now;
    t.quizzes.insert(quiz.id, quiz.clone());
    Ok(quiz)
  }

  #[instrument(level = "debug", target = "repository", skip(self, question), fields(quiz_id = %question.quiz_id))]
  async fn create_question(&self, mut question: Question) -> Result<Question, RepositoryError> {
    let mut t = self.tables.write().await;
    if !t.quizzes.contains_key(&question.quiz_id) {
      return Err(RepositoryError::NotFound { entity: "quiz", id: question.quiz_id });
    }
    let now = Utc::now();
    question.id = Uuid::new_v4();
    question.created_at = now;
    question.updated_at = now;
    t.questions.push(question.clone());
    Ok(question)
  }

  async fn get_chapter_by_id(&self, id: Uuid) -> Result<Chapter, RepositoryError> {
    let t = self.tables.read().await;
    let chapter = t
      .chapters
      .get(&id)
      .ok_or(RepositoryError::NotFound { entity: "chapter", id })?;
    Ok(Self::assemble_chapter(&t, chapter))
  }

  async fn get_chapters_by_subject(
    &self,
    subject: &str,
    grade: Option<u8>,
  ) -> Result<Vec<Chapter>, RepositoryError> {
    let t = self.tables.read().await;
    let mut chapters: Vec<Chapter> = t
      .chapters
      .values()
      .filter(|c| c.subject.eq_ignore_ascii_case(subject))
      .filter(|c| grade.map_or(true, |g| c.grade == g))
      .map(|c| Self::assemble_chapter(&t, c))
      .collect();
    chapters.sort_by(|a, b| a.order.cmp(&b.order).then(a.created_at.cmp(&b.created_at)));
    Ok(chapters)
  }

  async fn get_quiz_by_id(&self, id: Uuid) -> Result<Quiz, RepositoryError> {
    let t = self.tables.read().await;
    t.quizzes.get(&id).cloned().ok_or(RepositoryError::NotFound { entity: "quiz", id })
  }

  async fn get_questions_by_quiz_id(&self, quiz_id: Uuid) -> Result<Vec<Question>, RepositoryError> {
    let t = self.tables.read().await;
    Ok(t.questions.iter().filter(|q| q.quiz_id == quiz_id).cloned().collect())
  }

  #[instrument(level = "debug", target = "repository", skip(self, attempt), fields(quiz_id = %attempt.quiz_id))]
  async fn create_quiz_attempt(
    &self,
    mut attempt: UserQuizAttempt,
  ) -> Result<UserQuizAttempt, RepositoryError> {
    let mut t = self.tables.write().await;
    if !t.users.contains_key(&attempt.user_id) {
      return Err(RepositoryError::UnknownUser(attempt.user_id));
    }
    if !t.quizzes.contains_key(&attempt.quiz_id) {
      return Err(RepositoryError::NotFound { entity: "quiz", id: attempt.quiz_id });
    }
    attempt.id = Uuid::new_v4();
    attempt.completed_at = Utc::now();
    t.attempts.insert(attempt.id, attempt.clone());
    Ok(attempt)
  }

  async fn create_question_response(
    &self,
    mut response: UserQuestionResponse,
  ) -> Result<UserQuestionResponse, RepositoryError> {
    let mut t = self.tables.write().await;
    if !t.attempts.contains_key(&response.attempt_id) {
      return Err(RepositoryError::NotFound { entity: "quiz attempt", id: response.attempt_id });
    }
    response.id = Uuid::new_v4();
    t.responses.insert(response.id, response.clone());
    Ok(response)
  }
}
