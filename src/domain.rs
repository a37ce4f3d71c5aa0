//! Domain models: chapters, lessons, media, quizzes, questions and attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct User {
  pub id: UserId,
  pub name: String,
}

/// Top-level content unit: ordered lessons for one subject/grade.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Chapter {
  pub id: Uuid,
  pub title: String,
  pub description: String,
  pub subject: String,
  pub grade: u8,
  pub order: i32,
  pub is_custom: bool,
  pub created_by: UserId,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  /// Filled on reads; ordered by `Lesson::order`.
  #[serde(default)]
  pub lessons: Vec<Lesson>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Lesson {
  pub id: Uuid,
  pub chapter_id: Uuid,
  pub title: String,
  pub description: String,
  pub content: String,
  /// 1-based position within the chapter.
  pub order: u32,
  pub grade: u8,
  pub subject: String,
  pub is_custom: bool,
  pub created_by: UserId,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  /// Only meaningful during generation; never stored.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub image_prompts: Vec<String>,
  #[serde(default)]
  pub media: Vec<LessonMedia>,
  #[serde(default)]
  pub quizzes: Vec<Quiz>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
  #[default]
  Image,
  Meme,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct LessonMedia {
  pub id: Uuid,
  pub lesson_id: Uuid,
  pub media_type: MediaType,
  pub url: String,
  pub description: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Quiz {
  pub id: Uuid,
  pub lesson_id: Uuid,
  pub title: String,
  pub description: String,
  pub time_limit_seconds: Option<u32>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
  #[default]
  MultipleChoice,
  TrueFalse,
  FillInTheBlank,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  #[default]
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  /// Points are a pure function of difficulty.
  pub fn points(&self) -> u32 {
    match self {
      Difficulty::Easy => 5,
      Difficulty::Medium => 10,
      Difficulty::Hard => 15,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Question {
  pub id: Uuid,
  pub quiz_id: Uuid,
  pub text: String,
  pub question_type: QuestionType,
  pub options: Vec<String>,
  /// Server-side truth; blanked before any client-facing read.
  pub answer: String,
  pub explanation: String,
  pub points: u32,
  pub difficulty: Difficulty,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuizWithQuestions {
  pub quiz: Quiz,
  pub questions: Vec<Question>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct UserQuizAttempt {
  pub id: Uuid,
  pub user_id: UserId,
  pub quiz_id: Uuid,
  /// Percentage 0-100.
  pub score: u32,
  pub time_spent_secs: u32,
  pub completed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct UserQuestionResponse {
  pub id: Uuid,
  pub attempt_id: Uuid,
  pub question_id: Uuid,
  pub user_answer: String,
  pub is_correct: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
  Basic,
  #[default]
  Intermediate,
  Advanced,
}

impl ComplexityLevel {
  /// Case-insensitive; empty or unrecognised values repair to `Intermediate`.
  pub fn parse_lenient(raw: &str) -> Self {
    match raw.trim().to_ascii_lowercase().as_str() {
      "basic" => ComplexityLevel::Basic,
      "advanced" => ComplexityLevel::Advanced,
      _ => ComplexityLevel::Intermediate,
    }
  }
}

/// Produced once per generation request; drives how many lessons follow.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TopicAnalysis {
  pub recommended_lesson_count: usize,
  pub complexity_level: ComplexityLevel,
  pub key_concepts: Vec<String>,
  pub prerequisites: Vec<String>,
  pub learning_outcomes: Vec<String>,
}
