//! Public request/response structs for the HTTP API (serde ready).
//! Request bodies and quiz results are camelCase on the wire. Responses that
//! embed domain entities (chapters, lessons, quizzes, generation outcomes) keep
//! those entities' snake_case field names.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Chapter, TopicAnalysis, UserId};
use crate::orchestrator::{ChapterGeneration, LessonOutcome};
use crate::quiz::QuizResult;

#[derive(Debug, Serialize)]
pub struct HealthOut {
  pub ok: bool,
  pub generation: bool,
  pub images: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterUserIn {
  #[serde(default)]
  pub id: Option<Uuid>,
  pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateChapterIn {
  pub prompt: String,
  pub subject: String,
  pub grade: i64,
  pub user_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct GenerateChapterOut {
  pub chapter: Chapter,
  pub analysis: TopicAnalysis,
  pub lessons: Vec<LessonOutcome>,
}

impl From<ChapterGeneration> for GenerateChapterOut {
  fn from(g: ChapterGeneration) -> Self {
    Self { chapter: g.chapter, analysis: g.analysis, lessons: g.lessons }
  }
}

#[derive(Debug, Deserialize)]
pub struct ChaptersQuery {
  pub subject: String,
  #[serde(default)]
  pub grade: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMemesIn {
  pub topic: String,
  #[serde(default)]
  pub lesson_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOut {
  pub question_id: Uuid,
  pub user_answer: String,
  pub is_correct: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultOut {
  pub attempt_id: Uuid,
  pub score: u32,
  pub earned_points: u32,
  pub total_points: u32,
  pub responses: Vec<ResponseOut>,
}

impl From<QuizResult> for QuizResultOut {
  fn from(r: QuizResult) -> Self {
    Self {
      attempt_id: r.attempt.id,
      score: r.score.score,
      earned_points: r.score.earned_points,
      total_points: r.score.total_points,
      responses: r
        .score
        .graded
        .into_iter()
        .map(|g| ResponseOut { question_id: g.question_id, user_answer: g.user_answer, is_correct: g.is_correct })
        .collect(),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
  pub error: String,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::orchestrator::QuizOutcome;

  #[test]
  fn quiz_result_is_camel_case_and_outcomes_keep_entity_names() {
    let result = QuizResultOut {
      attempt_id: Uuid::nil(),
      score: 50,
      earned_points: 5,
      total_points: 10,
      responses: vec![ResponseOut { question_id: Uuid::nil(), user_answer: "True".into(), is_correct: true }],
    };
    let v = serde_json::to_value(&result).unwrap();
    assert_eq!(v["earnedPoints"], 5);
    assert_eq!(v["responses"][0]["isCorrect"], true);

    let outcome = LessonOutcome::Persisted {
      lesson_id: Uuid::nil(),
      order: 3,
      title: "Lesson 3".into(),
      media: vec![],
      media_failures: 0,
      quiz: QuizOutcome::Created { quiz_id: Uuid::nil(), questions: 10 },
    };
    let v = serde_json::to_value(&outcome).unwrap();
    assert_eq!(v["status"], "persisted");
    assert_eq!(v["quiz"]["status"], "created");
    assert!(v["quiz"].get("quiz_id").is_some());
  }
}
