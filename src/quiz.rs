//! Quiz generation from lesson text, answer stripping, and attempt scoring.
//!
//! The backend is asked for 10 questions (5 easy, 3 medium, 2 hard). Its answer
//! is normalised locally:
//! - points are derived from difficulty, never taken from the response;
//! - the time limit is kept only inside [300, 900] seconds, otherwise 600;
//! - multiple choice and fill-in-the-blank need exactly four options;
//! - true/false options are always `["True", "False"]`.
//!
//! Questions that fail validation are dropped. Zero survivors is an error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cleaning::clean_json_response;
use crate::config::{Prompts, SamplingParams};
use crate::domain::{
  Difficulty, Question, QuestionType, Quiz, QuizWithQuestions, UserId, UserQuestionResponse, UserQuizAttempt,
};
use crate::error::QuizError;
use crate::providers::TextGenerator;
use crate::repository::ContentRepository;
use crate::util::{fill_template, trunc_for_log};

pub const DEFAULT_TIME_LIMIT_SECS: u32 = 600;
const TIME_LIMIT_RANGE: std::ops::RangeInclusive<i64> = 300..=900;

/// Quiz and questions ready to persist. Ids are assigned by the repository.
#[derive(Debug, Clone)]
pub struct GeneratedQuiz {
  pub quiz: Quiz,
  pub questions: Vec<Question>,
}

#[derive(Debug, Clone)]
pub struct QuizGenerator {
  text: Arc<dyn TextGenerator>,
  prompts: Arc<Prompts>,
  sampling: SamplingParams,
}

impl QuizGenerator {
  pub fn new(text: Arc<dyn TextGenerator>, prompts: Arc<Prompts>, sampling: SamplingParams) -> Self {
    Self { text, prompts, sampling }
  }

  #[instrument(level = "info", target = "quiz", skip(self, content), fields(content_len = content.len()))]
  pub async fn generate(&self, content: &str) -> Result<GeneratedQuiz, QuizError> {
    let prompt = fill_template(&self.prompts.quiz, &[("content", content)]);
    let raw = self.text.generate(&prompt, &self.sampling).await?;
    let quiz = parse_quiz(&raw)?;
    info!(target: "quiz", questions = quiz.questions.len(), "Quiz generated");
    Ok(quiz)
  }
}

#[derive(Deserialize)]
struct RawQuizEnvelope {
  #[serde(default)]
  quiz: RawQuizMeta,
  #[serde(default)]
  questions: Vec<serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct RawQuizMeta {
  #[serde(default)]
  title: String,
  #[serde(default)]
  description: String,
  #[serde(default)]
  time_limit: Option<i64>,
}

#[derive(Deserialize)]
struct RawQuestion {
  #[serde(default)]
  text: String,
  #[serde(default)]
  question_type: String,
  #[serde(default)]
  options: Vec<String>,
  #[serde(default)]
  answer: String,
  #[serde(default)]
  explanation: String,
  #[serde(default)]
  difficulty: String,
}

fn parse_question_type(raw: &str) -> Option<QuestionType> {
  let key: String = raw
    .trim()
    .to_ascii_lowercase()
    .chars()
    .map(|c| if c == ' ' || c == '-' || c == '/' { '_' } else { c })
    .collect();
  match key.as_str() {
    "multiple_choice" => Some(QuestionType::MultipleChoice),
    "true_false" => Some(QuestionType::TrueFalse),
    "fill_in_the_blank" | "fill_in_the_blanks" => Some(QuestionType::FillInTheBlank),
    _ => None,
  }
}

fn parse_difficulty(raw: &str) -> Option<Difficulty> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "easy" => Some(Difficulty::Easy),
    "medium" => Some(Difficulty::Medium),
    "hard" => Some(Difficulty::Hard),
    _ => None,
  }
}

fn quota(difficulty: Difficulty) -> usize {
  match difficulty {
    Difficulty::Easy => 5,
    Difficulty::Medium => 3,
    Difficulty::Hard => 2,
  }
}

pub fn normalize_time_limit(raw: Option<i64>) -> u32 {
  match raw {
    Some(secs) if TIME_LIMIT_RANGE.contains(&secs) => secs as u32,
    _ => DEFAULT_TIME_LIMIT_SECS,
  }
}

/// Validate one question; `None` drops it.
fn validate_question(raw: RawQuestion) -> Option<Question> {
  let text = raw.text.trim().to_string();
  if text.is_empty() {
    return None;
  }
  let question_type = parse_question_type(&raw.question_type)?;
  let difficulty = parse_difficulty(&raw.difficulty)?;

  let (options, answer) = match question_type {
    QuestionType::TrueFalse => {
      let answer = match raw.answer.trim().to_ascii_lowercase().as_str() {
        "true" => "True",
        "false" => "False",
        _ => return None,
      };
      (vec!["True".to_string(), "False".to_string()], answer.to_string())
    }
    QuestionType::MultipleChoice | QuestionType::FillInTheBlank => {
      if raw.options.len() != 4 {
        return None;
      }
      let answer = raw.answer.trim().to_string();
      if answer.is_empty() {
        return None;
      }
      (raw.options.iter().map(|o| o.trim().to_string()).collect(), answer)
    }
  };

  let now = Utc::now();
  Some(Question {
    id: Uuid::nil(),
    quiz_id: Uuid::nil(),
    text,
    question_type,
    options,
    answer,
    explanation: raw.explanation.trim().to_string(),
    points: difficulty.points(),
    difficulty,
    created_at: now,
    updated_at: now,
  })
}

/// Parse a raw backend response into a normalised quiz.
pub fn parse_quiz(raw: &str) -> Result<GeneratedQuiz, QuizError> {
  let cleaned = clean_json_response(raw);
  let envelope: RawQuizEnvelope = serde_json::from_str(&cleaned).map_err(|source| {
    QuizError::Parse { source, excerpt: trunc_for_log(&cleaned, 200) }
  })?;

  let received = envelope.questions.len();
  let mut taken: HashMap<Difficulty, usize> = HashMap::new();
  let mut questions = Vec::new();
  for value in envelope.questions {
    let Ok(raw_q) = serde_json::from_value::<RawQuestion>(value) else {
      continue;
    };
    let Some(q) = validate_question(raw_q) else {
      continue;
    };
    let count = taken.entry(q.difficulty).or_default();
    if *count >= quota(q.difficulty) {
      continue;
    }
    *count += 1;
    questions.push(q);
  }

  if received != questions.len() {
    warn!(target: "quiz", received, kept = questions.len(), "Dropped invalid or surplus questions");
  }
  if questions.is_empty() {
    return Err(QuizError::NoValidQuestions);
  }

  let title = match envelope.quiz.title.trim() {
    "" => "Lesson Quiz".to_string(),
    t => t.to_string(),
  };
  let now = Utc::now();
  let quiz = Quiz {
    id: Uuid::nil(),
    lesson_id: Uuid::nil(),
    title,
    description: envelope.quiz.description.trim().to_string(),
    time_limit_seconds: Some(normalize_time_limit(envelope.quiz.time_limit)),
    created_at: now,
    updated_at: now,
  };
  Ok(GeneratedQuiz { quiz, questions })
}

/// Blank every answer before questions are sent to a client.
pub fn strip_answers(questions: &mut [Question]) {
  for q in questions {
    q.answer.clear();
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
  pub question_id: Uuid,
  pub answer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradedAnswer {
  pub question_id: Uuid,
  pub user_answer: String,
  pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizScore {
  /// Percentage of available points, 0-100.
  pub score: u32,
  pub earned_points: u32,
  pub total_points: u32,
  pub graded: Vec<GradedAnswer>,
}

fn answers_match(expected: &str, given: &str) -> bool {
  expected.trim().eq_ignore_ascii_case(given.trim())
}

/// Grade answers against the stored questions of one quiz.
/// Total points cover every question, answered or not.
pub fn score_answers(questions: &[Question], answers: &[SubmittedAnswer]) -> Result<QuizScore, QuizError> {
  let by_id: HashMap<Uuid, &Question> = questions.iter().map(|q| (q.id, q)).collect();
  let total_points: u32 = questions.iter().map(|q| q.points).sum();

  let mut earned_points = 0;
  let mut graded = Vec::with_capacity(answers.len());
  for a in answers {
    let q = by_id.get(&a.question_id).ok_or(QuizError::UnknownQuestion(a.question_id))?;
    let is_correct = answers_match(&q.answer, &a.answer);
    if is_correct {
      earned_points += q.points;
    }
    graded.push(GradedAnswer { question_id: a.question_id, user_answer: a.answer.clone(), is_correct });
  }

  let score = if total_points == 0 { 0 } else { earned_points * 100 / total_points };
  debug!(target: "quiz", score, earned_points, total_points, "Quiz scored");
  Ok(QuizScore { score, earned_points, total_points, graded })
}

/// Quiz with questions as served to clients: answers blanked.
pub async fn load_quiz_for_client(
  repo: &dyn ContentRepository,
  quiz_id: Uuid,
) -> Result<QuizWithQuestions, QuizError> {
  let quiz = repo.get_quiz_by_id(quiz_id).await?;
  let mut questions = repo.get_questions_by_quiz_id(quiz_id).await?;
  strip_answers(&mut questions);
  Ok(QuizWithQuestions { quiz, questions })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSubmission {
  pub user_id: UserId,
  pub quiz_id: Uuid,
  #[serde(default)]
  pub time_spent_secs: u32,
  pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Clone)]
pub struct QuizResult {
  pub attempt: UserQuizAttempt,
  pub score: QuizScore,
}

/// Grade a submission and persist the attempt with one response per answer.
/// Response inserts that fail are logged and skipped.
#[instrument(level = "info", target = "quiz", skip(repo, submission), fields(quiz_id = %submission.quiz_id, answers = submission.answers.len()))]
pub async fn submit_quiz(
  repo: &dyn ContentRepository,
  submission: QuizSubmission,
) -> Result<QuizResult, QuizError> {
  let questions = repo.get_questions_by_quiz_id(submission.quiz_id).await?;
  let score = score_answers(&questions, &submission.answers)?;

  let attempt = repo
    .create_quiz_attempt(UserQuizAttempt {
      user_id: submission.user_id,
      quiz_id: submission.quiz_id,
      score: score.score,
      time_spent_secs: submission.time_spent_secs,
      ..Default::default()
    })
    .await?;

  for graded in &score.graded {
    let response = UserQuestionResponse {
      id: Uuid::nil(),
      attempt_id: attempt.id,
      question_id: graded.question_id,
      user_answer: graded.user_answer.clone(),
      is_correct: graded.is_correct,
    };
    if let Err(e) = repo.create_question_response(response).await {
      warn!(target: "quiz", question_id = %graded.question_id, error = %e, "Failed to store question response");
    }
  }
  info!(target: "quiz", attempt_id = %attempt.id, score = score.score, "Quiz attempt recorded");
  Ok(QuizResult { attempt, score })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{quiz_json, ScriptedText};
  use serde_json::json;

  fn mc(difficulty: &str, points: u32) -> serde_json::Value {
    json!({
      "text": "Which pigment absorbs light?",
      "question_type": "multiple_choice",
      "options": ["Chlorophyll", "Keratin", "Melanin", "Hemoglobin"],
      "answer": "Chlorophyll",
      "explanation": "Chlorophyll is green.",
      "points": points,
      "difficulty": difficulty
    })
  }

  fn envelope(time_limit: serde_json::Value, questions: Vec<serde_json::Value>) -> String {
    json!({
      "quiz": { "title": "Light Quiz", "description": "Check yourself", "time_limit": time_limit },
      "questions": questions
    })
    .to_string()
  }

  #[test]
  fn points_are_rederived_and_distribution_holds() {
    let mut qs = Vec::new();
    qs.extend((0..5).map(|_| mc("easy", 99)));
    qs.extend((0..3).map(|_| mc("medium", 1)));
    qs.extend((0..2).map(|_| mc("hard", 0)));
    let quiz = parse_quiz(&envelope(json!(600), qs)).unwrap();

    let count = |d: Difficulty| quiz.questions.iter().filter(|q| q.difficulty == d).count();
    assert_eq!((count(Difficulty::Easy), count(Difficulty::Medium), count(Difficulty::Hard)), (5, 3, 2));
    for q in &quiz.questions {
      assert_eq!(q.points, q.difficulty.points());
    }
  }

  #[test]
  fn surplus_questions_beyond_quota_are_dropped() {
    let qs: Vec<_> = (0..8).map(|_| mc("easy", 5)).collect();
    let quiz = parse_quiz(&envelope(json!(600), qs)).unwrap();
    assert_eq!(quiz.questions.len(), 5);
  }

  #[test]
  fn time_limit_outside_range_becomes_600() {
    for raw in [json!(50), json!(5000), json!(null)] {
      let quiz = parse_quiz(&envelope(raw, vec![mc("easy", 5)])).unwrap();
      assert_eq!(quiz.quiz.time_limit_seconds, Some(600));
    }
    let quiz = parse_quiz(&envelope(json!(900), vec![mc("easy", 5)])).unwrap();
    assert_eq!(quiz.quiz.time_limit_seconds, Some(900));
  }

  #[test]
  fn true_false_options_are_forced() {
    let q = json!({
      "text": "Plants need light.",
      "question_type": "true/false",
      "options": ["Yes", "No", "Maybe"],
      "answer": "true",
      "difficulty": "easy"
    });
    let quiz = parse_quiz(&envelope(json!(600), vec![q])).unwrap();
    assert_eq!(quiz.questions[0].question_type, QuestionType::TrueFalse);
    assert_eq!(quiz.questions[0].options, vec!["True", "False"]);
    assert_eq!(quiz.questions[0].answer, "True");
  }

  #[test]
  fn invalid_questions_are_dropped_not_repaired() {
    let three_options = json!({
      "text": "Pick one", "question_type": "multiple_choice",
      "options": ["a", "b", "c"], "answer": "a", "difficulty": "easy"
    });
    let unknown_type = json!({
      "text": "Essay", "question_type": "essay", "options": [], "answer": "x", "difficulty": "easy"
    });
    let unknown_difficulty = json!({
      "text": "Pick", "question_type": "multiple_choice",
      "options": ["a", "b", "c", "d"], "answer": "a", "difficulty": "legendary"
    });
    let options_not_strings = json!({
      "text": "Pick", "question_type": "multiple_choice",
      "options": [1, 2, 3, 4], "answer": "1", "difficulty": "easy"
    });
    let quiz = parse_quiz(&envelope(
      json!(600),
      vec![three_options, unknown_type, unknown_difficulty, options_not_strings, mc("hard", 15)],
    ))
    .unwrap();
    assert_eq!(quiz.questions.len(), 1);
    assert_eq!(quiz.questions[0].difficulty, Difficulty::Hard);
  }

  #[test]
  fn zero_valid_questions_is_an_error() {
    let err = parse_quiz(&envelope(json!(600), vec![])).unwrap_err();
    assert!(matches!(err, QuizError::NoValidQuestions));
  }

  #[test]
  fn malformed_json_is_a_parse_error() {
    let err = parse_quiz("```json\n{\"quiz\": {\"title\": \n```").unwrap_err();
    assert!(matches!(err, QuizError::Parse { .. }));
  }

  #[tokio::test]
  async fn generator_fills_prompt_with_lesson_content() {
    let text = ScriptedText::new().on("quiz creator", &quiz_json());
    let generator = QuizGenerator::new(
      Arc::new(text.clone()),
      Arc::new(Prompts::default()),
      crate::config::GenerationSettings::default().sampling(),
    );
    let quiz = generator.generate("Chlorophyll absorbs light.").await.unwrap();
    assert_eq!(quiz.questions.len(), 10);
    assert!(text.prompts()[0].contains("Chlorophyll absorbs light."));
  }

  fn stored(points: u32, answer: &str) -> Question {
    Question { id: Uuid::new_v4(), points, answer: answer.into(), ..Default::default() }
  }

  #[test]
  fn scoring_is_points_weighted_percentage() {
    let questions = vec![stored(5, "True"), stored(10, "Chlorophyll"), stored(15, "Glucose")];
    let answers = vec![
      SubmittedAnswer { question_id: questions[0].id, answer: "true".into() },
      SubmittedAnswer { question_id: questions[1].id, answer: " chlorophyll ".into() },
      SubmittedAnswer { question_id: questions[2].id, answer: "Oxygen".into() },
    ];
    let score = score_answers(&questions, &answers).unwrap();
    assert_eq!(score.earned_points, 15);
    assert_eq!(score.total_points, 30);
    assert_eq!(score.score, 50);
    assert!(!score.graded[2].is_correct);
  }

  #[test]
  fn scoring_rejects_foreign_question() {
    let questions = vec![stored(5, "True")];
    let stray = Uuid::new_v4();
    let err = score_answers(&questions, &[SubmittedAnswer { question_id: stray, answer: "x".into() }])
      .unwrap_err();
    assert!(matches!(err, QuizError::UnknownQuestion(id) if id == stray));
  }

  #[test]
  fn strip_answers_blanks_every_answer() {
    let mut questions = vec![stored(5, "True"), stored(10, "B")];
    strip_answers(&mut questions);
    assert!(questions.iter().all(|q| q.answer.is_empty()));
  }

  async fn seeded_quiz() -> (crate::repository::InMemoryRepository, UserId, Quiz, Vec<Question>) {
    use crate::domain::{Chapter, Lesson, User};
    use crate::repository::InMemoryRepository;
    let repo = InMemoryRepository::new();
    let user = repo.register_user(User { id: Uuid::new_v4(), name: "ana".into() }).await.unwrap();
    let chapter = repo.create_chapter(Chapter { created_by: user.id, ..Default::default() }).await.unwrap();
    let lesson = repo.create_lesson(Lesson { chapter_id: chapter.id, order: 3, ..Default::default() }).await.unwrap();
    let generated = parse_quiz(&quiz_json()).unwrap();
    let quiz = repo.create_quiz(Quiz { lesson_id: lesson.id, ..generated.quiz }).await.unwrap();
    let mut stored = Vec::new();
    for q in generated.questions {
      stored.push(repo.create_question(Question { quiz_id: quiz.id, ..q }).await.unwrap());
    }
    (repo, user.id, quiz, stored)
  }

  #[tokio::test]
  async fn client_read_never_exposes_answers() {
    let (repo, _, quiz, _) = seeded_quiz().await;
    let served = load_quiz_for_client(&repo, quiz.id).await.unwrap();
    assert_eq!(served.questions.len(), 10);
    assert!(served.questions.iter().all(|q| q.answer.is_empty()));
  }

  #[tokio::test]
  async fn submission_is_scored_and_recorded() {
    let (repo, user, quiz, questions) = seeded_quiz().await;
    // Correct on every easy question: 5 * 5 of 85 points.
    let answers = questions
      .iter()
      .map(|q| SubmittedAnswer {
        question_id: q.id,
        answer: if q.difficulty == Difficulty::Easy { "Chlorophyll".into() } else { "Keratin".into() },
      })
      .collect();
    let result = submit_quiz(
      &repo,
      QuizSubmission { user_id: user, quiz_id: quiz.id, time_spent_secs: 120, answers },
    )
    .await
    .unwrap();
    assert_eq!(result.score.total_points, 85);
    assert_eq!(result.score.earned_points, 25);
    assert_eq!(result.attempt.score, 29);
    assert_eq!(result.attempt.time_spent_secs, 120);
  }
}
