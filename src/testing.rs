//! Scripted backends and canned responses shared by unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::config::SamplingParams;
use crate::domain::{
  Chapter, Lesson, LessonMedia, Question, Quiz, User, UserQuestionResponse, UserQuizAttempt,
};
use crate::error::{ProviderError, RepositoryError};
use crate::providers::{ImageGenerator, ObjectStore, TextGenerator};
use crate::repository::{ContentRepository, InMemoryRepository};

#[derive(Debug, Clone)]
enum Reply {
  Text(String),
  Fail,
}

#[derive(Debug, Default)]
struct ScriptState {
  rules: Vec<(String, VecDeque<Reply>)>,
  prompts: Vec<String>,
}

/// Text backend answering by prompt substring. Queued replies are consumed in
/// order and the last one repeats. Prompts with no matching rule fail.
#[derive(Debug, Clone, Default)]
pub struct ScriptedText {
  state: Arc<Mutex<ScriptState>>,
  delay: Option<Duration>,
}

impl ScriptedText {
  pub fn new() -> Self {
    Self::default()
  }

  fn push(self, key: &str, reply: Reply) -> Self {
    {
      let mut st = self.state.lock().unwrap();
      match st.rules.iter_mut().find(|(k, _)| k == key) {
        Some((_, queue)) => queue.push_back(reply),
        None => st.rules.push((key.to_string(), VecDeque::from([reply]))),
      }
    }
    self
  }

  pub fn on(self, key: &str, response: &str) -> Self {
    self.push(key, Reply::Text(response.to_string()))
  }

  pub fn fail_on(self, key: &str) -> Self {
    self.push(key, Reply::Fail)
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn prompts(&self) -> Vec<String> {
    self.state.lock().unwrap().prompts.clone()
  }

  pub fn calls_matching(&self, needle: &str) -> usize {
    self.prompts().iter().filter(|p| p.contains(needle)).count()
  }
}

#[async_trait]
impl TextGenerator for ScriptedText {
  async fn generate(&self, prompt: &str, _params: &SamplingParams) -> Result<String, ProviderError> {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    let reply = {
      let mut st = self.state.lock().unwrap();
      st.prompts.push(prompt.to_string());
      st.rules.iter_mut().find(|(k, _)| prompt.contains(k.as_str())).and_then(|(_, queue)| {
        if queue.len() > 1 {
          queue.pop_front()
        } else {
          queue.front().cloned()
        }
      })
    };
    match reply {
      Some(Reply::Text(t)) => Ok(t),
      Some(Reply::Fail) => Err(ProviderError::Api { backend: "scripted", status: 500, message: "scripted failure".into() }),
      None => Err(ProviderError::Empty("scripted")),
    }
  }
}

#[derive(Debug, Default)]
struct ImageStats {
  calls: AtomicUsize,
  in_flight: AtomicUsize,
  peak: AtomicUsize,
  prompts: Mutex<Vec<String>>,
}

/// Image backend that records concurrency. The first `fail_first` calls fail,
/// as do the calls numbered in `fail_calls` (0-based, in arrival order).
#[derive(Debug, Clone, Default)]
pub struct FakeImages {
  stats: Arc<ImageStats>,
  fail_first: usize,
  fail_calls: HashSet<usize>,
  delay: Duration,
}

impl FakeImages {
  pub fn ok() -> Self {
    Self::default()
  }

  pub fn failing() -> Self {
    Self { fail_first: usize::MAX, ..Self::default() }
  }

  pub fn fail_first(n: usize) -> Self {
    Self { fail_first: n, ..Self::default() }
  }

  pub fn fail_calls(calls: &[usize]) -> Self {
    Self { fail_calls: calls.iter().copied().collect(), ..Self::default() }
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn calls(&self) -> usize {
    self.stats.calls.load(Ordering::SeqCst)
  }

  pub fn peak_in_flight(&self) -> usize {
    self.stats.peak.load(Ordering::SeqCst)
  }

  pub fn prompts(&self) -> Vec<String> {
    self.stats.prompts.lock().unwrap().clone()
  }
}

#[async_trait]
impl ImageGenerator for FakeImages {
  async fn generate_images(&self, prompt: &str, count: u8) -> Result<Vec<String>, ProviderError> {
    let n = self.stats.calls.fetch_add(1, Ordering::SeqCst);
    self.stats.prompts.lock().unwrap().push(prompt.to_string());
    let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.stats.peak.fetch_max(now, Ordering::SeqCst);
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);

    if n < self.fail_first || self.fail_calls.contains(&n) {
      return Err(ProviderError::Api { backend: "fake images", status: 429, message: "rate limited".into() });
    }
    Ok((0..count.max(1)).map(|i| format!("https://img.test/{}-{}.png", n, i)).collect())
  }
}

/// Object store returning `https://cdn.test/{name_hint}`, or always failing.
#[derive(Debug, Clone, Default)]
pub struct FakeStore {
  fail: bool,
}

impl FakeStore {
  pub fn ok() -> Self {
    Self { fail: false }
  }

  pub fn failing() -> Self {
    Self { fail: true }
  }
}

#[async_trait]
impl ObjectStore for FakeStore {
  async fn publish(&self, _source_url: &str, name_hint: &str) -> Result<String, ProviderError> {
    if self.fail {
      return Err(ProviderError::Api { backend: "fake store", status: 503, message: "down".into() });
    }
    Ok(format!("https://cdn.test/{}", name_hint))
  }
}

/// In-memory repository that fails `create_lesson` for chosen lesson orders
/// and can fail chapter inserts outright.
#[derive(Debug, Clone, Default)]
pub struct FlakyRepo {
  pub inner: InMemoryRepository,
  fail_lesson_orders: HashSet<u32>,
  fail_quizzes: bool,
  pub chapter_inserts: Arc<AtomicUsize>,
}

impl FlakyRepo {
  pub fn new(inner: InMemoryRepository) -> Self {
    Self { inner, ..Self::default() }
  }

  pub fn failing_lessons(mut self, orders: &[u32]) -> Self {
    self.fail_lesson_orders = orders.iter().copied().collect();
    self
  }

  pub fn failing_quizzes(mut self) -> Self {
    self.fail_quizzes = true;
    self
  }
}

#[async_trait]
impl ContentRepository for FlakyRepo {
  async fn register_user(&self, user: User) -> Result<User, RepositoryError> {
    self.inner.register_user(user).await
  }
  async fn create_chapter(&self, chapter: Chapter) -> Result<Chapter, RepositoryError> {
    self.chapter_inserts.fetch_add(1, Ordering::SeqCst);
    self.inner.create_chapter(chapter).await
  }
  async fn create_lesson(&self, lesson: Lesson) -> Result<Lesson, RepositoryError> {
    if self.fail_lesson_orders.contains(&lesson.order) {
      return Err(RepositoryError::Backend(format!("insert failed for lesson {}", lesson.order)));
    }
    self.inner.create_lesson(lesson).await
  }
  async fn create_lesson_media(&self, media: LessonMedia) -> Result<LessonMedia, RepositoryError> {
    self.inner.create_lesson_media(media).await
  }
  async fn create_quiz(&self, quiz: Quiz) -> Result<Quiz, RepositoryError> {
    if self.fail_quizzes {
      return Err(RepositoryError::Backend("quiz insert failed".into()));
    }
    self.inner.create_quiz(quiz).await
  }
  async fn create_question(&self, question: Question) -> Result<Question, RepositoryError> {
    self.inner.create_question(question).await
  }
  async fn get_chapter_by_id(&self, id: Uuid) -> Result<Chapter, RepositoryError> {
    self.inner.get_chapter_by_id(id).await
  }
  async fn get_chapters_by_subject(&self, subject: &str, grade: Option<u8>) -> Result<Vec<Chapter>, RepositoryError> {
    self.inner.get_chapters_by_subject(subject, grade).await
  }
  async fn get_quiz_by_id(&self, id: Uuid) -> Result<Quiz, RepositoryError> {
    self.inner.get_quiz_by_id(id).await
  }
  async fn get_questions_by_quiz_id(&self, quiz_id: Uuid) -> Result<Vec<Question>, RepositoryError> {
    self.inner.get_questions_by_quiz_id(quiz_id).await
  }
  async fn create_quiz_attempt(&self, attempt: UserQuizAttempt) -> Result<UserQuizAttempt, RepositoryError> {
    self.inner.create_quiz_attempt(attempt).await
  }
  async fn create_question_response(
    &self,
    response: UserQuestionResponse,
  ) -> Result<UserQuestionResponse, RepositoryError> {
    self.inner.create_question_response(response).await
  }
}

pub fn analysis_json(count: i64) -> String {
  json!({
    "recommended_lessons": count,
    "complexity_level": "basic",
    "key_concepts": ["chlorophyll", "sunlight", "glucose", "oxygen"],
    "prerequisites": ["cells", "energy"],
    "learning_outcomes": ["explain photosynthesis", "name its inputs"]
  })
  .to_string()
}

pub fn naming_json(title: &str) -> String {
  json!({ "title": title, "description": "How plants make food from light." }).to_string()
}

/// A lesson batch with lessons `first..=last`, each titled `Lesson {n}`.
pub fn batch_json(first: u32, last: u32) -> String {
  let lessons: Vec<_> = (first..=last)
    .map(|n| {
      json!({
        "title": format!("Lesson {}", n),
        "description": format!("All about part {}. More details follow.", n),
        "content": {
          "introduction": format!("Introduction to part {}.", n),
          "core_concepts": [{
            "title": "Chlorophyll",
            "explanation": "A green pigment that absorbs light.",
            "real_world_example": "Leaves are green.",
            "key_points": ["absorbs red and blue light"]
          }],
          "summary": "Plants turn light into sugar.",
          "assessment": "Why are leaves green?"
        },
        "order": n,
        "difficulty": "basic",
        "duration_minutes": 30,
        "image_prompts": [format!("A diagram of part {}", n), "An extra prompt"],
        "learning_objectives": [format!("Objective {}a", n), format!("Objective {}b", n), "Objective c"]
      })
    })
    .collect();
  json!({ "lessons": lessons }).to_string()
}

/// A well-formed quiz with 5 easy, 3 medium and 2 hard questions and wrong points.
pub fn quiz_json() -> String {
  let mut questions = Vec::new();
  for (difficulty, n) in [("easy", 5), ("medium", 3), ("hard", 2)] {
    for i in 0..n {
      questions.push(json!({
        "text": format!("{} question {}", difficulty, i),
        "question_type": "multiple_choice",
        "options": ["Chlorophyll", "Keratin", "Melanin", "Hemoglobin"],
        "answer": "Chlorophyll",
        "explanation": "Chlorophyll absorbs light.",
        "points": 1,
        "difficulty": difficulty
      }));
    }
  }
  json!({
    "quiz": { "title": "Light Quiz", "description": "Check your understanding", "time_limit": 450 },
    "questions": questions
  })
  .to_string()
}
