//! Text-generation sequencer: topic analysis, chapter naming, lesson batches.
//!
//! The three steps run strictly in order, each one a single backend call whose
//! prompt depends on the previous answer. Any backend or parse failure here is
//! fatal to the request; nothing is persisted by this module.

use std::sync::Arc;

use serde::de::Error as _;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::cleaning::clean_json_response;
use crate::config::{GenerationSettings, Prompts};
use crate::content::{describe_lesson, GeneratedLesson};
use crate::domain::{ComplexityLevel, Lesson, TopicAnalysis};
use crate::error::{GenerationError, GenerationStep};
use crate::providers::TextGenerator;
use crate::util::{fill_template, trunc_for_log};

pub const MIN_LESSONS: usize = 3;
pub const MAX_LESSONS: usize = 8;
pub const FALLBACK_LESSON_COUNT: usize = 5;

/// Everything the orchestrator needs to persist a chapter.
#[derive(Debug, Clone)]
pub struct ChapterPlan {
  pub title: String,
  pub description: String,
  pub analysis: TopicAnalysis,
  /// Lesson drafts numbered 1..n, each with at most one image prompt.
  pub lessons: Vec<Lesson>,
}

#[derive(Deserialize)]
struct RawAnalysis {
  #[serde(default, alias = "recommended_lesson_count")]
  recommended_lessons: i64,
  #[serde(default)]
  complexity_level: String,
  #[serde(default)]
  key_concepts: Vec<String>,
  #[serde(default)]
  prerequisites: Vec<String>,
  #[serde(default)]
  learning_outcomes: Vec<String>,
}

#[derive(Deserialize)]
struct ChapterInfo {
  title: String,
  #[serde(default)]
  description: String,
}

#[derive(Deserialize)]
struct LessonBatch {
  #[serde(default)]
  lessons: Vec<GeneratedLesson>,
}

/// Out-of-range counts are replaced, not clamped to the nearest bound.
pub fn normalize_lesson_count(raw: i64) -> usize {
  if (MIN_LESSONS as i64..=MAX_LESSONS as i64).contains(&raw) {
    raw as usize
  } else {
    FALLBACK_LESSON_COUNT
  }
}

/// Digest of earlier lessons for continuity: title plus up to two objectives each.
pub fn format_previous_lessons(lessons: &[(u32, GeneratedLesson)]) -> String {
  let mut out = String::new();
  for (order, lesson) in lessons {
    out.push_str(&format!("- Lesson {}: {}\n", order, lesson.title.trim()));
    if !lesson.learning_objectives.is_empty() {
      out.push_str("  Objectives:\n");
      for obj in lesson.learning_objectives.iter().take(2) {
        out.push_str(&format!("  • {}\n", obj.trim()));
      }
    }
  }
  out
}

#[derive(Debug, Clone)]
pub struct Sequencer {
  text: Arc<dyn TextGenerator>,
  prompts: Arc<Prompts>,
  settings: GenerationSettings,
}

impl Sequencer {
  pub fn new(text: Arc<dyn TextGenerator>, prompts: Arc<Prompts>, settings: GenerationSettings) -> Self {
    Self { text, prompts, settings }
  }

  async fn ask<T: DeserializeOwned>(&self, step: GenerationStep, prompt: &str) -> Result<T, GenerationError> {
    let raw = self
      .text
      .generate(prompt, &self.settings.sampling())
      .await
      .map_err(|source| GenerationError::Backend { step, source })?;
    let cleaned = clean_json_response(&raw);
    debug!(target: "generation", %step, response = %trunc_for_log(&cleaned, 300), "Backend response");
    serde_json::from_str(&cleaned).map_err(|source| GenerationError::Parse {
      step,
      source,
      excerpt: trunc_for_log(&cleaned, 200),
    })
  }

  #[instrument(level = "info", target = "generation", skip(self))]
  pub async fn analyze_topic(&self, topic: &str, subject: &str, grade: u8) -> Result<TopicAnalysis, GenerationError> {
    let grade_s = grade.to_string();
    let prompt = fill_template(
      &self.prompts.topic_analysis,
      &[("topic", topic), ("grade", &grade_s), ("subject", subject)],
    );
    let raw: RawAnalysis = self.ask(GenerationStep::TopicAnalysis, &prompt).await?;

    let recommended_lesson_count = normalize_lesson_count(raw.recommended_lessons);
    if recommended_lesson_count as i64 != raw.recommended_lessons {
      warn!(target: "generation", received = raw.recommended_lessons, used = recommended_lesson_count, "Recommended lesson count out of range");
    }
    let analysis = TopicAnalysis {
      recommended_lesson_count,
      complexity_level: ComplexityLevel::parse_lenient(&raw.complexity_level),
      key_concepts: raw.key_concepts,
      prerequisites: raw.prerequisites,
      learning_outcomes: raw.learning_outcomes,
    };
    info!(target: "generation", lessons = analysis.recommended_lesson_count, complexity = ?analysis.complexity_level, "Topic analysed");
    Ok(analysis)
  }

  #[instrument(level = "info", target = "generation", skip(self))]
  pub async fn name_chapter(&self, topic: &str, subject: &str, grade: u8) -> Result<(String, String), GenerationError> {
    let step = GenerationStep::ChapterNaming;
    let grade_s = grade.to_string();
    let prompt = fill_template(
      &self.prompts.chapter_naming,
      &[("topic", topic), ("grade", &grade_s), ("subject", subject)],
    );
    let info: ChapterInfo = self.ask(step, &prompt).await?;
    let title = info.title.trim().to_string();
    if title.is_empty() {
      return Err(GenerationError::Parse {
        step,
        source: serde_json::Error::custom("chapter title is empty"),
        excerpt: String::new(),
      });
    }
    Ok((title, info.description.trim().to_string()))
  }

  /// Generate lessons `first..=last` given the lessons generated so far.
  #[instrument(level = "info", target = "generation", skip(self, topic, subject, previous))]
  async fn lesson_batch(
    &self,
    topic: &str,
    subject: &str,
    grade: u8,
    first: usize,
    last: usize,
    previous: &[(u32, GeneratedLesson)],
  ) -> Result<Vec<GeneratedLesson>, GenerationError> {
    let step = GenerationStep::LessonBatch { first, last };
    let previous_block = if previous.is_empty() {
      String::new()
    } else {
      fill_template(&self.prompts.previous_lessons, &[("lessons", &format_previous_lessons(previous))])
    };
    let (count_s, first_s, last_s, grade_s) =
      ((last - first + 1).to_string(), first.to_string(), last.to_string(), grade.to_string());
    let prompt = fill_template(
      &self.prompts.lesson_batch,
      &[
        ("count", &count_s),
        ("first", &first_s),
        ("last", &last_s),
        ("topic", topic),
        ("grade", &grade_s),
        ("subject", subject),
        ("previous_lessons", &previous_block),
      ],
    );
    let mut batch: LessonBatch = self.ask(step, &prompt).await?;

    let expected = last - first + 1;
    if batch.lessons.len() > expected {
      warn!(target: "generation", %step, received = batch.lessons.len(), expected, "Batch returned extra lessons; keeping the first ones");
      batch.lessons.truncate(expected);
    } else if batch.lessons.len() < expected {
      warn!(target: "generation", %step, received = batch.lessons.len(), expected, "Batch returned fewer lessons than requested");
    }
    Ok(batch.lessons)
  }

  /// Run analysis, naming and every lesson batch, in order.
  #[instrument(level = "info", target = "generation", skip(self))]
  pub async fn plan_chapter(&self, topic: &str, subject: &str, grade: u8) -> Result<ChapterPlan, GenerationError> {
    let analysis = self.analyze_topic(topic, subject, grade).await?;
    let (title, description) = self.name_chapter(topic, subject, grade).await?;

    let total = analysis.recommended_lesson_count;
    let per_batch = self.settings.lessons_per_batch.max(1);
    let mut generated: Vec<(u32, GeneratedLesson)> = Vec::with_capacity(total);

    let mut first = 1;
    while first <= total {
      let last = (first + per_batch - 1).min(total);
      let batch = self.lesson_batch(topic, subject, grade, first, last, &generated).await?;
      for mut lesson in batch {
        lesson.image_prompts.truncate(1);
        let order = generated.len() as u32 + 1;
        generated.push((order, lesson));
      }
      first = last + 1;
    }

    if generated.is_empty() {
      return Err(GenerationError::EmptyPlan);
    }

    let lessons = generated
      .iter()
      .map(|(order, gl)| Lesson {
        title: gl.title.trim().to_string(),
        description: describe_lesson(gl),
        content: gl.content.flatten(gl.image_prompts.first().map(String::as_str)),
        order: *order,
        grade,
        subject: subject.to_string(),
        is_custom: true,
        image_prompts: gl.image_prompts.clone(),
        ..Default::default()
      })
      .collect::<Vec<_>>();

    info!(target: "generation", %title, lessons = lessons.len(), "Chapter planned");
    Ok(ChapterPlan { title, description, analysis, lessons })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{analysis_json, batch_json, naming_json, ScriptedText};

  fn sequencer(text: &ScriptedText) -> Sequencer {
    Sequencer::new(Arc::new(text.clone()), Arc::new(Prompts::default()), GenerationSettings::default())
  }

  #[test]
  fn lesson_count_outside_range_becomes_five() {
    assert_eq!(normalize_lesson_count(2), 5);
    assert_eq!(normalize_lesson_count(9), 5);
    assert_eq!(normalize_lesson_count(-1), 5);
    assert_eq!(normalize_lesson_count(3), 3);
    assert_eq!(normalize_lesson_count(8), 8);
  }

  #[tokio::test]
  async fn analysis_repairs_count_and_complexity() {
    let text = ScriptedText::new().on(
      "content analyzer",
      r#"```json
{"recommended_lessons": 12, "complexity_level": "", "key_concepts": ["light"]}
```"#,
    );
    let analysis = sequencer(&text).analyze_topic("Photosynthesis", "Biology", 7).await.unwrap();
    assert_eq!(analysis.recommended_lesson_count, 5);
    assert_eq!(analysis.complexity_level, ComplexityLevel::Intermediate);
    assert_eq!(analysis.key_concepts, vec!["light"]);
  }

  #[tokio::test]
  async fn analysis_parse_failure_is_fatal_with_step() {
    let text = ScriptedText::new().on("content analyzer", "Sure! Here is the analysis:");
    let err = sequencer(&text).analyze_topic("Photosynthesis", "Biology", 7).await.unwrap_err();
    assert!(matches!(err, GenerationError::Parse { step: GenerationStep::TopicAnalysis, .. }));
  }

  #[tokio::test]
  async fn backend_failure_is_distinguishable_from_parse_failure() {
    let text = ScriptedText::new().fail_on("content analyzer");
    let err = sequencer(&text).analyze_topic("Photosynthesis", "Biology", 7).await.unwrap_err();
    assert!(matches!(err, GenerationError::Backend { step: GenerationStep::TopicAnalysis, .. }));
  }

  #[tokio::test]
  async fn empty_chapter_title_is_fatal() {
    let text = ScriptedText::new()
      .on("content analyzer", &analysis_json(3))
      .on("structured title", r#"{"title": "  ", "description": "x"}"#);
    let err = sequencer(&text).plan_chapter("Photosynthesis", "Biology", 7).await.unwrap_err();
    assert!(matches!(err, GenerationError::Parse { step: GenerationStep::ChapterNaming, .. }));
  }

  #[tokio::test]
  async fn batches_of_two_with_previous_lesson_digest() {
    let text = ScriptedText::new()
      .on("content analyzer", &analysis_json(5))
      .on("structured title", &naming_json("Photosynthesis Basics"))
      .on("(orders 1-2)", &batch_json(1, 2))
      .on("(orders 3-4)", &batch_json(3, 4))
      .on("(orders 5-5)", &batch_json(5, 5));
    let plan = sequencer(&text).plan_chapter("Photosynthesis", "Biology", 7).await.unwrap();

    assert_eq!(plan.title, "Photosynthesis Basics");
    let orders: Vec<u32> = plan.lessons.iter().map(|l| l.order).collect();
    assert_eq!(orders, vec![1, 2, 3, 4, 5]);
    assert!(plan.lessons.iter().all(|l| l.image_prompts.len() <= 1 && l.is_custom));

    let prompts = text.prompts();
    assert_eq!(prompts.len(), 5);
    assert!(!prompts[2].contains("Previous lessons covered"));
    assert!(prompts[3].contains("- Lesson 1: Lesson 1"));
    assert!(prompts[3].contains("- Lesson 2: Lesson 2"));
    assert!(prompts[4].contains("- Lesson 4: Lesson 4"));
  }

  #[tokio::test]
  async fn backend_orders_are_renumbered_contiguously() {
    let text = ScriptedText::new()
      .on("content analyzer", &analysis_json(3))
      .on("structured title", &naming_json("Light"))
      .on("(orders 1-2)", &batch_json(7, 8))
      .on("(orders 3-3)", &batch_json(7, 7));
    let plan = sequencer(&text).plan_chapter("Light", "Physics", 5).await.unwrap();
    let orders: Vec<u32> = plan.lessons.iter().map(|l| l.order).collect();
    assert_eq!(orders, vec![1, 2, 3]);
  }

  #[tokio::test]
  async fn invalid_batch_is_fatal() {
    let text = ScriptedText::new()
      .on("content analyzer", &analysis_json(4))
      .on("structured title", &naming_json("Light"))
      .on("(orders 1-2)", &batch_json(1, 2))
      .on("(orders 3-4)", r#"{"lessons": [{"title": "Lesson 3", "content": {"intro"#);
    let err = sequencer(&text).plan_chapter("Light", "Physics", 5).await.unwrap_err();
    assert!(matches!(
      err,
      GenerationError::Parse { step: GenerationStep::LessonBatch { first: 3, last: 4 }, .. }
    ));
  }

  #[test]
  fn digest_lists_titles_and_two_objectives() {
    let lesson: GeneratedLesson = serde_json::from_value(serde_json::json!({
      "title": "Light",
      "learning_objectives": ["a", "b", "c"]
    }))
    .unwrap();
    assert_eq!(
      format_previous_lessons(&[(1, lesson)]),
      "- Lesson 1: Light\n  Objectives:\n  • a\n  • b\n"
    );
  }
}
