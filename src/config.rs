//! Loading application configuration (prompts, generation tuning, seed users) from TOML.
//!
//! See `AppConfig`, `Prompts` and `GenerationSettings` for the expected schema.
//! Every section is optional; anything left out falls back to the defaults below.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub generation: GenerationSettings,
  #[serde(default)]
  pub users: Vec<SeedUser>,
}

/// User registered in the content store at startup.
#[derive(Clone, Debug, Deserialize)]
pub struct SeedUser {
  pub id: Uuid,
  #[serde(default)]
  pub name: String,
}

/// Sampling parameters sent with every text-generation call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplingParams {
  pub temperature: f32,
  pub top_k: u32,
  pub top_p: f32,
  pub max_output_tokens: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
  pub lessons_per_batch: usize,
  pub temperature: f32,
  pub top_k: u32,
  pub top_p: f32,
  pub max_output_tokens: u32,
  /// Lessons whose order is a multiple of this get a quiz.
  pub quiz_every_nth_lesson: u32,
  pub max_concurrent_image_calls: usize,
  pub max_images_per_request: usize,
  pub request_timeout_secs: u64,
}

impl Default for GenerationSettings {
  fn default() -> Self {
    Self {
      lessons_per_batch: 2,
      temperature: 0.3,
      top_k: 20,
      top_p: 0.8,
      max_output_tokens: 8192,
      quiz_every_nth_lesson: 3,
      max_concurrent_image_calls: 4,
      max_images_per_request: 4,
      request_timeout_secs: 300,
    }
  }
}

impl GenerationSettings {
  pub fn sampling(&self) -> SamplingParams {
    SamplingParams {
      temperature: self.temperature,
      top_k: self.top_k,
      top_p: self.top_p,
      max_output_tokens: self.max_output_tokens,
    }
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs.max(1))
  }
}

/// Prompt templates. `{name}` placeholders are filled with `util::fill_template`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// {topic} {grade} {subject}
  pub topic_analysis: String,
  /// {topic} {grade} {subject}
  pub chapter_naming: String,
  /// {count} {first} {last} {topic} {grade} {subject} {previous_lessons}
  pub lesson_batch: String,
  /// {lessons}
  pub previous_lessons: String,
  /// {content}
  pub quiz: String,
  /// {topic}
  pub meme_prompt: String,
  /// {topic}
  pub meme_fallback: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      topic_analysis: r#"You are an educational content analyzer. Analyze the topic "{topic}" for grade {grade} {subject} students.

Respond ONLY with a JSON object in the following format (no additional text, just the JSON):
{
    "recommended_lessons": 5,
    "complexity_level": "basic",
    "key_concepts": ["concept1", "concept2", "concept3", "concept4"],
    "prerequisites": ["prereq1", "prereq2", "prereq3"],
    "learning_outcomes": ["outcome1", "outcome2", "outcome3", "outcome4"]
}

Analysis Guidelines:
- recommended_lessons: Integer between 3 and 8 based on topic scope
- complexity_level: Must be "basic", "intermediate", or "advanced" based on grade level
- key_concepts: 4-6 main concepts that should be covered in the chapter
- prerequisites: 2-4 knowledge areas students should already understand
- learning_outcomes: 4-6 specific, measurable skills students will gain"#
        .into(),
      chapter_naming: r#"Create a structured title and description for a chapter about "{topic}" for grade {grade} {subject} students.

Respond ONLY with a JSON object:
{
    "title": "Clear and Descriptive Chapter Title",
    "description": "Chapter overview covering main topics, key learning objectives, prerequisites and practical applications"
}

Guidelines:
- Title should be concise but descriptive
- Description should be 3-5 sentences in grade-appropriate language"#
        .into(),
      lesson_batch: r#"Create {count} lessons (orders {first}-{last}) for the chapter about "{topic}" for grade {grade} {subject} students.{previous_lessons}

Respond ONLY with a JSON object:
{
    "lessons": [
        {
            "title": "Lesson Title",
            "description": "Brief overview of lesson content and goals",
            "content": {
                "introduction": "2-3 paragraphs presenting the topic and its relevance",
                "core_concepts": [
                    {
                        "title": "Concept Title",
                        "explanation": "Explanation with examples appropriate for grade {grade} students",
                        "real_world_example": "Practical application of the concept",
                        "key_points": ["Key point 1", "Key point 2"]
                    }
                ],
                "visual_elements": [
                    { "type": "diagram", "description": "What the diagram shows", "caption": "Caption" }
                ],
                "interactive_elements": [
                    {
                        "type": "activity",
                        "title": "Activity Title",
                        "description": "Numbered step-by-step instructions",
                        "materials_needed": ["Item 1"],
                        "expected_outcome": "What students will achieve"
                    }
                ],
                "summary": "Structured summary of the key concepts",
                "assessment": "2-3 questions or tasks to check understanding"
            },
            "order": {first},
            "difficulty": "basic",
            "duration_minutes": 30,
            "image_prompts": ["An educational illustration showing a specific concept"],
            "learning_objectives": ["Students will be able to ..."]
        }
    ]
}

Guidelines:
- Present 2-4 core concepts per lesson, each with an example
- Match difficulty to the grade level and build on previous lessons
- IMPORTANT: Provide only ONE image prompt per lesson"#
        .into(),
      previous_lessons: "\n\nPrevious lessons covered:\n{lessons}\nEnsure these new lessons build upon previous content and maintain logical progression."
        .into(),
      quiz: r#"You are an educational quiz creator. Create a quiz for the following lesson content:
{content}

Respond ONLY with a JSON object in the following format (no additional text, just the JSON):
{
    "quiz": { "title": "Quiz Title", "description": "Quiz description", "time_limit": 600 },
    "questions": [
        {
            "text": "Question text here",
            "question_type": "multiple_choice",
            "options": ["option1", "option2", "option3", "option4"],
            "answer": "correct answer",
            "explanation": "explanation of the answer",
            "points": 5,
            "difficulty": "easy"
        }
    ]
}

Notes:
- Create exactly 10 questions: 5 easy, 3 medium, 2 hard
- question_type is multiple_choice, fill_in_the_blank (with 4 options) or true_false
- multiple_choice questions have exactly 4 options and the answer is one of them
- points follow difficulty (easy: 5, medium: 10, hard: 15)
- time_limit is between 300 and 900 seconds"#
        .into(),
      meme_prompt: "Create a concise prompt (under 500 characters) for generating a funny and educational meme about {topic}. Output ONLY the prompt."
        .into(),
      meme_fallback: "Create a funny and educational meme about {topic}".into(),
    }
  }
}

/// Attempt to load `AppConfig` from CHAPTERGEN_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("CHAPTERGEN_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "chaptergen_backend", %path, users = cfg.users.len(), "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "chaptergen_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "chaptergen_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_config_uses_defaults() {
    let cfg: AppConfig = toml::from_str("").unwrap();
    assert_eq!(cfg.generation.lessons_per_batch, 2);
    assert_eq!(cfg.generation.max_images_per_request, 4);
    assert_eq!(
      cfg.generation.sampling(),
      SamplingParams { temperature: 0.3, top_k: 20, top_p: 0.8, max_output_tokens: 8192 }
    );
    assert!(cfg.prompts.topic_analysis.contains("{topic}"));
    assert!(cfg.users.is_empty());
  }

  #[test]
  fn partial_sections_override_only_given_fields() {
    let cfg: AppConfig = toml::from_str(
      r#"
        [generation]
        max_images_per_request = 2
        request_timeout_secs = 30

        [prompts]
        meme_fallback = "A meme about {topic}"

        [[users]]
        id = "6f1c2b8e-2f8a-4c55-9d7e-1c2b3a4d5e6f"
        name = "instructor"
      "#,
    )
    .unwrap();
    assert_eq!(cfg.generation.max_images_per_request, 2);
    assert_eq!(cfg.generation.max_concurrent_image_calls, 4);
    assert_eq!(cfg.generation.request_timeout(), Duration::from_secs(30));
    assert_eq!(cfg.prompts.meme_fallback, "A meme about {topic}");
    assert!(cfg.prompts.quiz.contains("{content}"));
    assert_eq!(cfg.users.len(), 1);
    assert_eq!(cfg.users[0].name, "instructor");
  }
}
