//! Typed schema for generated lesson content and its flattening to text.
//!
//! The lesson-batch prompt asks for a nested `content` object with six
//! sections. Each section is modelled explicitly; anything the model leaves out
//! is skipped when the lesson text is assembled, nothing is invented in its place.

use serde::Deserialize;

use crate::util::first_sentence;

/// One lesson as returned inside a lesson batch (`{"lessons": [...]}`).
#[derive(Clone, Debug, Deserialize)]
pub struct GeneratedLesson {
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub content: LessonBody,
  #[serde(default)]
  pub difficulty: String,
  #[serde(default)]
  pub duration_minutes: u32,
  #[serde(default)]
  pub image_prompts: Vec<String>,
  #[serde(default)]
  pub learning_objectives: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum LessonBody {
  Sections(ContentSections),
  Text(String),
  Other(serde_json::Value),
}

impl Default for LessonBody {
  fn default() -> Self {
    LessonBody::Text(String::new())
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ContentSections {
  #[serde(default)]
  pub introduction: Option<TextBlock>,
  #[serde(default)]
  pub core_concepts: Vec<CoreConcept>,
  #[serde(default)]
  pub visual_elements: Vec<VisualElement>,
  #[serde(default)]
  pub interactive_elements: Vec<InteractiveElement>,
  #[serde(default)]
  pub summary: Option<TextBlock>,
  #[serde(default)]
  pub assessment: Option<TextBlock>,
}

/// Models return prose sections either as one string or as a list of lines.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum TextBlock {
  Text(String),
  Lines(Vec<String>),
}

impl TextBlock {
  fn render(&self) -> String {
    match self {
      TextBlock::Text(s) => s.trim().to_string(),
      TextBlock::Lines(lines) => lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n"),
    }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct CoreConcept {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub explanation: String,
  #[serde(default)]
  pub real_world_example: String,
  #[serde(default)]
  pub key_points: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct VisualElement {
  #[serde(default, rename = "type")]
  pub kind: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub caption: String,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct InteractiveElement {
  #[serde(default, rename = "type")]
  pub kind: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub materials_needed: Vec<String>,
  #[serde(default)]
  pub expected_outcome: String,
}

fn push_line(out: &mut String, line: &str) {
  if !line.trim().is_empty() {
    out.push_str(line.trim_end());
    out.push('\n');
  }
}

impl LessonBody {
  /// Flatten into one readable text blob. `image_prompt` is listed under the
  /// visual aids when present.
  pub fn flatten(&self, image_prompt: Option<&str>) -> String {
    match self {
      LessonBody::Sections(sections) => sections.flatten(image_prompt),
      LessonBody::Text(s) => s.trim().to_string(),
      LessonBody::Other(v) => v.to_string(),
    }
  }
}

impl ContentSections {
  pub fn flatten(&self, image_prompt: Option<&str>) -> String {
    let mut out = String::new();

    if let Some(intro) = self.introduction.as_ref().map(TextBlock::render) {
      if !intro.is_empty() {
        out.push_str(&intro);
        out.push_str("\n\n");
      }
    }

    if !self.core_concepts.is_empty() {
      out.push_str("Core Concepts:\n\n");
      for concept in &self.core_concepts {
        push_line(&mut out, &concept.title);
        if !concept.explanation.trim().is_empty() {
          out.push_str(concept.explanation.trim());
          out.push_str("\n\n");
        }
        if !concept.real_world_example.trim().is_empty() {
          out.push_str(&format!("Real-World Example: {}\n", concept.real_world_example.trim()));
        }
        if !concept.key_points.is_empty() {
          out.push_str("Key Points:\n");
          for point in &concept.key_points {
            out.push_str(&format!("• {}\n", point.trim()));
          }
        }
        out.push('\n');
      }
    }

    let image_prompt = image_prompt.map(str::trim).filter(|p| !p.is_empty());
    if !self.visual_elements.is_empty() || image_prompt.is_some() {
      out.push_str("Visual Aids:\n");
      for visual in &self.visual_elements {
        out.push_str(&format!("• {}: {}\n", visual.kind.trim(), visual.description.trim()));
        if !visual.caption.trim().is_empty() {
          out.push_str(&format!("  Caption: {}\n", visual.caption.trim()));
        }
      }
      if let Some(prompt) = image_prompt {
        out.push_str(&format!("• {}\n", prompt));
      }
      out.push('\n');
    }

    if !self.interactive_elements.is_empty() {
      out.push_str("Interactive Activities:\n\n");
      for activity in &self.interactive_elements {
        match activity.kind.trim() {
          "" => push_line(&mut out, &activity.title),
          kind => push_line(&mut out, &format!("{} ({})", activity.title.trim(), kind)),
        }
        if !activity.description.trim().is_empty() {
          out.push_str(activity.description.trim());
          out.push_str("\n\n");
        }
        if !activity.materials_needed.is_empty() {
          out.push_str("Materials needed:\n");
          for m in &activity.materials_needed {
            out.push_str(&format!("- {}\n", m.trim()));
          }
          out.push('\n');
        }
        if !activity.expected_outcome.trim().is_empty() {
          out.push_str(&format!("What you'll learn: {}\n\n", activity.expected_outcome.trim()));
        }
      }
    }

    if let Some(summary) = self.summary.as_ref().map(TextBlock::render) {
      if !summary.is_empty() {
        out.push_str("Summary:\n");
        out.push_str(&summary);
        out.push_str("\n\n");
      }
    }

    if let Some(assessment) = self.assessment.as_ref().map(TextBlock::render) {
      if !assessment.is_empty() {
        out.push_str("Assessment:\n");
        out.push_str(&assessment);
      }
    }

    out.trim_end().to_string()
  }
}

/// Short lesson description: first sentence, up to three objectives, and a
/// `[30 min | Basic]` footer.
pub fn describe_lesson(lesson: &GeneratedLesson) -> String {
  let mut objectives = String::from("Objectives:");
  for obj in lesson.learning_objectives.iter().take(3) {
    objectives.push_str(&format!("\n• {}", obj.trim()));
  }
  format!(
    "{}\n\n{}\n[{} min | {}]",
    first_sentence(&lesson.description),
    objectives,
    lesson.duration_minutes,
    capitalize(lesson.difficulty.trim()),
  )
}

fn capitalize(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}
