//! Domain models: tasks, quests, the authoring context and validation results.

use serde::{Deserialize, Serialize};

/// Which answer modality does a task expect?
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskType {
  /// Typed answer, compared against the exact answer key.
  Text,
  /// Photo of something, graded by a vision model.
  Image,
  /// Spoken answer, graded by an audio-capable model.
  Audio,
}

impl TaskType {
  pub fn as_str(&self) -> &'static str {
    match self {
      TaskType::Text => "TEXT",
      TaskType::Image => "IMAGE",
      TaskType::Audio => "AUDIO",
    }
  }
}

/// One gradable unit of student work.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  /// Sequence number, unique within a quest (starts at 1).
  pub id: u32,
  pub description: String,
  #[serde(rename = "type")]
  pub kind: TaskType,
  /// Answer key: exact answer for TEXT, an instruction for IMAGE/AUDIO graders.
  pub validation_prompt: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hint: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub criteria: Option<String>,
}

/// Editable text fields of a task during teacher review.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TaskField {
  Description,
  Hint,
  ValidationPrompt,
  Criteria,
}

/// A themed set of tasks with narrative framing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
  pub title: String,
  pub story: String,
  pub tasks: Vec<Task>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub suggested_time_in_seconds: Option<u32>,
  /// Enforced limit, only set when the teacher finalizes the quest.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub time_limit_in_seconds: Option<u32>,
}

impl Quest {
  pub fn task(&self, id: u32) -> Option<&Task> {
    self.tasks.iter().find(|t| t.id == id)
  }
}

/// What the teacher asked for; kept around for single-task regeneration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestContext {
  pub topic: String,
  pub location: String,
  pub objective: String,
}

/// Outcome of grading one submission. Never persisted.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
  pub is_correct: bool,
  pub feedback: String,
}
