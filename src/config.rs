//! Loading quest configuration (prompt templates + catalog additions) from TOML.
//!
//! See `QuestConfig` and `Prompts` for the expected schema.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct QuestConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub catalog: CatalogCfg,
}

/// Extra catalog entries appended to the built-in grade-6 math tables.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct CatalogCfg {
  #[serde(default)]
  pub topics: Vec<String>,
  #[serde(default)]
  pub locations: Vec<String>,
  #[serde(default)]
  pub objectives: HashMap<String, Vec<String>>,
}

/// Prompt templates sent to the generative model.
///
/// The validation templates must keep the "first line YES or NO, then feedback"
/// instruction: answers are parsed by that convention.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// Placeholders: {topic} {location} {objective}
  pub quest_template: String,
  /// Placeholders: {topic} {location} {objective} {existing}
  pub single_task_template: String,
  /// Placeholders: {expected} {answer} {criteria}
  pub text_validation_template: String,
  /// Placeholders: {instruction} {criteria}
  pub image_validation_template: String,
  /// Placeholders: {instruction} {criteria}
  pub audio_validation_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      quest_template: r#"
You are an AI assistant for creating gamified educational quests for 6th-grade math students in Vietnam.
Based on the following inputs, generate a quest in JSON format.
ALL TEXT in the final JSON output (title, story, description, hint) MUST BE IN VIETNAMESE.

Topic: {topic}
Location: {location}
Learning Objective: {objective}

Make the tasks creative, fun, and directly related to the topic and location. Create 2-3 tasks with a variety of types (TEXT, IMAGE, AUDIO).
For each task, provide a 'hint' that helps the student without giving away the answer.

IMPORTANT: After creating the tasks, analyze their complexity (e.g., calculation vs. physical movement) and provide a 'suggestedTimeInSeconds' field with a reasonable estimated time in seconds for a student to complete the entire quest.

- For IMAGE tasks, make the validationPrompt a clear instruction for an AI vision model (in English) describing the object to be found.
- For TEXT tasks, the validationPrompt MUST BE the single, exact, correct answer (e.g., "954", "3.14"). This will be used for direct comparison.
- For AUDIO tasks, make the validationPrompt a clear instruction for an AI speech recognition model (in English), describing the key concepts the student should say.
"#
      .into(),
      single_task_template: r#"
You are an AI assistant for creating a single, gamified educational task for 6th-grade math students in Vietnam.
Based on the following context, generate one new task in JSON format.
ALL TEXT in the final JSON output (description, hint) MUST BE IN VIETNAMESE.

Context:
- Topic: {topic}
- Location: {location}
- Learning Objective: {objective}

The new task MUST be different from the following existing tasks: "{existing}".

Make the task creative and fun. For the task, also provide a 'hint' that helps the student without giving away the answer. The task type can be TEXT, IMAGE, or AUDIO.
- For IMAGE tasks, make the validationPrompt a clear instruction for an AI vision model (in English).
- For TEXT tasks, the validationPrompt MUST BE the single, exact, correct answer.
- For AUDIO tasks, make the validationPrompt a clear instruction for an AI speech recognition model (in English).
"#
      .into(),
      text_validation_template: r#"
You are a text validation AI for a student game. The correct answer is: '{expected}'. The student's answer is: '{answer}'.
Is the student's answer correct? Consider minor variations like extra spaces or different capitalization as correct, but the core value/text must match.{criteria}
First, on a new line, answer only with 'YES' or 'NO'.
Then, on the next line, provide a brief, encouraging explanation for the student in VIETNAMESE. If the answer is correct, just say "Chính xác!". If it's incorrect, provide a helpful tip.
"#
      .into(),
      image_validation_template: r#"
You are an image validation AI for a student game. The student was asked to: '{instruction}'.
Does this image satisfy the request?{criteria}
First, on a new line, answer only with 'YES' or 'NO'.
Then, on the next line, provide a brief, encouraging explanation for the student in VIETNAMESE.
"#
      .into(),
      audio_validation_template: r#"
You are an audio validation AI for a student game. The student was asked to say something related to this: '{instruction}'.
Listen to this audio. Does the student's answer correctly address the task?{criteria}
First, on a new line, answer only with 'YES' or 'NO'.
Then, on the next line, provide a brief, encouraging explanation for the student in VIETNAMESE.
"#
      .into(),
    }
  }
}

/// Attempt to load `QuestConfig` from QUEST_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_quest_config_from_env() -> Option<QuestConfig> {
  let path = std::env::var("QUEST_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<QuestConfig>(&s) {
      Ok(cfg) => {
        info!(target: "quest_trainer", %path, "Loaded quest config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "quest_trainer", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "quest_trainer", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_default_prompts() {
    let cfg: QuestConfig = toml::from_str(
      r#"
[prompts]
quest_template = "Topic {topic}"

[catalog]
locations = ["Phòng thí nghiệm"]
"#,
    )
    .expect("parse");
    assert_eq!(cfg.prompts.quest_template, "Topic {topic}");
    assert!(cfg.prompts.text_validation_template.contains("'YES' or 'NO'"));
    assert_eq!(cfg.catalog.locations, vec!["Phòng thí nghiệm".to_string()]);
  }
}
