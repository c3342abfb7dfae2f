//! Generative service gateway: prompt building, model calls and response parsing.
//!
//! Every operation is a single request/response call. Failures are logged with
//! their cause and surfaced as one fixed localized `GatewayError` per operation.
//! Nothing is retried.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::{Quest, QuestContext, Task, TaskType, ValidationResult};
use crate::error::{GatewayError, ModelError};
use crate::gemini::{GenerativeModel, ModelRequest};
use crate::media::{downscale_image, MediaAttachment, DEFAULT_AUDIO_MIME};
use crate::util::{fill_template, trunc_for_log};

pub const DEFAULT_CORRECT_FEEDBACK: &str = "Chính xác!";
pub const DEFAULT_RETRY_FEEDBACK: &str = "Hãy thử lại nhé!";

#[derive(Clone)]
pub struct QuestGateway {
  model: Arc<dyn GenerativeModel>,
  prompts: Prompts,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedQuest {
  title: String,
  story: String,
  #[serde(default)]
  suggested_time_in_seconds: Option<f64>,
  #[serde(default)]
  tasks: Vec<GeneratedTask>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedTask {
  description: String,
  #[serde(rename = "type")]
  kind: TaskType,
  validation_prompt: String,
  #[serde(default)]
  hint: Option<String>,
}

impl GeneratedTask {
  fn into_task(self, id: u32) -> Task {
    Task {
      id,
      description: self.description,
      kind: self.kind,
      validation_prompt: self.validation_prompt,
      hint: self.hint.filter(|h| !h.trim().is_empty()),
      criteria: None,
    }
  }
}

impl QuestGateway {
  pub fn new(model: Arc<dyn GenerativeModel>, prompts: Prompts) -> Self {
    Self { model, prompts }
  }

  /// Generate a full draft quest; task ids are assigned from 1 in response order.
  #[instrument(level = "info", skip(self, api_key), fields(topic = %ctx.topic, location = %ctx.location))]
  pub async fn generate_quest(&self, api_key: &str, ctx: &QuestContext) -> Result<Quest, GatewayError> {
    let prompt = fill_template(
      &self.prompts.quest_template,
      &[("topic", ctx.topic.as_str()), ("location", ctx.location.as_str()), ("objective", ctx.objective.as_str())],
    );
    let quest = self
      .request_quest(api_key, prompt)
      .await
      .map_err(|e| {
        error!(target: "quest", error = %e, "Quest generation failed");
        GatewayError::QuestGeneration
      })?;
    info!(target: "quest", title = %quest.title, tasks = quest.tasks.len(), suggested = ?quest.suggested_time_in_seconds, "Draft quest generated");
    Ok(quest)
  }

  async fn request_quest(&self, api_key: &str, prompt: String) -> Result<Quest, ModelError> {
    let text = self.model.generate(api_key, ModelRequest::json(prompt, quest_schema())).await?;
    let text = text.trim();
    if text.is_empty() {
      return Err(ModelError::Empty);
    }
    let gen: GeneratedQuest = serde_json::from_str(text)?;
    if gen.tasks.is_empty() {
      return Err(ModelError::MissingTasks);
    }
    let tasks = gen
      .tasks
      .into_iter()
      .zip(1u32..)
      .map(|(t, id)| t.into_task(id))
      .collect();
    // A zero or negative estimate is no estimate.
    let suggested = gen
      .suggested_time_in_seconds
      .filter(|s| s.is_finite() && *s >= 1.0)
      .map(|s| s.round() as u32);
    Ok(Quest {
      title: gen.title,
      story: gen.story,
      tasks,
      suggested_time_in_seconds: suggested,
      time_limit_in_seconds: None,
    })
  }

  /// Generate one replacement task. The returned id is a placeholder (0); the caller reassigns it.
  #[instrument(level = "info", skip(self, api_key, existing), fields(topic = %ctx.topic, existing = existing.len()))]
  pub async fn generate_single_task(
    &self,
    api_key: &str,
    ctx: &QuestContext,
    existing: &[Task],
  ) -> Result<Task, GatewayError> {
    let existing_descriptions = existing
      .iter()
      .map(|t| t.description.as_str())
      .collect::<Vec<_>>()
      .join("; ");
    let prompt = fill_template(
      &self.prompts.single_task_template,
      &[
        ("topic", ctx.topic.as_str()),
        ("location", ctx.location.as_str()),
        ("objective", ctx.objective.as_str()),
        ("existing", existing_descriptions.as_str()),
      ],
    );

    let result: Result<Task, ModelError> = async {
      let text = self.model.generate(api_key, ModelRequest::json(prompt, task_schema())).await?;
      let gen: GeneratedTask = serde_json::from_str(text.trim())?;
      Ok::<_, ModelError>(gen.into_task(0))
    }
    .await;

    result.map_err(|e| {
      error!(target: "quest", error = %e, "Single task generation failed");
      GatewayError::TaskGeneration
    })
  }

  #[instrument(level = "info", skip(self, api_key, task, answer), fields(task_id = task.id, answer_len = answer.len()))]
  pub async fn validate_text_answer(
    &self,
    api_key: &str,
    task: &Task,
    answer: &str,
  ) -> Result<ValidationResult, GatewayError> {
    let criteria = criteria_clause(task);
    let prompt = fill_template(
      &self.prompts.text_validation_template,
      &[
        ("expected", task.validation_prompt.as_str()),
        ("answer", answer),
        ("criteria", criteria.as_str()),
      ],
    );
    self
      .grade(api_key, ModelRequest::text(prompt))
      .await
      .map_err(|e| {
        error!(target: "quest", task_id = task.id, error = %e, "Text validation failed");
        GatewayError::TextValidation
      })
  }

  #[instrument(level = "info", skip(self, api_key, task, image), fields(task_id = task.id, mime = %image.mime_type, bytes = image.bytes.len()))]
  pub async fn validate_image_answer(
    &self,
    api_key: &str,
    task: &Task,
    image: &MediaAttachment,
  ) -> Result<ValidationResult, GatewayError> {
    let criteria = criteria_clause(task);
    let prompt = fill_template(
      &self.prompts.image_validation_template,
      &[("instruction", task.validation_prompt.as_str()), ("criteria", criteria.as_str())],
    );
    let result: Result<ValidationResult, ModelError> = async {
      let resized = downscale_image(image)?;
      self.grade(api_key, ModelRequest::with_attachment(resized, prompt)).await
    }
    .await;
    result.map_err(|e| {
      error!(target: "quest", task_id = task.id, error = %e, "Image validation failed");
      GatewayError::ImageValidation
    })
  }

  #[instrument(level = "info", skip(self, api_key, task, clip), fields(task_id = task.id, mime = %clip.mime_type, bytes = clip.bytes.len()))]
  pub async fn validate_audio_answer(
    &self,
    api_key: &str,
    task: &Task,
    clip: &MediaAttachment,
  ) -> Result<ValidationResult, GatewayError> {
    let criteria = criteria_clause(task);
    let prompt = fill_template(
      &self.prompts.audio_validation_template,
      &[("instruction", task.validation_prompt.as_str()), ("criteria", criteria.as_str())],
    );
    let mut clip = clip.clone();
    if clip.mime_type.is_empty() {
      clip.mime_type = DEFAULT_AUDIO_MIME.into();
    }
    self
      .grade(api_key, ModelRequest::with_attachment(clip, prompt))
      .await
      .map_err(|e| {
        error!(target: "quest", task_id = task.id, error = %e, "Audio validation failed");
        GatewayError::AudioValidation
      })
  }

  async fn grade(&self, api_key: &str, request: ModelRequest) -> Result<ValidationResult, ModelError> {
    let text = self.model.generate(api_key, request).await?;
    let result = parse_validation_response(&text);
    info!(target: "quest", correct = result.is_correct, raw = %trunc_for_log(&text, 80), "Grading response parsed");
    Ok(result)
  }
}

/// "First line contains YES, remaining lines are feedback."
pub fn parse_validation_response(text: &str) -> ValidationResult {
  let mut lines = text.trim().split('\n');
  let is_correct = lines
    .next()
    .map(|first| first.to_uppercase().contains("YES"))
    .unwrap_or(false);
  let feedback = lines.collect::<Vec<_>>().join("\n").trim().to_string();
  let feedback = if feedback.is_empty() {
    if is_correct { DEFAULT_CORRECT_FEEDBACK } else { DEFAULT_RETRY_FEEDBACK }.to_string()
  } else {
    feedback
  };
  ValidationResult { is_correct, feedback }
}

fn criteria_clause(task: &Task) -> String {
  match task.criteria.as_deref().map(str::trim) {
    Some(c) if !c.is_empty() => format!("\nGrading criteria from the teacher: {c}"),
    _ => String::new(),
  }
}

fn task_schema() -> serde_json::Value {
  json!({
    "type": "OBJECT",
    "properties": {
      "description": { "type": "STRING" },
      "type": { "type": "STRING", "enum": ["TEXT", "IMAGE", "AUDIO"] },
      "validationPrompt": { "type": "STRING" },
      "hint": { "type": "STRING" }
    },
    "required": ["description", "type", "validationPrompt", "hint"]
  })
}

fn quest_schema() -> serde_json::Value {
  json!({
    "type": "OBJECT",
    "properties": {
      "title": { "type": "STRING" },
      "story": { "type": "STRING" },
      "suggestedTimeInSeconds": {
        "type": "NUMBER",
        "description": "Estimated time in seconds to complete the quest."
      },
      "tasks": { "type": "ARRAY", "items": task_schema() }
    },
    "required": ["title", "story", "tasks", "suggestedTimeInSeconds"]
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gemini::Part;
  use crate::testing::ScriptedModel;

  fn ctx() -> QuestContext {
    QuestContext {
      topic: "Bài 36: Góc".into(),
      location: "Ngoài sân trường".into(),
      objective: "Nhận biết góc bẹt".into(),
    }
  }

  fn task(kind: TaskType) -> Task {
    Task {
      id: 1,
      description: "Tìm một góc vuông".into(),
      kind,
      validation_prompt: "A right angle on a building".into(),
      hint: None,
      criteria: None,
    }
  }

  const QUEST_JSON: &str = r#"{
    "title": "Thợ săn góc",
    "story": "Sân trường đầy những góc bí ẩn.",
    "suggestedTimeInSeconds": 599.6,
    "tasks": [
      {"description": "Chụp một góc vuông", "type": "IMAGE", "validationPrompt": "A right angle", "hint": "Nhìn cửa sổ"},
      {"description": "90 + 90 = ?", "type": "TEXT", "validationPrompt": "180", "hint": ""}
    ]
  }"#;

  #[test]
  fn yes_with_feedback_is_correct() {
    let r = parse_validation_response("YES\nChính xác!");
    assert_eq!(r, ValidationResult { is_correct: true, feedback: "Chính xác!".into() });
  }

  #[test]
  fn bare_no_gets_default_retry_message() {
    for body in ["no", "NO", "No"] {
      let r = parse_validation_response(body);
      assert!(!r.is_correct);
      assert_eq!(r.feedback, DEFAULT_RETRY_FEEDBACK);
    }
    let r = parse_validation_response("  yes  ");
    assert!(r.is_correct);
    assert_eq!(r.feedback, DEFAULT_CORRECT_FEEDBACK);
  }

  #[test]
  fn multi_line_feedback_is_joined() {
    let r = parse_validation_response("NO, not quite\nGần đúng rồi.\nThử đếm lại nhé.\n");
    assert!(!r.is_correct);
    assert_eq!(r.feedback, "Gần đúng rồi.\nThử đếm lại nhé.");
    assert!(!parse_validation_response("").is_correct);
  }

  #[tokio::test]
  async fn quest_generation_assigns_sequential_ids() {
    let model = ScriptedModel::new([Ok(QUEST_JSON.to_string())]);
    let gw = QuestGateway::new(model.clone(), Prompts::default());
    let quest = gw.generate_quest("key", &ctx()).await.expect("quest");
    assert_eq!(quest.tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(quest.tasks[0].kind, TaskType::Image);
    assert_eq!(quest.tasks[1].hint, None);
    assert_eq!(quest.suggested_time_in_seconds, Some(600));
    assert_eq!(quest.time_limit_in_seconds, None);

    let req = model.last_request().expect("request");
    assert!(req.response_schema.is_some());
    match &req.parts[0] {
      Part::Text(p) => assert!(p.contains("Topic: Bài 36: Góc")),
      other => panic!("unexpected part {other:?}"),
    }
  }

  #[tokio::test]
  async fn empty_or_taskless_generation_fails_without_partial_quest() {
    let model = ScriptedModel::new([
      Ok("   ".to_string()),
      Ok(r#"{"title":"x","story":"y","suggestedTimeInSeconds":60,"tasks":[]}"#.to_string()),
      Ok("not json".to_string()),
      Err(ModelError::Api { status: 500, message: "boom".into() }),
    ]);
    let gw = QuestGateway::new(model, Prompts::default());
    for _ in 0..4 {
      let err = gw.generate_quest("key", &ctx()).await.expect_err("must fail");
      assert_eq!(err, GatewayError::QuestGeneration);
      assert_eq!(
        err.to_string(),
        "Không thể tạo nhiệm vụ. Vui lòng kiểm tra lại đầu vào hoặc thử lại sau."
      );
    }
  }

  #[tokio::test]
  async fn single_task_prompt_lists_existing_descriptions() {
    let model = ScriptedModel::new([Ok(
      r#"{"description":"Đo góc cầu thang","type":"AUDIO","validationPrompt":"Says the angle is obtuse","hint":"Dùng thước"}"#.to_string(),
    )]);
    let gw = QuestGateway::new(model.clone(), Prompts::default());
    let existing = vec![task(TaskType::Text), Task { id: 2, description: "Đếm bậc thang".into(), ..task(TaskType::Text) }];
    let t = gw.generate_single_task("key", &ctx(), &existing).await.expect("task");
    assert_eq!(t.id, 0);
    assert_eq!(t.kind, TaskType::Audio);
    match &model.last_request().expect("request").parts[0] {
      Part::Text(p) => assert!(p.contains("\"Tìm một góc vuông; Đếm bậc thang\"")),
      other => panic!("unexpected part {other:?}"),
    }
  }

  #[tokio::test]
  async fn validation_failures_map_to_fixed_messages() {
    let model = ScriptedModel::new([
      Err(ModelError::Empty),
      Err(ModelError::Empty),
    ]);
    let gw = QuestGateway::new(model, Prompts::default());
    let err = gw.validate_text_answer("key", &task(TaskType::Text), "12").await.expect_err("fail");
    assert_eq!(err.to_string(), "Không thể xác thực câu trả lời. Vui lòng thử lại.");
    let clip = MediaAttachment::new("", vec![1, 2, 3]);
    let err = gw.validate_audio_answer("key", &task(TaskType::Audio), &clip).await.expect_err("fail");
    assert_eq!(err, GatewayError::AudioValidation);
    // Undecodable image never reaches the model.
    let junk = MediaAttachment::new("image/png", vec![9, 9, 9]);
    let err = gw.validate_image_answer("key", &task(TaskType::Image), &junk).await.expect_err("fail");
    assert_eq!(err, GatewayError::ImageValidation);
  }

  #[tokio::test]
  async fn audio_gets_default_mime_and_criteria_reach_prompt() {
    let model = ScriptedModel::new([Ok("YES\nGiỏi quá!".to_string())]);
    let gw = QuestGateway::new(model.clone(), Prompts::default());
    let mut t = task(TaskType::Audio);
    t.criteria = Some("Phải nhắc đến 90 độ".into());
    let r = gw
      .validate_audio_answer("key", &t, &MediaAttachment::new("", vec![7]))
      .await
      .expect("graded");
    assert!(r.is_correct);
    let req = model.last_request().expect("request");
    match (&req.parts[0], &req.parts[1]) {
      (Part::Inline(a), Part::Text(p)) => {
        assert_eq!(a.mime_type, DEFAULT_AUDIO_MIME);
        assert!(p.contains("Phải nhắc đến 90 độ"));
        assert!(p.contains("answer only with 'YES' or 'NO'"));
      }
      other => panic!("unexpected parts {other:?}"),
    }
  }
}
