//! Teacher review of a generated draft: edit tasks, regenerate one task, pick the
//! time policy and freeze the quest.
//!
//! Regeneration is split in two halves (`begin_regeneration` / `finish_regeneration`)
//! so callers can run the model call without holding the session lock.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Quest, QuestContext, Task, TaskField};
use crate::error::{FlowError, GatewayError};
use crate::util::ceil_minutes;

pub const DEFAULT_CUSTOM_MINUTES: &str = "10";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimePolicy {
  Suggested,
  Custom,
  Unlimited,
}

/// Everything the gateway needs to produce a replacement task.
#[derive(Clone, Debug)]
pub struct RegenerationTicket {
  pub task_id: u32,
  pub context: QuestContext,
  /// The other tasks; their descriptions are excluded from the new task.
  pub existing: Vec<Task>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
  pub draft: Quest,
  pub context: QuestContext,
  pub regenerating_task_id: Option<u32>,
  pub error: Option<String>,
  pub time_policy: TimePolicy,
  pub custom_minutes: String,
  pub time_limit_in_seconds: Option<u32>,
}

#[derive(Debug)]
pub struct ReviewSession {
  draft: Quest,
  context: QuestContext,
  regenerating: Option<u32>,
  error: Option<String>,
  time_policy: TimePolicy,
  custom_minutes: String,
}

impl ReviewSession {
  pub fn new(draft: Quest, context: QuestContext) -> Self {
    let (time_policy, custom_minutes) = match draft.suggested_time_in_seconds {
      Some(s) if s > 0 => (TimePolicy::Suggested, ceil_minutes(s).to_string()),
      _ => (TimePolicy::Unlimited, DEFAULT_CUSTOM_MINUTES.to_string()),
    };
    Self { draft, context, regenerating: None, error: None, time_policy, custom_minutes }
  }

  pub fn edit_task(&mut self, task_id: u32, field: TaskField, value: impl Into<String>) -> Result<(), FlowError> {
    let task = self
      .draft
      .tasks
      .iter_mut()
      .find(|t| t.id == task_id)
      .ok_or(FlowError::UnknownTask(task_id))?;
    let value = value.into();
    match field {
      TaskField::Description => task.description = value,
      TaskField::ValidationPrompt => task.validation_prompt = value,
      TaskField::Hint => task.hint = Some(value).filter(|v| !v.is_empty()),
      TaskField::Criteria => task.criteria = Some(value).filter(|v| !v.is_empty()),
    }
    Ok(())
  }

  /// Mark `task_id` as regenerating. Only one regeneration runs at a time.
  pub fn begin_regeneration(&mut self, task_id: u32) -> Result<RegenerationTicket, FlowError> {
    if self.regenerating.is_some() {
      return Err(FlowError::RegenerationInProgress);
    }
    if self.draft.task(task_id).is_none() {
      return Err(FlowError::UnknownTask(task_id));
    }
    let existing = self.draft.tasks.iter().filter(|t| t.id != task_id).cloned().collect();
    self.regenerating = Some(task_id);
    self.error = None;
    Ok(RegenerationTicket { task_id, context: self.context.clone(), existing })
  }

  /// Apply the outcome. The replacement keeps the id and position of the old task;
  /// a failure leaves the draft untouched. Returns false for a stale outcome.
  pub fn finish_regeneration(&mut self, task_id: u32, outcome: Result<Task, GatewayError>) -> bool {
    if self.regenerating != Some(task_id) {
      warn!(target: "quest", task_id, "Discarding stale regeneration result");
      return false;
    }
    self.regenerating = None;
    match outcome {
      Ok(mut task) => {
        if let Some(slot) = self.draft.tasks.iter_mut().find(|t| t.id == task_id) {
          task.id = task_id;
          *slot = task;
          info!(target: "quest", task_id, "Task regenerated");
        }
      }
      Err(e) => self.error = Some(e.to_string()),
    }
    true
  }

  /// Choose the timer policy. `minutes` updates the custom text when given.
  pub fn set_time_policy(&mut self, policy: TimePolicy, minutes: Option<String>) -> Result<(), FlowError> {
    if policy == TimePolicy::Suggested && self.suggested().is_none() {
      return Err(FlowError::NoSuggestedTime);
    }
    self.time_policy = policy;
    if let Some(m) = minutes {
      self.custom_minutes = m;
    }
    Ok(())
  }

  fn suggested(&self) -> Option<u32> {
    self.draft.suggested_time_in_seconds.filter(|s| *s > 0)
  }

  /// The limit the finalized quest would carry.
  pub fn time_limit(&self) -> Option<u32> {
    match self.time_policy {
      TimePolicy::Suggested => self.suggested(),
      TimePolicy::Custom => leading_minutes(&self.custom_minutes).and_then(|m| m.checked_mul(60)),
      TimePolicy::Unlimited => None,
    }
  }

  /// Freeze the draft into the quest students play.
  pub fn finalize(self) -> Quest {
    let time_limit_in_seconds = self.time_limit();
    info!(target: "quest", title = %self.draft.title, tasks = self.draft.tasks.len(), limit = ?time_limit_in_seconds, "Quest finalized");
    Quest { time_limit_in_seconds, ..self.draft }
  }

  pub fn view(&self) -> ReviewView {
    ReviewView {
      draft: self.draft.clone(),
      context: self.context.clone(),
      regenerating_task_id: self.regenerating,
      error: self.error.clone(),
      time_policy: self.time_policy,
      custom_minutes: self.custom_minutes.clone(),
      time_limit_in_seconds: self.time_limit(),
    }
  }
}

/// Leading whole number of the text ("15 phút" is 15, "1.5" is 1); zero counts as none.
fn leading_minutes(text: &str) -> Option<u32> {
  let text = text.trim();
  let end = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
  text[..end].parse::<u32>().ok().filter(|m| *m > 0)
}
