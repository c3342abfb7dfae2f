//! Per-task answer state for the student screen.
//!
//! A `TaskAttempt` belongs to exactly one task. When the active task changes the
//! attempt is replaced, which drops drafts, staged media and any open recording.

use serde::Serialize;
use tracing::debug;

use crate::domain::{Task, TaskType, ValidationResult};
use crate::error::{FlowError, GatewayError};
use crate::media::{MediaAttachment, DEFAULT_AUDIO_MIME};

pub const MIC_UNAVAILABLE_FEEDBACK: &str = "Không thể truy cập micro. Vui lòng cấp quyền và thử lại.";
pub const NO_HINT: &str = "Không có gợi ý cho nhiệm vụ này.";

#[derive(Debug, Default)]
enum Recording {
  #[default]
  Idle,
  Capturing { buffer: Vec<u8> },
  Captured(MediaAttachment),
}

/// The artifact handed to the gateway on submit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Answer {
  Text(String),
  Image(MediaAttachment),
  Audio(MediaAttachment),
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
  Idle,
  Recording,
  Recorded,
}

/// Client-facing view of an attempt.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptView {
  pub task_id: u32,
  pub text: String,
  pub has_image: bool,
  pub recording: RecordingState,
  pub hint: Option<String>,
  pub pending: bool,
  pub done: bool,
  pub can_submit: bool,
  pub feedback: Option<ValidationResult>,
}

#[derive(Debug)]
pub struct TaskAttempt {
  task_id: u32,
  kind: TaskType,
  text: String,
  image: Option<MediaAttachment>,
  recording: Recording,
  hint: Option<String>,
  pending: bool,
  feedback: Option<ValidationResult>,
  done: bool,
}

impl TaskAttempt {
  pub fn new(task: &Task) -> Self {
    Self {
      task_id: task.id,
      kind: task.kind,
      text: String::new(),
      image: None,
      recording: Recording::Idle,
      hint: None,
      pending: false,
      feedback: None,
      done: false,
    }
  }

  pub fn task_id(&self) -> u32 {
    self.task_id
  }

  pub fn is_pending(&self) -> bool {
    self.pending
  }

  fn editable(&self, kind: TaskType) -> Result<(), FlowError> {
    if self.pending {
      return Err(FlowError::SubmissionPending);
    }
    if self.done {
      return Err(FlowError::AnswerAccepted(self.task_id));
    }
    if self.kind != kind {
      return Err(FlowError::WrongAnswerType);
    }
    Ok(())
  }

  pub fn set_text(&mut self, text: impl Into<String>) -> Result<(), FlowError> {
    self.editable(TaskType::Text)?;
    self.text = text.into();
    self.feedback = None;
    Ok(())
  }

  pub fn stage_image(&mut self, image: MediaAttachment) -> Result<(), FlowError> {
    self.editable(TaskType::Image)?;
    self.image = Some(image);
    self.feedback = None;
    Ok(())
  }

  /// Begin capturing. `microphone_available` is the outcome of acquiring the device;
  /// when it failed the student sees a blocking message and nothing changes.
  pub fn start_recording(&mut self, microphone_available: bool) -> Result<(), FlowError> {
    self.editable(TaskType::Audio)?;
    if !microphone_available {
      self.feedback = Some(ValidationResult {
        is_correct: false,
        feedback: MIC_UNAVAILABLE_FEEDBACK.into(),
      });
      return Ok(());
    }
    // A new take discards the previous clip.
    self.recording = Recording::Capturing { buffer: Vec::new() };
    debug!(target: "quest", task_id = self.task_id, "Recording started");
    Ok(())
  }

  pub fn push_audio_chunk(&mut self, chunk: &[u8]) -> Result<(), FlowError> {
    match &mut self.recording {
      Recording::Capturing { buffer } => {
        buffer.extend_from_slice(chunk);
        Ok(())
      }
      Recording::Idle | Recording::Captured(_) => Err(FlowError::NotRecording),
    }
  }

  /// Finalize the take into a submittable clip. An empty take leaves nothing to submit.
  pub fn stop_recording(&mut self, mime_type: Option<&str>) -> Result<(), FlowError> {
    match std::mem::take(&mut self.recording) {
      Recording::Capturing { buffer } if buffer.is_empty() => Err(FlowError::MissingAnswer),
      Recording::Capturing { buffer } => {
        let mime = mime_type.filter(|m| !m.is_empty()).unwrap_or(DEFAULT_AUDIO_MIME);
        debug!(target: "quest", task_id = self.task_id, bytes = buffer.len(), "Recording finalized");
        self.recording = Recording::Captured(MediaAttachment::new(mime, buffer));
        Ok(())
      }
      other => {
        self.recording = other;
        Err(FlowError::NotRecording)
      }
    }
  }

  /// Whole clip recorded elsewhere; replaces any previous take.
  pub fn stage_audio(&mut self, clip: MediaAttachment) -> Result<(), FlowError> {
    self.editable(TaskType::Audio)?;
    self.recording = Recording::Captured(clip);
    Ok(())
  }

  /// Drop an unfinished take (client went away). A finished clip is kept.
  pub fn abandon_recording(&mut self) {
    if let Recording::Capturing { .. } = self.recording {
      self.recording = Recording::Idle;
      debug!(target: "quest", task_id = self.task_id, "Recording abandoned");
    }
  }

  /// Show the pre-supplied hint. Purely local.
  pub fn reveal_hint(&mut self, task: &Task) -> &str {
    let text = task
      .hint
      .as_deref()
      .filter(|h| !h.trim().is_empty())
      .unwrap_or(NO_HINT);
    self.hint.insert(text.to_string())
  }

  pub fn can_submit(&self) -> bool {
    if self.pending || self.done {
      return false;
    }
    match self.kind {
      TaskType::Text => !self.text.is_empty(),
      TaskType::Image => self.image.is_some(),
      TaskType::Audio => matches!(self.recording, Recording::Captured(_)),
    }
  }

  /// Hand out the answer and lock inputs until `finish_submit`.
  pub fn begin_submit(&mut self) -> Result<Answer, FlowError> {
    if self.pending {
      return Err(FlowError::SubmissionPending);
    }
    if self.done {
      return Err(FlowError::AnswerAccepted(self.task_id));
    }
    let answer = match (&self.kind, &self.recording) {
      (TaskType::Text, _) if !self.text.is_empty() => Answer::Text(self.text.clone()),
      (TaskType::Image, _) => match &self.image {
        Some(img) => Answer::Image(img.clone()),
        None => return Err(FlowError::MissingAnswer),
      },
      (TaskType::Audio, Recording::Captured(clip)) => Answer::Audio(clip.clone()),
      _ => return Err(FlowError::MissingAnswer),
    };
    self.pending = true;
    self.feedback = None;
    Ok(answer)
  }

  /// Apply the grading outcome. Returns true exactly once: on the first correct result.
  pub fn finish_submit(&mut self, outcome: Result<ValidationResult, GatewayError>) -> bool {
    self.pending = false;
    let result = outcome.unwrap_or_else(|e| ValidationResult { is_correct: false, feedback: e.to_string() });
    let completed = result.is_correct && !self.done;
    if completed {
      self.done = true;
    }
    self.feedback = Some(result);
    completed
  }

  pub fn view(&self) -> AttemptView {
    AttemptView {
      task_id: self.task_id,
      text: self.text.clone(),
      has_image: self.image.is_some(),
      recording: match self.recording {
        Recording::Idle => RecordingState::Idle,
        Recording::Capturing { .. } => RecordingState::Recording,
        Recording::Captured(_) => RecordingState::Recorded,
      },
      hint: self.hint.clone(),
      pending: self.pending,
      done: self.done,
      can_submit: self.can_submit(),
      feedback: self.feedback.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn task(kind: TaskType, hint: Option<&str>) -> Task {
    Task {
      id: 3,
      description: "Nhiệm vụ".into(),
      kind,
      validation_prompt: "42".into(),
      hint: hint.map(str::to_string),
      criteria: None,
    }
  }

  fn correct() -> Result<ValidationResult, GatewayError> {
    Ok(ValidationResult { is_correct: true, feedback: "Chính xác!".into() })
  }

  #[test]
  fn text_submit_requires_non_empty_draft() {
    let mut a = TaskAttempt::new(&task(TaskType::Text, None));
    assert!(!a.can_submit());
    assert_eq!(a.begin_submit(), Err(FlowError::MissingAnswer));
    a.set_text("42").expect("text");
    assert!(a.can_submit());
    assert_eq!(a.begin_submit(), Ok(Answer::Text("42".into())));
    assert!(!a.can_submit());
    assert_eq!(a.set_text("43"), Err(FlowError::SubmissionPending));
  }

  #[test]
  fn wrong_modality_is_rejected() {
    let mut a = TaskAttempt::new(&task(TaskType::Image, None));
    assert_eq!(a.set_text("x"), Err(FlowError::WrongAnswerType));
    assert_eq!(a.start_recording(true), Err(FlowError::WrongAnswerType));
    a.stage_image(MediaAttachment::new("image/png", vec![1])).expect("stage");
    assert!(a.can_submit());
  }

  #[test]
  fn completion_is_signalled_once() {
    let mut a = TaskAttempt::new(&task(TaskType::Text, None));
    a.set_text("42").expect("text");
    a.begin_submit().expect("submit");
    assert!(a.finish_submit(correct()));
    assert!(!a.finish_submit(correct()));
    assert_eq!(a.begin_submit(), Err(FlowError::AnswerAccepted(3)));
    assert_eq!(a.set_text("43"), Err(FlowError::AnswerAccepted(3)));
    assert!(a.view().done);
  }

  #[test]
  fn wrong_or_failed_answers_allow_resubmission() {
    let mut a = TaskAttempt::new(&task(TaskType::Text, None));
    a.set_text("41").expect("text");
    a.begin_submit().expect("submit");
    assert!(!a.finish_submit(Ok(ValidationResult { is_correct: false, feedback: "Gần đúng".into() })));
    assert_eq!(a.view().feedback.map(|f| f.feedback), Some("Gần đúng".to_string()));
    assert!(a.can_submit());

    a.begin_submit().expect("submit again");
    assert!(!a.finish_submit(Err(GatewayError::TextValidation)));
    let fb = a.view().feedback.expect("feedback");
    assert!(!fb.is_correct);
    assert_eq!(fb.feedback, "Không thể xác thực câu trả lời. Vui lòng thử lại.");

    // Editing clears stale feedback.
    a.set_text("42").expect("text");
    assert!(a.view().feedback.is_none());
  }

  #[test]
  fn microphone_failure_blocks_submission() {
    let mut a = TaskAttempt::new(&task(TaskType::Audio, None));
    a.start_recording(false).expect("handled");
    let v = a.view();
    assert_eq!(v.recording, RecordingState::Idle);
    assert_eq!(v.feedback.map(|f| f.feedback), Some(MIC_UNAVAILABLE_FEEDBACK.to_string()));
    assert!(!a.can_submit());
  }

  #[test]
  fn recording_must_be_stopped_and_new_take_discards_old_clip() {
    let mut a = TaskAttempt::new(&task(TaskType::Audio, None));
    assert_eq!(a.push_audio_chunk(&[1]), Err(FlowError::NotRecording));
    a.start_recording(true).expect("start");
    a.push_audio_chunk(&[1, 2]).expect("chunk");
    assert!(!a.can_submit());
    a.stop_recording(None).expect("stop");
    assert_eq!(a.begin_submit(), Ok(Answer::Audio(MediaAttachment::new(DEFAULT_AUDIO_MIME, vec![1, 2]))));
    a.finish_submit(Ok(ValidationResult { is_correct: false, feedback: "Nói rõ hơn".into() }));

    a.start_recording(true).expect("restart");
    assert_eq!(a.view().recording, RecordingState::Recording);
    assert!(!a.can_submit());
    assert_eq!(a.stop_recording(Some("audio/ogg")), Err(FlowError::MissingAnswer));
    assert_eq!(a.view().recording, RecordingState::Idle);
    assert_eq!(a.stop_recording(None), Err(FlowError::NotRecording));
  }

  #[test]
  fn abandoning_releases_an_open_take() {
    let mut a = TaskAttempt::new(&task(TaskType::Audio, None));
    a.start_recording(true).expect("start");
    a.push_audio_chunk(&[9; 16]).expect("chunk");
    a.abandon_recording();
    assert_eq!(a.view().recording, RecordingState::Idle);
  }

  #[test]
  fn hint_falls_back_to_fixed_message() {
    let t = task(TaskType::Text, Some("Nhân hai số"));
    let mut a = TaskAttempt::new(&t);
    assert_eq!(a.reveal_hint(&t), "Nhân hai số");
    let blank = task(TaskType::Text, Some("  "));
    let mut b = TaskAttempt::new(&blank);
    assert_eq!(b.reveal_hint(&blank), NO_HINT);
    assert_eq!(b.view().hint.as_deref(), Some(NO_HINT));
  }
}
