//! Error taxonomy.
//!
//! - `FormError`: missing input, shown inline, never reaches the model.
//! - `ModelError`: transport / API / payload problems talking to the model. Logged only.
//! - `GatewayError`: the single localized message per gateway operation.
//! - `MediaError`: unreadable uploads.
//! - `FlowError`: an action that is not valid in the current screen or view state.
//!
//! `AppError` wraps them for the transport layer.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
  #[error("Vui lòng nhập Gemini API Key của bạn.")]
  MissingCredential,
  #[error("Vui lòng nhập hoặc chọn chủ đề.")]
  MissingTopic,
  #[error("Vui lòng nhập hoặc chọn địa điểm.")]
  MissingLocation,
  #[error("Vui lòng chọn hoặc nhập mục tiêu học tập.")]
  MissingObjective,
  #[error("Vui lòng nhập tên và chọn nhân vật.")]
  MissingStudentIdentity,
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),
  #[error("Gemini HTTP {status}: {message}")]
  Api { status: u16, message: String },
  #[error("model returned an empty response")]
  Empty,
  #[error("JSON parse error: {0}")]
  Json(#[from] serde_json::Error),
  #[error("response is missing a valid 'tasks' array")]
  MissingTasks,
  #[error("attachment could not be prepared: {0}")]
  Media(#[from] MediaError),
}

/// One fixed, user-facing message per gateway operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayError {
  #[error("Không thể tạo nhiệm vụ. Vui lòng kiểm tra lại đầu vào hoặc thử lại sau.")]
  QuestGeneration,
  #[error("Không thể tạo nhiệm vụ mới. Vui lòng thử lại.")]
  TaskGeneration,
  #[error("Không thể xác thực câu trả lời. Vui lòng thử lại.")]
  TextValidation,
  #[error("Không thể xác thực hình ảnh. Vui lòng thử lại.")]
  ImageValidation,
  #[error("Không thể xác thực âm thanh. Vui lòng thử lại.")]
  AudioValidation,
}

#[derive(Error, Debug)]
pub enum MediaError {
  #[error("invalid base64 payload: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("unreadable image: {0}")]
  Image(#[from] image::ImageError),
  #[error("empty attachment")]
  Empty,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
  #[error("session not found")]
  UnknownSession,
  #[error("action requires the {expected} screen")]
  WrongScreen { expected: &'static str },
  #[error("action not available while {state}")]
  WrongView { state: &'static str },
  #[error("unknown task id {0}")]
  UnknownTask(u32),
  #[error("task index {0} is out of range")]
  TaskIndexOutOfRange(usize),
  #[error("task {0} is already completed")]
  TaskCompleted(usize),
  #[error("task id {0} already has an accepted answer")]
  AnswerAccepted(u32),
  #[error("time is up")]
  TimeUp,
  #[error("unknown avatar {0}")]
  UnknownAvatar(u8),
  #[error("a quest is already being generated")]
  GenerationInProgress,
  #[error("another task is being regenerated")]
  RegenerationInProgress,
  #[error("a submission is already being checked")]
  SubmissionPending,
  #[error("an answer is required before submitting")]
  MissingAnswer,
  #[error("this answer type does not match the task")]
  WrongAnswerType,
  #[error("no recording in progress")]
  NotRecording,
  #[error("no session attached")]
  NotAttached,
  #[error("the draft has no suggested time")]
  NoSuggestedTime,
}

/// Umbrella error returned by the core logic layer.
#[derive(Error, Debug)]
pub enum AppError {
  #[error(transparent)]
  Form(#[from] FormError),
  #[error(transparent)]
  Gateway(#[from] GatewayError),
  #[error(transparent)]
  Media(#[from] MediaError),
  #[error(transparent)]
  Flow(#[from] FlowError),
  #[error("background work failed: {0}")]
  Background(String),
}
