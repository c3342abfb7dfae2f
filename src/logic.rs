//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Authoring: draft generation from the form
//!   - Review: edits, single-task regeneration, time policy, finalize
//!   - Student play: start, navigation, hints, answer staging and submission
//!
//! Gateway calls never run under the session lock. The inputs are cloned out,
//! the lock is released, and the outcome is applied only if the session is still
//! where the call left it. The call and its bookkeeping run on a spawned task, so
//! a caller dropped mid-request (closed HTTP connection) still clears the
//! in-flight flag once the model answers.

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info, instrument, warn, Instrument};

use crate::attempt::{Answer, TaskAttempt};
use crate::authoring::AuthoringForm;
use crate::domain::{Quest, Task, TaskField, ValidationResult};
use crate::error::{AppError, FlowError, FormError, GatewayError};
use crate::gateway::QuestGateway;
use crate::media::{MediaAttachment, DEFAULT_AUDIO_MIME};
use crate::protocol::{to_out, SessionOut};
use crate::review::TimePolicy;
use crate::session::{SessionHandle, StudentPlay};
use crate::state::AppState;

pub async fn snapshot(handle: &SessionHandle) -> SessionOut {
  to_out(&*handle.lock().await)
}

// -------- Authoring / review --------

/// Run the gateway half of an operation detached from the caller.
async fn detached<T, F>(work: F) -> Result<T, AppError>
where
  T: Send + 'static,
  F: Future<Output = Result<T, AppError>> + Send + 'static,
{
  tokio::spawn(work.in_current_span()).await.map_err(|e| {
    error!(target: "quest", error = %e, "Gateway task did not finish");
    AppError::Background(e.to_string())
  })?
}

#[instrument(level = "info", skip(state, handle, form), fields(topic = %form.topic))]
pub async fn draft_quest(state: &AppState, handle: &SessionHandle, form: AuthoringForm) -> Result<SessionOut, AppError> {
  let (api_key, ctx) = handle.lock().await.begin_draft(form)?;
  let gateway = state.gateway.clone();
  let handle = Arc::clone(handle);
  detached(async move {
    let outcome = gateway.generate_quest(&api_key, &ctx).await;
    let mut s = handle.lock().await;
    s.finish_draft(ctx, outcome)?;
    Ok(to_out(&s))
  })
  .await
}

#[instrument(level = "info", skip(handle, value), fields(value_len = value.len()))]
pub async fn edit_task(handle: &SessionHandle, task_id: u32, field: TaskField, value: String) -> Result<SessionOut, AppError> {
  let mut s = handle.lock().await;
  s.review_mut()?.edit_task(task_id, field, value)?;
  Ok(to_out(&s))
}

#[instrument(level = "info", skip(state, handle))]
pub async fn regenerate_task(state: &AppState, handle: &SessionHandle, task_id: u32) -> Result<SessionOut, AppError> {
  let (api_key, ticket) = {
    let mut s = handle.lock().await;
    let api_key = s.api_key().map(str::to_string).ok_or(FormError::MissingCredential)?;
    (api_key, s.review_mut()?.begin_regeneration(task_id)?)
  };

  let gateway = state.gateway.clone();
  let handle = Arc::clone(handle);
  detached(async move {
    let outcome = gateway
      .generate_single_task(&api_key, &ticket.context, &ticket.existing)
      .await;
    let failure = outcome.as_ref().err().copied();

    let mut s = handle.lock().await;
    match s.review_mut() {
      Ok(review) => {
        review.finish_regeneration(ticket.task_id, outcome);
      }
      Err(_) => warn!(target: "quest", task_id = ticket.task_id, "Review closed before regeneration finished"),
    }
    if let Some(e) = failure {
      return Err(e.into());
    }
    Ok(to_out(&s))
  })
  .await
}

#[instrument(level = "info", skip(handle))]
pub async fn set_time_policy(handle: &SessionHandle, policy: TimePolicy, custom_minutes: Option<String>) -> Result<SessionOut, AppError> {
  let mut s = handle.lock().await;
  s.review_mut()?.set_time_policy(policy, custom_minutes)?;
  Ok(to_out(&s))
}

#[instrument(level = "info", skip(handle))]
pub async fn finalize_quest(handle: &SessionHandle) -> Result<SessionOut, AppError> {
  let mut s = handle.lock().await;
  s.finalize()?;
  Ok(to_out(&s))
}

#[instrument(level = "info", skip(handle))]
pub async fn cancel_review(handle: &SessionHandle) -> Result<SessionOut, AppError> {
  let mut s = handle.lock().await;
  s.cancel_review()?;
  Ok(to_out(&s))
}

#[instrument(level = "info", skip(handle))]
pub async fn reset(handle: &SessionHandle) -> SessionOut {
  let mut s = handle.lock().await;
  s.reset();
  to_out(&s)
}

// -------- Student play --------

/// Run a synchronous step on the play screen, then realign the attempt and ticker.
async fn play_step<T>(
  handle: &SessionHandle,
  op: impl FnOnce(&mut StudentPlay) -> Result<T, AppError>,
) -> Result<(T, SessionOut), AppError> {
  let mut s = handle.lock().await;
  let play = s.play_mut()?;
  let result = op(play);
  play.sync_attempt();
  play.sync_ticker(Arc::downgrade(handle));
  let value = result?;
  Ok((value, to_out(&s)))
}

/// The attempt, provided the active task can still be answered.
fn answering(play: &mut StudentPlay) -> Result<&mut TaskAttempt, FlowError> {
  if play.progression.is_time_up() {
    return Err(FlowError::TimeUp);
  }
  if !play.progression.accepts_answers() {
    return Err(FlowError::WrongView { state: play.progression.view().name() });
  }
  let index = play.progression.active_index();
  play.attempt_mut().ok_or(FlowError::TaskIndexOutOfRange(index))
}

#[instrument(level = "info", skip(handle, name), fields(name_len = name.len()))]
pub async fn start_quest(handle: &SessionHandle, name: &str, avatar_id: Option<u8>) -> Result<SessionOut, AppError> {
  Ok(play_step(handle, |p| p.progression.start(name, avatar_id)).await?.1)
}

#[instrument(level = "info", skip(handle))]
pub async fn select_task(handle: &SessionHandle, index: usize) -> Result<SessionOut, AppError> {
  Ok(play_step(handle, |p| Ok(p.progression.select_task(index)?)).await?.1)
}

#[instrument(level = "info", skip(handle))]
pub async fn skip_task(handle: &SessionHandle) -> Result<SessionOut, AppError> {
  Ok(play_step(handle, |p| Ok(p.progression.skip()?)).await?.1)
}

#[instrument(level = "info", skip(handle))]
pub async fn next_task(handle: &SessionHandle) -> Result<SessionOut, AppError> {
  Ok(play_step(handle, |p| Ok(p.progression.next_task()?)).await?.1)
}

#[instrument(level = "info", skip(handle))]
pub async fn reveal_hint(handle: &SessionHandle) -> Result<(String, SessionOut), AppError> {
  play_step(handle, |p| {
    let task = p
      .progression
      .active_task()
      .cloned()
      .ok_or(FlowError::TaskIndexOutOfRange(p.progression.active_index()))?;
    Ok(answering(p)?.reveal_hint(&task).to_string())
  })
  .await
}

#[instrument(level = "debug", skip(handle, text), fields(text_len = text.len()))]
pub async fn set_text_draft(handle: &SessionHandle, text: String) -> Result<SessionOut, AppError> {
  Ok(play_step(handle, |p| Ok(answering(p)?.set_text(text)?)).await?.1)
}

#[instrument(level = "info", skip(handle, data), fields(%mime_type, data_len = data.len()))]
pub async fn stage_image(handle: &SessionHandle, mime_type: &str, data: &str) -> Result<SessionOut, AppError> {
  let image = MediaAttachment::from_base64(mime_type, data)?;
  Ok(play_step(handle, |p| Ok(answering(p)?.stage_image(image)?)).await?.1)
}

/// Whole recorded clip in one upload.
#[instrument(level = "info", skip(handle, data), fields(%mime_type, data_len = data.len()))]
pub async fn stage_audio(handle: &SessionHandle, mime_type: &str, data: &str) -> Result<SessionOut, AppError> {
  let mut clip = MediaAttachment::from_base64(mime_type, data)?;
  if clip.mime_type.is_empty() {
    clip.mime_type = DEFAULT_AUDIO_MIME.into();
  }
  Ok(play_step(handle, |p| Ok(answering(p)?.stage_audio(clip)?)).await?.1)
}

#[instrument(level = "info", skip(handle))]
pub async fn start_recording(handle: &SessionHandle, microphone_available: bool) -> Result<SessionOut, AppError> {
  Ok(play_step(handle, |p| Ok(answering(p)?.start_recording(microphone_available)?)).await?.1)
}

#[instrument(level = "debug", skip(handle, data), fields(data_len = data.len()))]
pub async fn push_audio_chunk(handle: &SessionHandle, data: &str) -> Result<(), AppError> {
  let chunk = MediaAttachment::from_base64(DEFAULT_AUDIO_MIME, data)?;
  let mut s = handle.lock().await;
  answering(s.play_mut()?)?.push_audio_chunk(&chunk.bytes)?;
  Ok(())
}

#[instrument(level = "info", skip(handle))]
pub async fn stop_recording(handle: &SessionHandle, mime_type: Option<String>) -> Result<SessionOut, AppError> {
  Ok(play_step(handle, |p| Ok(answering(p)?.stop_recording(mime_type.as_deref())?)).await?.1)
}

/// Client went away: drop any unfinished take.
pub async fn abandon_recording(handle: &SessionHandle) {
  let mut s = handle.lock().await;
  if let Ok(play) = s.play_mut() {
    if let Some(a) = play.attempt_mut() {
      a.abandon_recording();
    }
  }
}

/// Grade the staged answer for the active task.
///
/// A correct result completes the task, unless the clock ran out or the student
/// moved to another task while the model was thinking; then it is dropped.
#[instrument(level = "info", skip(state, handle))]
pub async fn submit_answer(state: &AppState, handle: &SessionHandle) -> Result<SessionOut, AppError> {
  let (api_key, quest, task, answer) = {
    let mut s = handle.lock().await;
    let api_key = s.api_key().map(str::to_string).ok_or(FormError::MissingCredential)?;
    let play = s.play_mut()?;
    let quest = Arc::clone(play.progression.quest());
    let task = play
      .progression
      .active_task()
      .cloned()
      .ok_or(FlowError::TaskIndexOutOfRange(play.progression.active_index()))?;
    let answer = answering(play)?.begin_submit()?;
    (api_key, quest, task, answer)
  };

  let gateway = state.gateway.clone();
  let handle = Arc::clone(handle);
  detached(async move {
    let outcome = grade(&gateway, &api_key, &task, &answer).await;
    apply_grading(&handle, &quest, &task, outcome).await
  })
  .await
}

async fn grade(gateway: &QuestGateway, api_key: &str, task: &Task, answer: &Answer) -> Result<ValidationResult, GatewayError> {
  match answer {
    Answer::Text(text) => gateway.validate_text_answer(api_key, task, text).await,
    Answer::Image(image) => gateway.validate_image_answer(api_key, task, image).await,
    Answer::Audio(clip) => gateway.validate_audio_answer(api_key, task, clip).await,
  }
}

async fn apply_grading(
  handle: &SessionHandle,
  quest: &Arc<Quest>,
  task: &Task,
  outcome: Result<ValidationResult, GatewayError>,
) -> Result<SessionOut, AppError> {
  let mut s = handle.lock().await;
  let session_id = s.id;
  let Ok(play) = s.play_mut() else {
    warn!(target: "quest", %session_id, task_id = task.id, "Session left the quest; dropping grading result");
    return Ok(to_out(&s));
  };
  let same_quest = Arc::ptr_eq(play.progression.quest(), quest);
  let Some(attempt) = play
    .attempt_mut()
    .filter(|a| same_quest && a.task_id() == task.id && a.is_pending())
  else {
    warn!(target: "quest", %session_id, task_id = task.id, "Active task changed; dropping grading result");
    return Ok(to_out(&s));
  };

  if attempt.finish_submit(outcome) {
    if play.progression.accepts_answers() {
      let view = play.progression.complete_active_task(&mut rand::thread_rng())?;
      info!(target: "quest", %session_id, task_id = task.id, kind = task.kind.as_str(), view = view.name(), "Answer accepted");
    } else {
      warn!(target: "quest", %session_id, task_id = task.id, "Correct answer arrived after time ran out");
    }
  }
  play.sync_ticker(Arc::downgrade(handle));
  Ok(to_out(&s))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::TaskType;
  use crate::progression::{TaskStatus, ViewState};
  use crate::testing::ScriptedModel;

  const QUEST_JSON: &str = r#"{
    "title": "Đo sân trường",
    "story": "Các em là kỹ sư nhí.",
    "suggestedTimeInSeconds": 600,
    "tasks": [
      {"description": "Sân dài 20m, rộng 10m. Chu vi?", "type": "TEXT", "validationPrompt": "60", "hint": "Cộng các cạnh"},
      {"description": "Chụp ảnh một góc vuông", "type": "IMAGE", "validationPrompt": "A right angle"},
      {"description": "Đọc to số 125", "type": "AUDIO", "validationPrompt": "Says one hundred twenty five"}
    ]
  }"#;

  async fn session_in_play(model: Arc<ScriptedModel>) -> (AppState, SessionHandle) {
    let state = AppState::with_model(model);
    let handle = state.create_session().await;
    let form = AuthoringForm::with_defaults(&state.catalog, Some("key"));
    draft_quest(&state, &handle, form).await.expect("draft");
    finalize_quest(&handle).await.expect("finalize");
    start_quest(&handle, "Lan", Some(2)).await.expect("start");
    (state, handle)
  }

  #[tokio::test(start_paused = true)]
  async fn correct_text_answer_completes_the_task() {
    let model = ScriptedModel::new([Ok(QUEST_JSON.to_string()), Ok("NO\nChưa đúng".into()), Ok("yes\nGiỏi!".into())]);
    let (state, handle) = session_in_play(model.clone()).await;

    set_text_draft(&handle, "50".into()).await.expect("draft");
    let out = submit_answer(&state, &handle).await.expect("submit");
    let student = out.student.expect("student");
    assert_eq!(student.view, ViewState::InQuest);
    assert_eq!(student.attempt.and_then(|a| a.feedback).map(|f| f.feedback), Some("Chưa đúng".into()));

    set_text_draft(&handle, "60".into()).await.expect("draft");
    let out = submit_answer(&state, &handle).await.expect("submit");
    let student = out.student.expect("student");
    assert!(matches!(student.view, ViewState::TaskComplete { .. }));
    assert_eq!(student.tasks[0].status, TaskStatus::Completed);
    assert_eq!(model.request_count(), 3);

    let out = next_task(&handle).await.expect("next");
    let student = out.student.expect("student");
    assert_eq!(student.active_index, 1);
    assert_eq!(student.attempt.map(|a| a.task_id), Some(2));
  }

  #[tokio::test(start_paused = true)]
  async fn completed_task_cannot_be_reselected() {
    let model = ScriptedModel::new([Ok(QUEST_JSON.to_string()), Ok("YES".into())]);
    let (state, handle) = session_in_play(model).await;
    set_text_draft(&handle, "60".into()).await.expect("draft");
    submit_answer(&state, &handle).await.expect("submit");
    next_task(&handle).await.expect("next");
    assert!(matches!(select_task(&handle, 0).await, Err(AppError::Flow(FlowError::TaskCompleted(0)))));
  }

  #[tokio::test(start_paused = true)]
  async fn answers_must_match_task_type() {
    let model = ScriptedModel::new([Ok(QUEST_JSON.to_string())]);
    let (_state, handle) = session_in_play(model).await;
    skip_task(&handle).await.expect("skip");
    assert!(matches!(
      set_text_draft(&handle, "x".into()).await,
      Err(AppError::Flow(FlowError::WrongAnswerType))
    ));
    let out = stage_image(&handle, "", "data:image/png;base64,AAEC").await.expect("stage");
    let attempt = out.student.and_then(|s| s.attempt).expect("attempt");
    assert!(attempt.has_image);
    assert!(attempt.can_submit);
  }

  #[tokio::test(start_paused = true)]
  async fn recording_flow_submits_audio() {
    let model = ScriptedModel::new([Ok(QUEST_JSON.to_string()), Ok("YES\nRõ ràng".into())]);
    let (state, handle) = session_in_play(model.clone()).await;
    select_task(&handle, 2).await.expect("select");
    start_recording(&handle, true).await.expect("start");
    push_audio_chunk(&handle, "AAEC").await.expect("chunk");
    stop_recording(&handle, Some("audio/ogg".into())).await.expect("stop");
    submit_answer(&state, &handle).await.expect("submit");

    let req = model.last_request().expect("request");
    match &req.parts[0] {
      crate::gemini::Part::Inline(a) => {
        assert_eq!(a.mime_type, "audio/ogg");
        assert_eq!(a.bytes, vec![0, 1, 2]);
      }
      other => panic!("unexpected part {other:?}"),
    }
    let out = snapshot(&handle).await;
    assert_eq!(out.student.expect("student").tasks[2].status, TaskStatus::Completed);
  }

  #[tokio::test(start_paused = true)]
  async fn gateway_failure_becomes_feedback() {
    let model = ScriptedModel::new([
      Ok(QUEST_JSON.to_string()),
      Err(crate::error::ModelError::Api { status: 500, message: "boom".into() }),
    ]);
    let (state, handle) = session_in_play(model).await;
    set_text_draft(&handle, "60".into()).await.expect("draft");
    let out = submit_answer(&state, &handle).await.expect("submit");
    let attempt = out.student.and_then(|s| s.attempt).expect("attempt");
    let fb = attempt.feedback.expect("feedback");
    assert!(!fb.is_correct);
    assert_eq!(fb.feedback, "Không thể xác thực câu trả lời. Vui lòng thử lại.");
    assert!(attempt.can_submit);
  }

  #[tokio::test(start_paused = true)]
  async fn empty_generation_keeps_authoring_screen() {
    let model = ScriptedModel::new([Ok(String::new())]);
    let state = AppState::with_model(model);
    let handle = state.create_session().await;
    let form = AuthoringForm::with_defaults(&state.catalog, Some("key"));
    let err = draft_quest(&state, &handle, form).await.expect_err("empty");
    assert_eq!(err.to_string(), "Không thể tạo nhiệm vụ. Vui lòng kiểm tra lại đầu vào hoặc thử lại sau.");
    let out = snapshot(&handle).await;
    assert_eq!(out.screen, "authoring");
    assert!(out.review.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn regeneration_replaces_one_task() {
    let replacement = r#"{"description":"Đếm cây trong vườn","type":"TEXT","validationPrompt":"12"}"#;
    let model = ScriptedModel::new([Ok(QUEST_JSON.to_string()), Ok(replacement.to_string())]);
    let state = AppState::with_model(model);
    let handle = state.create_session().await;
    let form = AuthoringForm::with_defaults(&state.catalog, Some("key"));
    draft_quest(&state, &handle, form).await.expect("draft");

    let out = regenerate_task(&state, &handle, 2).await.expect("regenerate");
    let review = out.review.expect("review");
    let t = review.draft.task(2).expect("task 2");
    assert_eq!(t.description, "Đếm cây trong vườn");
    assert_eq!(t.kind, TaskType::Text);
    assert_eq!(review.draft.tasks.len(), 3);

    set_time_policy(&handle, TimePolicy::Custom, Some("15".into())).await.expect("policy");
    let out = finalize_quest(&handle).await.expect("finalize");
    assert_eq!(out.student.expect("student").time_limit_in_seconds, Some(900));
  }

  #[tokio::test(start_paused = true)]
  async fn dropped_submit_still_settles_the_attempt() {
    let model = ScriptedModel::gated([Ok(QUEST_JSON.to_string()), Ok("NO\nThử lại nhé".into())]);
    model.release(1);
    let (state, handle) = session_in_play(model.clone()).await;
    set_text_draft(&handle, "50".into()).await.expect("draft");

    let caller = {
      let (state, handle) = (state.clone(), handle.clone());
      tokio::spawn(async move { submit_answer(&state, &handle).await })
    };
    while model.request_count() < 2 {
      tokio::task::yield_now().await;
    }
    caller.abort();
    assert!(caller.await.expect_err("aborted").is_cancelled());
    assert!(matches!(
      set_text_draft(&handle, "60".into()).await,
      Err(AppError::Flow(FlowError::SubmissionPending))
    ));

    model.release(1);
    let attempt = loop {
      let attempt = snapshot(&handle).await.student.and_then(|s| s.attempt).expect("attempt");
      if !attempt.pending {
        break attempt;
      }
      tokio::task::yield_now().await;
    };
    assert_eq!(attempt.feedback.map(|f| f.feedback), Some("Thử lại nhé".into()));
    assert!(attempt.can_submit);
    set_text_draft(&handle, "60".into()).await.expect("editable again");
  }

  #[tokio::test(start_paused = true)]
  async fn dropped_draft_request_still_reaches_review() {
    let model = ScriptedModel::gated([Ok(QUEST_JSON.to_string())]);
    let state = AppState::with_model(model.clone());
    let handle = state.create_session().await;
    let form = AuthoringForm::with_defaults(&state.catalog, Some("key"));

    let caller = {
      let (state, handle) = (state.clone(), handle.clone());
      tokio::spawn(async move { draft_quest(&state, &handle, form).await })
    };
    while model.request_count() < 1 {
      tokio::task::yield_now().await;
    }
    caller.abort();
    let _ = caller.await;
    assert!(snapshot(&handle).await.authoring.expect("authoring").generating);

    model.release(1);
    while snapshot(&handle).await.screen != "review" {
      tokio::task::yield_now().await;
    }
  }
}
