//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::authoring::AuthoringForm;
use crate::error::{AppError, FlowError};
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

type ApiResult = Result<Json<SessionOut>, AppError>;

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let status = match &self {
      AppError::Form(_) | AppError::Media(_) => StatusCode::BAD_REQUEST,
      AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
      AppError::Flow(FlowError::UnknownSession | FlowError::UnknownTask(_)) => StatusCode::NOT_FOUND,
      AppError::Flow(
        FlowError::TaskIndexOutOfRange(_)
        | FlowError::UnknownAvatar(_)
        | FlowError::MissingAnswer
        | FlowError::WrongAnswerType,
      ) => StatusCode::BAD_REQUEST,
      AppError::Flow(_) => StatusCode::CONFLICT,
      AppError::Background(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::BAD_GATEWAY {
      warn!(target: "quest", error = %self, "Gateway error returned to client");
    }
    (status, Json(ErrorOut { error: self.to_string() })).into_response()
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_get_catalog(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(serde_json::to_value(CatalogOut::from(state.catalog.as_ref())).unwrap_or_default())
}

#[instrument(level = "info", skip(state))]
pub async fn http_create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let handle = state.create_session().await;
  (StatusCode::CREATED, Json(snapshot(&handle).await))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(snapshot(&handle).await))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
  if state.remove_session(id).await {
    info!(target: "quest", session_id = %id, "Session removed");
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(FlowError::UnknownSession.into())
  }
}

#[instrument(level = "info", skip(state, form), fields(%id, topic = %form.topic))]
pub async fn http_post_quest(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(form): Json<AuthoringForm>,
) -> ApiResult {
  let handle = state.session(id).await?;
  let out = draft_quest(&state, &handle, form).await?;
  info!(target: "quest", session_id = %id, "HTTP draft quest generated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(%id, %task_id))]
pub async fn http_patch_task(
  State(state): State<Arc<AppState>>,
  Path((id, task_id)): Path<(Uuid, u32)>,
  Json(body): Json<TaskEditIn>,
) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(edit_task(&handle, task_id, body.field, body.value).await?))
}

#[instrument(level = "info", skip(state), fields(%id, %task_id))]
pub async fn http_regenerate_task(
  State(state): State<Arc<AppState>>,
  Path((id, task_id)): Path<(Uuid, u32)>,
) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(regenerate_task(&state, &handle, task_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_put_timer(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<TimePolicyIn>,
) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(set_time_policy(&handle, body.policy, body.custom_minutes).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_finalize(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(finalize_quest(&handle).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_cancel_review(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(cancel_review(&handle).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_reset(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(reset(&handle).await))
}

#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_start(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<StartIn>,
) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(start_quest(&handle, &body.name, body.avatar_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(%id, index = body.index))]
pub async fn http_select(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<SelectIn>,
) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(select_task(&handle, body.index).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_skip(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(skip_task(&handle).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_next(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(next_task(&handle).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_hint(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<HintOut>, AppError> {
  let handle = state.session(id).await?;
  let (text, _) = reveal_hint(&handle).await?;
  Ok(Json(HintOut { text }))
}

#[instrument(level = "info", skip(state, body), fields(%id, text_len = body.text.len()))]
pub async fn http_draft(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<DraftIn>,
) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(set_text_draft(&handle, body.text).await?))
}

#[instrument(level = "info", skip(state, body), fields(%id, mime = %body.mime_type, data_len = body.data.len()))]
pub async fn http_image(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<MediaIn>,
) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(stage_image(&handle, &body.mime_type, &body.data).await?))
}

#[instrument(level = "info", skip(state, body), fields(%id, mime = %body.mime_type, data_len = body.data.len()))]
pub async fn http_audio(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<MediaIn>,
) -> ApiResult {
  let handle = state.session(id).await?;
  Ok(Json(stage_audio(&handle, &body.mime_type, &body.data).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_answer(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
  let handle = state.session(id).await?;
  let out = submit_answer(&state, &handle).await?;
  info!(target: "quest", session_id = %id, "HTTP answer evaluated");
  Ok(Json(out))
}
