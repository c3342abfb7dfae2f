//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.
//!
//! A connection drives one session: `attach` first, then student-play messages.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::error::{AppError, FlowError};
use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage, SessionOut};
use crate::session::SessionHandle;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "quest_trainer", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "quest_trainer", "WebSocket connected");
  let mut attached: Option<SessionHandle> = None;
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "quest_trainer", kind = message_kind(&incoming), "WS received");
            handle_client_ws(incoming, &state, &mut attached).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "quest_trainer", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  // An unfinished recording dies with the connection.
  if let Some(handle) = &attached {
    abandon_recording(handle).await;
  }
  info!(target: "quest_trainer", "WebSocket disconnected");
}

/// Message tag for logs; payloads (audio, images, drafts) are never logged.
fn message_kind(msg: &ClientWsMessage) -> &'static str {
  match msg {
    ClientWsMessage::Ping => "ping",
    ClientWsMessage::Attach { .. } => "attach",
    ClientWsMessage::State => "state",
    ClientWsMessage::Start { .. } => "start",
    ClientWsMessage::Select { .. } => "select",
    ClientWsMessage::Skip => "skip",
    ClientWsMessage::Next => "next",
    ClientWsMessage::Hint => "hint",
    ClientWsMessage::TextDraft { .. } => "text_draft",
    ClientWsMessage::StageImage { .. } => "stage_image",
    ClientWsMessage::StartRecording { .. } => "start_recording",
    ClientWsMessage::AudioChunk { .. } => "audio_chunk",
    ClientWsMessage::StopRecording { .. } => "stop_recording",
    ClientWsMessage::Submit => "submit",
    ClientWsMessage::Reset => "reset",
  }
}

fn reply(result: Result<SessionOut, AppError>) -> ServerWsMessage {
  match result {
    Ok(session) => ServerWsMessage::State { session },
    Err(e) => ServerWsMessage::Error { message: e.to_string() },
  }
}

#[instrument(level = "info", skip(state, attached, msg))]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  attached: &mut Option<SessionHandle>,
) -> ServerWsMessage {
  let msg = match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,
    ClientWsMessage::Attach { session_id } => {
      return match state.session(session_id).await {
        Ok(handle) => {
          if let Some(previous) = attached.replace(handle.clone()) {
            abandon_recording(&previous).await;
          }
          info!(target: "quest", %session_id, "WS attached");
          ServerWsMessage::Attached { session: snapshot(&handle).await }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      };
    }
    other => other,
  };

  let Some(handle) = attached.as_ref() else {
    return ServerWsMessage::Error { message: FlowError::NotAttached.to_string() };
  };
  handle.lock().await.touch();

  match msg {
    ClientWsMessage::State => ServerWsMessage::State { session: snapshot(handle).await },
    ClientWsMessage::Start { name, avatar_id } => reply(start_quest(handle, &name, avatar_id).await),
    ClientWsMessage::Select { index } => reply(select_task(handle, index).await),
    ClientWsMessage::Skip => reply(skip_task(handle).await),
    ClientWsMessage::Next => reply(next_task(handle).await),
    ClientWsMessage::Hint => match reveal_hint(handle).await {
      Ok((text, _)) => ServerWsMessage::Hint { text },
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },
    ClientWsMessage::TextDraft { text } => reply(set_text_draft(handle, text).await),
    ClientWsMessage::StageImage { mime_type, data } => reply(stage_image(handle, &mime_type, &data).await),
    ClientWsMessage::StartRecording { microphone_available } => {
      reply(start_recording(handle, microphone_available).await)
    }
    ClientWsMessage::AudioChunk { data } => match push_audio_chunk(handle, &data).await {
      Ok(()) => ServerWsMessage::AudioAck,
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },
    ClientWsMessage::StopRecording { mime_type } => reply(stop_recording(handle, mime_type).await),
    ClientWsMessage::Submit => {
      let result = submit_answer(state, handle).await;
      tracing::info!(target: "quest", ok = result.is_ok(), "WS submit evaluated");
      reply(result)
    }
    ClientWsMessage::Reset => ServerWsMessage::State { session: reset(handle).await },
    ClientWsMessage::Ping | ClientWsMessage::Attach { .. } => ServerWsMessage::Pong,
  }
}
