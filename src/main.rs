//! Quest Trainer · AI math worksheet backend
//!
//! - Axum HTTP + WebSocket API
//! - Gemini integration for quest generation and answer grading
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   GEMINI_BASE_URL     : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_MODEL        : default "gemini-2.5-flash"
//!   GEMINI_TIMEOUT_SECS : per-request timeout (default 60)
//!   QUEST_CONFIG_PATH   : path to TOML config (prompt templates + catalog additions)
//!   SESSION_IDLE_SECS   : drop sessions untouched this long (default 14400)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"
//!
//! The Gemini API key is not read from the environment; each teacher supplies it
//! in the authoring form and it lives only in that session's memory.

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod catalog;
mod media;
mod gemini;
mod gateway;
mod progression;
mod attempt;
mod authoring;
mod review;
mod session;
mod state;
mod protocol;
mod logic;
mod routes;
#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (session store, Gemini gateway, catalog).
  let state = Arc::new(AppState::new()?);
  let idle_secs = std::env::var("SESSION_IDLE_SECS")
    .ok()
    .and_then(|s| s.parse::<u64>().ok())
    .unwrap_or(4 * 60 * 60);
  let _sweeper = state.clone().spawn_idle_sweeper(Duration::from_secs(idle_secs));

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "quest_trainer", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "quest_trainer", "Shutdown requested");
    })
    .await?;
  Ok(())
}
