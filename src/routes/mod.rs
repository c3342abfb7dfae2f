//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`, one resource per session
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/catalog", get(http::http_get_catalog))
        .route("/api/v1/sessions", post(http::http_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(http::http_get_session).delete(http::http_delete_session),
        )
        // Authoring + review
        .route("/api/v1/sessions/:id/quest", post(http::http_post_quest))
        .route("/api/v1/sessions/:id/review/tasks/:task_id", patch(http::http_patch_task))
        .route(
            "/api/v1/sessions/:id/review/tasks/:task_id/regenerate",
            post(http::http_regenerate_task),
        )
        .route("/api/v1/sessions/:id/review/timer", put(http::http_put_timer))
        .route("/api/v1/sessions/:id/review/finalize", post(http::http_finalize))
        .route("/api/v1/sessions/:id/review/cancel", post(http::http_cancel_review))
        .route("/api/v1/sessions/:id/reset", post(http::http_reset))
        // Student play
        .route("/api/v1/sessions/:id/play/start", post(http::http_start))
        .route("/api/v1/sessions/:id/play/select", post(http::http_select))
        .route("/api/v1/sessions/:id/play/skip", post(http::http_skip))
        .route("/api/v1/sessions/:id/play/next", post(http::http_next))
        .route("/api/v1/sessions/:id/play/hint", post(http::http_hint))
        .route("/api/v1/sessions/:id/play/draft", put(http::http_draft))
        .route("/api/v1/sessions/:id/play/image", put(http::http_image))
        .route("/api/v1/sessions/:id/play/audio", put(http::http_audio))
        .route("/api/v1/sessions/:id/play/answer", post(http::http_answer))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
