//! Router assembly: HTTP endpoints, stored audio, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::{AppState, UPLOADS_URL_PREFIX};

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - stored audio (speaking answers, listening TTS) under `/uploads`
/// - CORS (allow any origin/method/headers); adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let uploads = ServeDir::new(state.settings.upload_dir.clone());

    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/task", get(http::http_get_task))
        .route("/api/v1/writing", post(http::http_post_writing))
        .route("/api/v1/speaking", post(http::http_post_speaking))
        .route("/api/v1/listening", post(http::http_post_listening))
        .route("/api/v1/dashboard", get(http::http_get_dashboard))
        .route("/api/v1/stats", get(http::http_get_stats))
        .route("/api/v1/planner", post(http::http_post_planner))
        .nest_service(UPLOADS_URL_PREFIX, uploads)
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
}
