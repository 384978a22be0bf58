//! Britais · English practice backend
//!
//! - Axum HTTP API: leveled tasks, writing/speaking/listening evaluation, progress
//! - Optional OpenAI integration (via environment variables)
//! - Stored audio served from the upload directory under /uploads
//!
//! Important env variables:
//!   PORT                     : u16 (default 3000)
//!   OPENAI_API_KEY           : enables OpenAI integration if present
//!   OPENAI_BASE_URL          : default "https://api.openai.com/v1"
//!   OPENAI_MODEL             : default "gpt-4o-mini"
//!   OPENAI_TRANSCRIBE_MODEL  : default "gpt-4o-mini-transcribe"
//!   OPENAI_TTS_MODEL         : default "gpt-4o-mini-tts"
//!   OPENAI_TTS_VOICE         : default "alloy"
//!   UPLOAD_DIR               : default "./uploads"
//!   AGENT_CONFIG_PATH        : path to TOML config (prompts + extra speaking topics)
//!   LOG_LEVEL                : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT               : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod ai;
mod openai;
mod seeds;
mod store;
mod speech;
mod tasks;
mod transcriber;
mod evaluator;
mod progress;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "britais_backend", error = %e, "Could not install Ctrl+C handler");
    std::future::pending::<()>().await;
  }
  info!(target: "britais_backend", "Shutdown requested");
}

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let settings = Settings::from_env();
  tokio::fs::create_dir_all(&settings.upload_dir).await?;
  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

  // Shared application state (stores, OpenAI client, prompts).
  let state = Arc::new(AppState::new(settings));

  // HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  let listener = TcpListener::bind(addr).await?;
  info!(target: "britais_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}
