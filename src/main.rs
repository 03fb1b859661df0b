//! Exam matrix wizard backend
//!
//! Builds CV 7791 style exam documents (matrix, specification, questions,
//! answer key) in six gated steps, delegating lesson extraction, allocation
//! and drafting to an OpenAI-compatible model.
//!
//! - Axum HTTP + WebSocket API
//! - Optional OpenAI integration (via environment variables)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : enables the model client if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL   : default "gpt-4o-mini" (lesson extraction)
//!   OPENAI_STRONG_MODEL : default "gpt-4o" (matrix, specification, questions)
//!   AGENT_CONFIG_PATH   : path to TOML config (prompts, limits, accounts, exam defaults)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod catalog;
mod config;
mod error;
mod aggregate;
mod agent;
mod openai;
mod wizard;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Sessions, configuration and the optional model client.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "examgen_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
