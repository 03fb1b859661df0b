//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! - LOG_LEVEL holds EnvFilter directives, e.g. "debug" or
//!   "info,wizard=debug,examgen_backend=debug".
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.
//!
//! Targets: `examgen_backend` for infrastructure (config, model client,
//! sockets) and `wizard` for stage transitions of a session. Tower HTTP's
//! TraceLayer adds per-request spans on top.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,wizard=debug,examgen_backend=debug,tower_http=info,axum=info";

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

pub fn init_tracing() {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_from_env())
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}
