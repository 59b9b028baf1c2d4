//! Telemetry helpers for structured logging and tracing.

/// Initialize tracing/telemetry. Users can install their own subscriber; this
/// helper loads a `.env` file if present and installs an env-based subscriber
/// if none is set. Defaults to `voxgate=info` when `RUST_LOG` is unset.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = dotenvy::dotenv();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("voxgate=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
