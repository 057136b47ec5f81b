//! Tracing initialization (§9 Logging): a thin wrapper around
//! `tracing-subscriber`'s env-filter builder, for use at each process
//! entry point that embeds this crate.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber reading `RUST_LOG` (defaulting
/// to `info`), with JSON output when `json` is set. Call once, at
/// process startup; a second call is a no-op logged at `debug`.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if json { builder.json().try_init() } else { builder.try_init() };

    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing subscriber already initialized");
    }
}
