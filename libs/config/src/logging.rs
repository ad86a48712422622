//! Tracing subscriber setup

use crate::settings::LoggingConfig;
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber, text or JSON, filtered by `RUST_LOG`, falling back to
/// `config.level`.
///
/// Returns `Ok(false)` when a global subscriber was already installed, so
/// tests and embedding programs can call it unconditionally.
pub fn init(config: &LoggingConfig) -> Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log filter '{}'", config.level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);
    let installed = if config.json {
        builder.json().with_current_span(false).try_init().is_ok()
    } else {
        builder.with_ansi(config.ansi).try_init().is_ok()
    };

    Ok(installed)
}
