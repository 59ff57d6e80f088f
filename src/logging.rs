//! Log subscriber setup for the daemon binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the process that embeds it.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber built by [`subscriber`].
pub fn init(level: &str, log_file: Option<&Path>) -> Result<()> {
    subscriber(level, log_file)?
        .try_init()
        .context("Failed to install log subscriber")
}

/// Builds the daemon's subscriber without installing it.
///
/// `RUST_LOG` wins over `level` when set. With `log_file`, events are
/// appended to that file without ANSI colors instead of going to stdout.
pub fn subscriber(
    level: &str,
    log_file: Option<&Path>,
) -> Result<Box<dyn tracing::Subscriber + Send + Sync>> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = env_filter(rust_log.as_deref(), level)?;
    let registry = tracing_subscriber::registry().with(filter);

    Ok(match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Box::new(registry.with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))))
        }
        None => Box::new(registry.with(fmt::layer())),
    })
}

fn env_filter(rust_log: Option<&str>, level: &str) -> Result<EnvFilter> {
    match rust_log.map(str::trim).filter(|directives| !directives.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid RUST_LOG directives: {}", directives)),
        None => EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {}", level)),
    }
}

#[cfg(test)]
#[path = "tests/logging_tests.rs"]
mod tests;
