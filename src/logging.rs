//! Tracing subscriber setup.
//!
//! Console output is human-readable or JSON lines. When a log directory is
//! configured, a second layer writes daily-rotated `fxgen.log` files through
//! a non-blocking appender; the returned guard must be held until exit so
//! buffered lines are flushed.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Build the filter: `RUST_LOG` wins, then `--verbose`, then the configured directive.
pub fn build_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("fxgen=debug,tower_http=debug")
        } else {
            EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("fxgen=info"))
        }
    })
}

/// Install the global subscriber.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init(
    config: &LoggingConfig,
    log_dir: Option<&Path>,
    verbose: bool,
) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "fxgen.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // Stdout is reserved for command output.
    let json_layer = config
        .json
        .then(|| fmt::layer().json().with_target(true).with_writer(std::io::stderr));
    let text_layer = (!config.json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let _ = tracing_subscriber::registry()
        .with(build_filter(config, verbose))
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let guard = init(&LoggingConfig::default(), Some(&logs), false).unwrap();
        assert!(guard.is_some());
        assert!(logs.is_dir());
    }

    #[test]
    fn test_init_without_directory_returns_no_guard() {
        let guard = init(&LoggingConfig::default(), None, true).unwrap();
        assert!(guard.is_none());
    }
}
