//! Shared logging utilities for Fixity binaries.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration shared by Fixity binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Enable info-level output.
    pub verbose: bool,
    /// Enable debug-level output (overrides `verbose`).
    pub debug: bool,
    /// Optional append-mode log file in addition to stderr.
    pub log_file: Option<PathBuf>,
}

/// Build the level filter for the given flags. `RUST_LOG` wins when set.
fn build_filter(config: &LogConfig<'_>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = if config.debug {
        "debug"
    } else if config.verbose {
        "info"
    } else {
        "warn"
    };

    EnvFilter::new(format!("warn,{}={level}", config.app_name))
}

/// Initialize tracing with a stderr writer and an optional log file.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    // The stderr layer is built per arm: its subscriber type parameter is
    // fixed by the stack it is layered onto, which differs between the
    // file and no-file configurations.
    match config.log_file {
        Some(ref path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::sync::Arc::new(file))
                        .with_ansi(false)
                        .with_filter(build_filter(&config)),
                )
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_filter(build_filter(&config)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_filter(build_filter(&config)),
                )
                .init();
        }
    }

    Ok(())
}
