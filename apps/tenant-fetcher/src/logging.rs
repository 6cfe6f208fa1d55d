//! Structured logging setup using tracing.
//!
//! JSON output is the default, suitable for log aggregation. `pretty` is meant
//! for local runs.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `filter` (e.g. "info,tenancy_sync=debug").
///
/// # Panics
///
/// Panics if the subscriber has already been initialized.
pub fn init_logging(filter: &str, format: LogFormat) {
    let filter_layer =
        match EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(filter)) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("FATAL: Failed to create log filter: {e}");
                std::process::exit(1);
            }
        };

    match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .flatten_event(true);
            tracing_subscriber::registry()
                .with(fmt_layer)
                .with(filter_layer)
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(fmt::layer().pretty().with_target(true))
                .with(filter_layer)
                .init();
        }
    }

    tracing::info!(filter = %filter, format = ?format, "Logging initialized");
}

/// Initialize logging for tests (with simpler output).
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}
