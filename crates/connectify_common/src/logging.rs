//! Logging utilities for the Connectify services.
//!
//! Every binary calls [`init`] once at startup. `RUST_LOG` takes precedence over the
//! configured level; the configured level applies to all `connectify*` targets.

use connectify_config::LoggingConfig;
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File name prefix of the rolling log files.
const LOG_FILE_PREFIX: &str = "connectify.log";

/// Initialize the tracing subscriber from the logging configuration.
///
/// When `config.directory` is set, a second layer writes to a daily rolling file through a
/// non-blocking writer. The returned guard flushes that writer on drop and must be kept
/// alive for the lifetime of the process.
///
/// # Examples
///
/// ```
/// use connectify_common::logging;
/// use connectify_config::LoggingConfig;
///
/// let _guard = logging::init(&LoggingConfig::default());
/// ```
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let level = config.level.parse::<Level>().unwrap_or_else(|_| {
        eprintln!("Unknown log level '{}', using info", config.level);
        Level::INFO
    });
    let filter = build_filter(level);

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true);

    let (file_layer, guard) = match config.directory.as_deref() {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // try_init: a subscriber may already be installed (tests, repeated init)
    let result = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    if result.is_ok() {
        info!("Logging initialized at level: {}", level);
        if let Some(directory) = &config.directory {
            info!("Writing log files to {}", directory);
        }
    }
    guard
}

fn build_filter(level: Level) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    match format!("warn,connectify={}", level).parse::<EnvFilter>() {
        Ok(filter) => filter,
        Err(err) => {
            warn!("Invalid log filter, falling back to info: {}", err);
            EnvFilter::new("info")
        }
    }
}
