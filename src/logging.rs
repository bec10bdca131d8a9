use std::fs;
use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::SyncError;

static INIT: Once = Once::new();

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(config: &LoggingConfig) -> Result<(), SyncError> {
    if let Some(dir) = &config.directory {
        fs::create_dir_all(dir)?;
    }

    let mut result = Ok(());
    INIT.call_once(|| {
        result = install(config);
    });
    result
}

fn install(config: &LoggingConfig) -> Result<(), SyncError> {
    let console = config.console.then(|| {
        fmt::Layer::new()
            .with_target(true)
            .with_ansi(true)
            .with_filter(env_filter(&config.level))
    });

    let file = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::RollingFileAppender::builder()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix("topology-sync")
                .filename_suffix("log")
                .build(dir)
                .map_err(|e| SyncError::config(format!("Failed to create log appender: {}", e)))?;
            Some(
                fmt::Layer::new()
                    .json()
                    .with_writer(appender)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_ansi(false)
                    .with_filter(env_filter(&config.level)),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry().with(console).with(file);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| SyncError::internal(format!("Failed to set tracing subscriber: {}", e)))?;

    // Records emitted through the `log` facade end up in the same sinks
    tracing_log::LogTracer::init()
        .map_err(|e| SyncError::internal(format!("Failed to bridge log records: {}", e)))?;

    Ok(())
}
