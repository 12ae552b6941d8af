//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, optionally, to a
//! JSON log file for post-mortem analysis of sequencing and shadow traffic.

use crate::config::LoggingConfig;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(build_filter(&log_level));

        let mut file_path: Option<PathBuf> = None;
        let file_layer = match (&config.directory, config.json_file) {
            (Some(directory), true) => {
                let log_dir = PathBuf::from(directory);
                match fs::create_dir_all(&log_dir) {
                    Ok(()) => {
                        let file_name = format!(
                            "{}.{}.{}.log",
                            environment,
                            process::id(),
                            Utc::now().format("%Y%m%d_%H%M%S")
                        );
                        file_path = Some(log_dir.join(&file_name));
                        let appender = tracing_appender::rolling::never(&log_dir, file_name);
                        let (writer, guard) = tracing_appender::non_blocking(appender);
                        // the guard flushes on drop; logging lives for the whole process
                        std::mem::forget(guard);
                        Some(
                            fmt::layer()
                                .with_writer(writer)
                                .with_target(true)
                                .with_level(true)
                                .with_ansi(false)
                                .json()
                                .with_filter(build_filter(&log_level)),
                        )
                    }
                    Err(e) => {
                        eprintln!("Failed to create log directory {}: {e}", log_dir.display());
                        None
                    }
                }
            }
            _ => None,
        };

        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_file = ?file_path,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// `RUST_LOG` wins over the environment-derived level
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("SEQUENCER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for shadow queue operations
pub fn log_queue_operation(
    operation: &str,
    action: &str,
    target: Option<&str>,
    token: Option<&str>,
    pending: usize,
) {
    tracing::debug!(
        operation = %operation,
        action = %action,
        target = target,
        request_id = token,
        pending = pending,
        "📨 QUEUE_OPERATION"
    );
}

/// Log a change of the active or preloading part
pub fn log_sequencer_transition(
    current_type: &str,
    next_type: Option<&str>,
    preloading: bool,
    deadline: &chrono::DateTime<Utc>,
) {
    tracing::info!(
        current = %current_type,
        next = next_type,
        preloading = preloading,
        deadline = %deadline.to_rfc3339(),
        "🎬 SEQUENCER_TRANSITION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
