//! # Structured Logging Module
//!
//! Environment-aware structured logging for the dispatch worker. Console output
//! is pretty or JSON, and a JSON file copy can be enabled per configuration.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::{ConfigManager, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Keeps the non-blocking writers alive
///
/// Dropping the handle flushes buffered log lines.
#[derive(Debug, Default)]
pub struct LoggingHandle {
    guards: Vec<WorkerGuard>,
}

impl LoggingHandle {
    /// True when this handle owns the installed writers
    pub fn is_active(&self) -> bool {
        !self.guards.is_empty()
    }

    /// Flush and release the writers
    pub fn shutdown(self) {
        drop(self.guards);
    }
}

/// Initialize structured logging with environment-specific configuration
///
/// Only the first call installs a subscriber. Later calls, or calls made when
/// another global subscriber already exists, return an inactive handle.
pub fn init_structured_logging(config: &LoggingConfig) -> LoggingHandle {
    let mut handle = LoggingHandle::default();

    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let directive = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment));

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guards = Vec::new();

        let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stdout());
        guards.push(console_guard);

        let console = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(config.ansi);
        let console = if config.format == "json" {
            console
                .json()
                .with_filter(build_filter(&directive))
                .boxed()
        } else {
            console
                .pretty()
                .with_filter(build_filter(&directive))
                .boxed()
        };
        layers.push(console);

        let mut log_path = None;
        if let Some(dir) = &config.file_directory {
            let log_dir = PathBuf::from(dir);
            match fs::create_dir_all(&log_dir) {
                Ok(()) => {
                    let log_filename = format!(
                        "{}.{}.{}.log",
                        environment,
                        process::id(),
                        Utc::now().format("%Y%m%d_%H%M%S")
                    );
                    let appender = tracing_appender::rolling::never(&log_dir, &log_filename);
                    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
                    guards.push(file_guard);
                    layers.push(
                        fmt::layer()
                            .with_writer(file_writer)
                            .with_target(true)
                            .with_thread_ids(true)
                            .with_ansi(false)
                            .json()
                            .with_filter(build_filter(&directive))
                            .boxed(),
                    );
                    log_path = Some(log_dir.join(log_filename));
                }
                Err(e) => {
                    eprintln!("Failed to create log directory {}: {e}", log_dir.display());
                }
            }
        }

        if tracing_subscriber::registry().with(layers).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
            return;
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            format = %config.format,
            log_file = log_path.as_ref().map(|p| p.display().to_string()),
            "Structured logging initialized"
        );

        handle.guards = guards;
    });

    handle
}

/// `RUST_LOG` wins over the configured directive
fn build_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log an error with its component and operation
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
