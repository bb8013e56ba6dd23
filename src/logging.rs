//! # Structured Logging
//!
//! Environment-aware structured logging for pipeline runs: a human-readable
//! console layer plus a JSON file layer under `log/`. Worker threads log inside
//! a span carrying `run_id` and the worker name, so interleaved stages can be
//! separated after the fact.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ConfigManager;

static LOGGER_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

const LOG_DIR: &str = "log";

/// Initialize console and JSON file logging once per process
///
/// `RUST_LOG` takes precedence over the environment's default level. If another
/// global subscriber is already installed the call leaves it in place.
pub fn init_structured_logging() {
    init_structured_logging_in(Path::new(LOG_DIR));
}

/// Same as [`init_structured_logging`], writing files under `log_dir`
pub fn init_structured_logging_in(log_dir: &Path) {
    LOGGER_GUARD.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let (subscriber, guard, log_path) = build_subscriber(log_dir, &environment);

        if subscriber.try_init().is_ok() {
            tracing::info!(
                pid = process::id(),
                environment = %environment,
                log_file = ?log_path,
                "LOGGING: Initialized"
            );
        } else {
            tracing::debug!("LOGGING: Global subscriber already set, keeping it");
        }
        guard
    });
}

/// Console layer plus, when `log_dir` is writable, a JSON file layer
fn build_subscriber(
    log_dir: &Path,
    environment: &str,
) -> (
    impl tracing::Subscriber + Send + Sync + 'static,
    Option<WorkerGuard>,
    Option<PathBuf>,
) {
    let level = log_level(environment);

    let console = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_filter(env_filter(level));

    let (file_layer, guard, log_path) = match file_writer(log_dir, environment) {
        Some((writer, guard, path)) => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .json()
                .with_filter(env_filter(level));
            (Some(layer), Some(guard), Some(path))
        }
        None => (None, None, None),
    };

    let subscriber = tracing_subscriber::registry().with(console).with(file_layer);
    (subscriber, guard, log_path)
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn file_writer(
    log_dir: &Path,
    environment: &str,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard, PathBuf)> {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("LOGGING: Cannot create {}: {e}; file logging disabled", log_dir.display());
        return None;
    }

    let file_name = log_file_name(environment);
    let path = log_dir.join(&file_name);
    let appender = tracing_appender::rolling::never(log_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Some((writer, guard, path))
}

fn log_file_name(environment: &str) -> String {
    format!(
        "{}.{}.{}.log",
        environment,
        process::id(),
        Utc::now().format("%Y%m%d_%H%M%S")
    )
}

/// Default level for an environment name
fn log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(log_level("production"), "info");
        assert_eq!(log_level("test"), "debug");
        assert_eq!(log_level("development"), "debug");
        assert_eq!(log_level("unknown"), "debug");
    }

    #[test]
    fn test_log_file_name_carries_environment_and_pid() {
        let name = log_file_name("staging");
        assert!(name.starts_with("staging."));
        assert!(name.contains(&process::id().to_string()));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn test_file_layer_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let (subscriber, guard, log_path) = build_subscriber(dir.path(), "test");

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(batch_len = 3, "LOGGING: scoped message");
        });
        drop(guard);

        let contents = fs::read_to_string(log_path.unwrap()).unwrap();
        let line = contents
            .lines()
            .find(|line| line.contains("LOGGING: scoped message"))
            .unwrap();
        let entry: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(entry["level"], "WARN");
        assert_eq!(entry["fields"]["batch_len"], 3);
    }
}
