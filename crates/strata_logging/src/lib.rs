//! Shared logging utilities for Strata binaries.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "strata=info,strata_db=info";
const VERBOSE_LOG_FILTER: &str = "strata=debug,strata_db=debug";

/// Logging configuration shared by Strata binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with a daily rolling file writer and stderr output.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for the lifetime of the process. When the log directory cannot be created
/// only the console layer is installed and `None` is returned.
pub fn init_logging(config: LogConfig<'_>) -> Option<WorkerGuard> {
    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        file_filter.clone()
    };

    let mut guard = None;
    let file_layer = match ensure_logs_dir() {
        Ok(dir) => {
            let file_name = format!("{}.log", sanitize_name(config.app_name));
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(file_filter),
            )
        }
        Err(err) => {
            eprintln!("Warning: failed to create logs directory: {:#}", err);
            None
        }
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    guard
}

/// Get the Strata home directory: `$STRATA_HOME` or `~/.strata`.
pub fn strata_home() -> PathBuf {
    resolve_home(std::env::var_os("STRATA_HOME"), dirs::home_dir())
}

fn resolve_home(override_path: Option<OsString>, home: Option<PathBuf>) -> PathBuf {
    if let Some(path) = override_path.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    home.unwrap_or_else(|| PathBuf::from(".")).join(".strata")
}

/// Get the logs directory: `<strata home>/logs`
pub fn logs_dir() -> PathBuf {
    strata_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "strata".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_path_characters() {
        assert_eq!(sanitize_name("strata"), "strata");
        assert_eq!(sanitize_name("strata watch/1"), "strata_watch_1");
        assert_eq!(sanitize_name(""), "strata");
    }

    #[test]
    fn home_override_wins() {
        let home = resolve_home(
            Some(OsString::from("/srv/strata")),
            Some(PathBuf::from("/home/op")),
        );
        assert_eq!(home, PathBuf::from("/srv/strata"));
    }

    #[test]
    fn home_falls_back_to_dot_strata() {
        let home = resolve_home(None, Some(PathBuf::from("/home/op")));
        assert_eq!(home, PathBuf::from("/home/op/.strata"));

        let empty = resolve_home(Some(OsString::new()), Some(PathBuf::from("/home/op")));
        assert_eq!(empty, PathBuf::from("/home/op/.strata"));
    }
}
