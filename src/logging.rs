//! Structured logging setup.
//!
//! Events are emitted with `tracing` and formatted by `tracing-subscriber`,
//! either as JSON lines (production) or pretty-printed (development). A copy
//! of every event can also be written to a plain-text file through a
//! non-blocking `tracing-appender` writer.
//!
//! Operators think in syslog severities, so lifecycle events are tagged with
//! an RFC 5424 [`Severity`] via [`log_at!`](crate::log_at), which maps it onto
//! the nearest `tracing` level and records the numeric severity as a field.
//!
//! ## Environment Variables
//!
//! - `COBBLE_LOG_LEVEL`: trace/debug/info/warn/error (default `info`); `RUST_LOG` wins when set
//! - `COBBLE_LOG_FORMAT`: json/pretty (default `json`)
//! - `COBBLE_LOG_FILE`: optional path of a file receiving a plain-text copy
//! - `COBBLE_LOG_INCLUDE_LOCATION`: include file:line (default `false`)

use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// RFC 5424 severities, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Informational = 6,
    Debug = 7,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Emergency => "emergency",
            Severity::Alert => "alert",
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Informational => "informational",
            Severity::Debug => "debug",
        }
    }

    /// Numeric code as defined by RFC 5424.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Emit a `tracing` event tagged with an RFC 5424 severity.
///
/// ```rust,ignore
/// log_at!(Severity::Notice, version = env!("CARGO_PKG_VERSION"), "Cobble starting");
/// ```
#[macro_export]
macro_rules! log_at {
    ($severity:expr, $($arg:tt)+) => {{
        let severity: $crate::logging::Severity = $severity;
        match severity {
            $crate::logging::Severity::Emergency
            | $crate::logging::Severity::Alert
            | $crate::logging::Severity::Critical
            | $crate::logging::Severity::Error => ::tracing::error!(
                severity = severity.as_str(),
                syslog = severity.code(),
                $($arg)+
            ),
            $crate::logging::Severity::Warning => ::tracing::warn!(
                severity = severity.as_str(),
                syslog = severity.code(),
                $($arg)+
            ),
            $crate::logging::Severity::Notice | $crate::logging::Severity::Informational => {
                ::tracing::info!(
                    severity = severity.as_str(),
                    syslog = severity.code(),
                    $($arg)+
                )
            }
            $crate::logging::Severity::Debug => ::tracing::debug!(
                severity = severity.as_str(),
                syslog = severity.code(),
                $($arg)+
            ),
        }
    }};
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level: trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    /// Plain-text copy of every event
    pub file: Option<PathBuf>,
    /// Include file:line location (dev only)
    pub include_location: bool,
}

impl LogConfig {
    /// Parse configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("COBBLE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: LogFormat::parse(
                &env::var("COBBLE_LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
            ),
            file: env::var_os("COBBLE_LOG_FILE").map(PathBuf::from),
            include_location: env::var("COBBLE_LOG_INCLUDE_LOCATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
        }
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

/// Keeps the non-blocking writers flushing; drop it last.
#[must_use = "dropping the guard stops log delivery"]
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level().as_str()));

    let mut guards = Vec::with_capacity(2);
    let (stdout, guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(guard);

    let stdout_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(stdout)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(stdout)
            .boxed(),
    };

    let file_layer = match &config.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            guards.push(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(LogGuard { _guards: guards })
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Log an error and every cause beneath it, outermost first, one event per level.
pub fn log_error_chain(severity: Severity, context: &str, err: &(dyn std::error::Error + 'static)) {
    let mut current = Some(err);
    let mut depth = 0usize;
    while let Some(cause) = current {
        crate::log_at!(severity, depth, error = %cause, "{context}");
        current = cause.source();
        depth += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Json);
    }

    #[test]
    fn test_severity_order_and_codes() {
        assert!(Severity::Emergency < Severity::Debug);
        assert_eq!(Severity::Emergency.code(), 0);
        assert_eq!(Severity::Warning.code(), 4);
        assert_eq!(Severity::Debug.code(), 7);
        assert_eq!(Severity::Notice.as_str(), "notice");
    }

    #[test]
    fn test_config_level_fallback() {
        let mut config = LogConfig {
            log_level: "DEBUG".into(),
            format: LogFormat::Pretty,
            file: None,
            include_location: true,
        };
        assert_eq!(config.level(), Level::DEBUG);
        config.log_level = "verbose".into();
        assert_eq!(config.level(), Level::INFO);
    }

    #[test]
    fn test_error_chain_walk_without_subscriber() {
        let err = anyhow::anyhow!("inner").context("outer");
        log_error_chain(Severity::Error, "startup failed", err.as_ref());
    }
}
