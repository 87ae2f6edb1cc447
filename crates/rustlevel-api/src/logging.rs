//! Logging configuration for rustlevel
//!
//! The engine and handle log through `tracing`. This module installs a global
//! subscriber with level filtering, pretty or compact output, and optional
//! daily-rolled log files.

use rustlevel_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log file name when the configured path has none
const DEFAULT_LOG_FILE: &str = "rustlevel.log";

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    /// Output to stdout
    Stdout,
    /// Output to a file with daily rotation
    File(PathBuf),
    /// Output to both stdout and file
    Both(PathBuf),
}

/// Log format style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human-readable format (default)
    Pretty,
    /// Compact single-line format
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `rustlevel_storage=debug`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub output: LogOutput,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Stdout,
            format: LogFormat::Pretty,
        }
    }
}

impl LogConfig {
    pub fn info() -> Self {
        Self::default()
    }

    pub fn debug() -> Self {
        Self::default().with_level("debug")
    }

    pub fn warn() -> Self {
        Self::default().with_level("warn")
    }

    /// Log to a daily-rolled file instead of stdout
    pub fn with_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = LogOutput::File(path.into());
        self
    }

    /// Log to stdout and a daily-rolled file
    pub fn with_both<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = LogOutput::Both(path.into());
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level<S: Into<String>>(mut self, level: S) -> Self {
        self.level = level.into();
        self
    }

    fn filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| Error::InvalidArgument(format!("invalid log filter {:?}: {}", self.level, e)))
    }

    /// Install the global subscriber.
    ///
    /// File output returns a guard that must stay alive for buffered lines to
    /// be written. Fails if the filter does not parse or a global subscriber
    /// is already installed.
    ///
    /// ```rust,no_run
    /// use rustlevel::logging::LogConfig;
    ///
    /// let _guard = LogConfig::debug().with_file("logs/rustlevel.log").init()?;
    /// # Ok::<(), rustlevel::Error>(())
    /// ```
    pub fn init(self) -> Result<Option<WorkerGuard>> {
        let filter = self.filter()?;
        let registry = tracing_subscriber::registry().with(filter);

        let (result, guard) = match (&self.output, self.format) {
            (LogOutput::Stdout, LogFormat::Pretty) => {
                (registry.with(fmt::layer().pretty()).try_init(), None)
            }
            (LogOutput::Stdout, LogFormat::Compact) => {
                (registry.with(fmt::layer().compact()).try_init(), None)
            }
            (LogOutput::File(path), LogFormat::Pretty) => {
                let (writer, guard) = file_writer(path);
                (
                    registry
                        .with(fmt::layer().with_writer(writer).with_ansi(false).pretty())
                        .try_init(),
                    Some(guard),
                )
            }
            (LogOutput::File(path), LogFormat::Compact) => {
                let (writer, guard) = file_writer(path);
                (
                    registry
                        .with(fmt::layer().with_writer(writer).with_ansi(false).compact())
                        .try_init(),
                    Some(guard),
                )
            }
            (LogOutput::Both(path), _) => {
                // Mixed outputs always use the default single-line layout
                let (writer, guard) = file_writer(path);
                (
                    registry
                        .with(fmt::layer())
                        .with(fmt::layer().with_writer(writer).with_ansi(false))
                        .try_init(),
                    Some(guard),
                )
            }
        };

        result.map_err(|e| Error::InvalidArgument(format!("logging already initialized: {}", e)))?;
        Ok(guard)
    }
}

fn file_writer(path: &Path) -> (NonBlocking, WorkerGuard) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file))
}
