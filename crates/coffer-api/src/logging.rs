//! Logging configuration for Coffer
//!
//! The engine emits `tracing` events; this module installs a subscriber for
//! applications that do not set up their own. Flushes, snapshots and
//! per-container restores log at `debug`, storage open and restore
//! completion at `info`, dropped WAL tails at `warn`.

use coffer_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output destination
#[derive(Debug, Clone)]
pub enum LogOutput {
    /// Output to stdout
    Stdout,
    /// Output to a daily-rotated file
    File(PathBuf),
    /// Output to both stdout and file
    Both(PathBuf),
}

/// Log format style
#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    /// Human-readable multi-line format
    Pretty,
    /// Compact single-line format
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `coffer_storage=debug`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Output destination
    pub output: LogOutput,
    /// Format style
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Stdout,
            format: LogFormat::Compact,
        }
    }
}

impl LogConfig {
    /// Info level on stdout
    pub fn info() -> Self {
        Self::default()
    }

    /// Debug level on stdout; shows every flush, snapshot and restore
    pub fn debug() -> Self {
        Self::default().with_level("debug")
    }

    /// Set log output to a daily-rotated file
    pub fn with_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = LogOutput::File(path.into());
        self
    }

    /// Set log output to both stdout and a daily-rotated file
    pub fn with_both<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = LogOutput::Both(path.into());
        self
    }

    /// Set log format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set log level filter
    pub fn with_level<S: Into<String>>(mut self, level: S) -> Self {
        self.level = level.into();
        self
    }

    fn filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| Error::InvalidOperation(format!("Invalid log filter '{}': {}", self.level, e)))
    }

    /// Install this configuration as the global subscriber.
    ///
    /// When logging to a file, the returned guard must be kept alive; the
    /// background writer stops once it is dropped. Fails if the filter does
    /// not parse or a global subscriber is already set.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use coffer::logging::LogConfig;
    ///
    /// let _guard = LogConfig::debug().with_file("logs/coffer.log").init()?;
    /// # Ok::<(), coffer::Error>(())
    /// ```
    pub fn init(self) -> Result<Option<WorkerGuard>> {
        let filter = self.filter()?;
        let directives = filter.to_string();

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if matches!(self.output, LogOutput::Stdout | LogOutput::Both(_)) {
            layers.push(fmt_layer(self.format, std::io::stdout));
        }
        if let LogOutput::File(path) | LogOutput::Both(path) = &self.output {
            let (directory, file_name) = split_log_path(path);
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            layers.push(fmt_layer(self.format, writer));
            guard = Some(file_guard);
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| Error::InvalidOperation(format!("Failed to install logger: {}", e)))?;

        tracing::info!(filter = %directives, output = ?self.output, format = ?self.format, "Logging initialized");
        Ok(guard)
    }
}

fn fmt_layer<W>(format: LogFormat, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer().with_writer(writer).pretty().boxed(),
        LogFormat::Compact => fmt::layer().with_writer(writer).compact().boxed(),
    }
}

fn split_log_path(path: &Path) -> (&Path, &str) {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("coffer.log");
    (directory, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(matches!(config.output, LogOutput::Stdout));
    }

    #[test]
    fn test_log_config_builders() {
        let config = LogConfig::debug()
            .with_file("/tmp/coffer.log")
            .with_format(LogFormat::Pretty);
        assert_eq!(config.level, "debug");
        assert!(matches!(config.output, LogOutput::File(_)));
        assert!(matches!(config.format, LogFormat::Pretty));
    }

    // The only test in this crate that installs a global subscriber
    #[test]
    fn test_init_installs_once() {
        let guard = LogConfig::default().init().unwrap();
        assert!(guard.is_none());

        let again = LogConfig::default().init();
        assert!(matches!(again, Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_split_log_path() {
        assert_eq!(
            split_log_path(Path::new("logs/app.log")),
            (Path::new("logs"), "app.log")
        );
        assert_eq!(split_log_path(Path::new("app.log")), (Path::new("."), "app.log"));
    }
}
