//! Logging configuration and initialization
//!
//! All binaries in the workspace log through `tracing`. This module turns a
//! [`LogConfig`] into a global subscriber with up to two sinks:
//!
//! - console (stdout), human-readable text or JSON
//! - a daily rolling file under `log_dir`, same format, never colored
//!
//! Use structured fields rather than interpolated strings:
//!
//! ```rust,ignore
//! info!(trip = %identity, rows = points.len(), "Track written");
//! warn!(key = %raw_key, error = %e, "Skipping malformed key");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use trip_common::logging::{init_logging, LogConfig};
//!
//! let config = LogConfig::from_env().unwrap_or_default();
//! let _guard = init_logging(&config).unwrap();
//! tracing::info!("started");
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::error::{CommonError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Minimum level of emitted events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(CommonError::Logging(format!("invalid log level: {}", s))),
        }
    }
}

/// Where log events are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    fn console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

impl FromStr for LogOutput {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(CommonError::Logging(format!("invalid log output: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(CommonError::Logging(format!("invalid log format: {}", s))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub output: LogOutput,
    pub format: LogFormat,
    /// Directory for rolling log files (only used when output includes file)
    pub log_dir: PathBuf,
    /// File name prefix, e.g. "trip-migrate" -> "trip-migrate.2025-09-01"
    pub log_file_prefix: String,
    /// Extra filter directives, e.g. "sqlx=warn,trip_pipeline=debug"
    pub filter_directives: Option<String>,
    pub include_location: bool,
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "trip-archive".to_string(),
            filter_directives: None,
            include_location: false,
            include_targets: true,
        }
    }
}

impl LogConfig {
    /// Overlay `LOG_*` environment variables onto `self`.
    ///
    /// - `LOG_LEVEL`: trace, debug, info, warn, error
    /// - `LOG_OUTPUT`: console, file, both
    /// - `LOG_FORMAT`: text, json
    /// - `LOG_DIR`, `LOG_FILE_PREFIX`, `LOG_FILTER`
    /// - `LOG_INCLUDE_LOCATION`, `LOG_INCLUDE_TARGETS`: true/false
    pub fn merge_env(mut self) -> Result<Self> {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.level = level.parse()?;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.output = output.parse()?;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Ok(prefix) = std::env::var("LOG_FILE_PREFIX") {
            self.log_file_prefix = prefix;
        }
        if let Ok(filter) = std::env::var("LOG_FILTER") {
            self.filter_directives = Some(filter);
        }
        if let Ok(val) = std::env::var("LOG_INCLUDE_LOCATION") {
            self.include_location = val.parse().unwrap_or(self.include_location);
        }
        if let Ok(val) = std::env::var("LOG_INCLUDE_TARGETS") {
            self.include_targets = val.parse().unwrap_or(self.include_targets);
        }
        Ok(self)
    }

    /// Defaults overlaid with the environment.
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    fn filter(&self) -> Result<EnvFilter> {
        let mut filter =
            EnvFilter::from_default_env().add_directive(self.level.to_tracing_level().into());

        if let Some(ref directives) = self.filter_directives {
            for directive in directives.split(',').filter(|d| !d.trim().is_empty()) {
                let parsed = directive.trim().parse().map_err(|e| {
                    CommonError::Logging(format!("bad filter directive '{}': {}", directive, e))
                })?;
                filter = filter.add_directive(parsed);
            }
        }

        Ok(filter)
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(self.include_targets)
            .with_file(self.include_location)
            .with_line_number(self.include_location)
            .with_span_events(FmtSpan::CLOSE);

        match self.format {
            LogFormat::Text => layer.boxed(),
            LogFormat::Json => layer.json().boxed(),
        }
    }
}

#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_file_prefix = prefix.into();
        self
    }

    pub fn filter_directives(mut self, filter: impl Into<String>) -> Self {
        self.config.filter_directives = Some(filter.into());
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Keeps the non-blocking file writer flushing. Hold it until exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber. Call once, at startup.
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;

    if config.output.console() {
        layers.push(config.layer(std::io::stdout, true));
    }

    if config.output.file() {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(config.layer(writer, false));
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(config.filter()?)
        .try_init()
        .map_err(|e| CommonError::Logging(e.to_string()))?;

    Ok(LogGuard { _file: file_guard })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enums() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("stdout".parse::<LogOutput>().unwrap(), LogOutput::Console);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("loud".parse::<LogLevel>().is_err());
        assert!("syslog".parse::<LogOutput>().is_err());
    }

    #[test]
    fn test_output_sinks() {
        assert!(LogOutput::Both.console() && LogOutput::Both.file());
        assert!(!LogOutput::Console.file());
        assert!(!LogOutput::File.console());
    }

    #[test]
    fn test_builder_and_filter() {
        let config = LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::File)
            .log_file_prefix("trip-migrate")
            .filter_directives("sqlx=warn, trip_pipeline=trace")
            .build();

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.log_file_prefix, "trip-migrate");
        assert!(config.filter().is_ok());

        let bad = LogConfig::builder().filter_directives("sqlx=[[").build();
        assert!(bad.filter().is_err());
    }
}
