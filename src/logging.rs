//! Logging System
//!
//! Structured logging on top of `tracing`. Level, format and destination come from
//! [`LoggingConfig`] and may be overridden through `CTXMED_LOG*` environment variables.

use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (if output is "file")
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Enable colored output (text format only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("ctxmed.log")
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination {
    Stdout,
    Stderr,
    File,
}

/// Install the global `tracing` subscriber.
///
/// `CTXMED_LOG`, `CTXMED_LOG_FORMAT`, `CTXMED_LOG_OUTPUT` and `CTXMED_LOG_MODULES`
/// take precedence over `config`, which takes precedence over the defaults. A second
/// call leaves the first subscriber in place.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ContextError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);

    let filter = build_env_filter(config)?;
    let format = env_override("CTXMED_LOG_FORMAT")
        .map(|value| parse_format(&value))
        .unwrap_or_else(|| parse_format(&config.format))?;
    let destination = env_override("CTXMED_LOG_OUTPUT")
        .map(|value| parse_destination(&value))
        .unwrap_or_else(|| parse_destination(&config.output))?;

    let (writer, ansi) = match destination {
        Destination::Stdout => (BoxMakeWriter::new(std::io::stdout), config.color),
        Destination::Stderr => (BoxMakeWriter::new(std::io::stderr), config.color),
        Destination::File => (BoxMakeWriter::new(Arc::new(open_log_file(&config.file)?)), false),
    };

    let (json, text) = match format {
        LogFormat::Json => (
            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            ),
            None,
        ),
        LogFormat::Text => (
            None,
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(ansi)
                    .with_writer(writer),
            ),
        ),
    };

    if let Err(e) = Registry::default().with(filter).with(json).with(text).try_init() {
        tracing::debug!(error = %e, "Logging already initialized");
    }

    Ok(())
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn open_log_file(path: &Path) -> Result<File, ContextError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ContextError::Config(format!("cannot create log directory: {}", e)))?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ContextError::Config(format!("cannot open log file {}: {}", path.display(), e)))
}

fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, ContextError> {
    if let Ok(filter) = EnvFilter::try_from_env("CTXMED_LOG") {
        return Ok(filter);
    }

    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let env_modules = env_override("CTXMED_LOG_MODULES").unwrap_or_default();
    let env_pairs = env_modules
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(module, level)| (module.trim().to_string(), level.trim().to_string()));
    let config_pairs = config
        .modules
        .iter()
        .map(|(module, level)| (module.clone(), level.clone()));

    config_pairs
        .chain(env_pairs)
        .try_fold(EnvFilter::new(&config.level), |filter, (module, level)| {
            let directive: Directive = format!("{}={}", module, level)
                .parse()
                .map_err(|e| ContextError::Config(format!("invalid log directive for {}: {}", module, e)))?;
            Ok(filter.add_directive(directive))
        })
}

fn parse_format(format: &str) -> Result<LogFormat, ContextError> {
    match format {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(ContextError::Config(format!(
            "invalid log format '{}', expected text or json",
            other
        ))),
    }
}

fn parse_destination(output: &str) -> Result<Destination, ContextError> {
    match output {
        "stdout" => Ok(Destination::Stdout),
        "stderr" => Ok(Destination::Stderr),
        "file" => Ok(Destination::File),
        other => Err(ContextError::Config(format!(
            "invalid log output '{}', expected stdout, stderr or file",
            other
        ))),
    }
}
