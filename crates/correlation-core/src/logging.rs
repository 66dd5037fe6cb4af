//! Logging setup for processes embedding the correlation core
//!
//! The correlators only emit `tracing` events (targets `sdp`, `rtcp`, `log`,
//! `ng`, `cache`, `engine`); installing a subscriber is up to the host.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogSettings;
use crate::error::{CorrelationError, Result};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: Level,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log spans
    pub log_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            log_spans: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    pub fn new(level: Level) -> Self {
        LoggingConfig {
            level,
            ..Default::default()
        }
    }

    /// Build from the `[logging]` section of a [`crate::CorrelatorConfig`]
    pub fn from_settings(settings: &LogSettings) -> Result<Self> {
        let mut config = Self::new(parse_log_level(&settings.level)?);
        config.json = settings.json;
        Ok(config)
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Enable span logging
    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Install a global subscriber with the provided configuration
///
/// Fails instead of panicking when a global subscriber is already set.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|e| CorrelationError::Logging(e.to_string()))
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level)
        .map_err(|_| CorrelationError::InvalidConfig(format!("Invalid log level: {}", level)))
}
