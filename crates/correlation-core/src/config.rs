//! Configuration for the correlation engine
//!
//! Supports loading from a JSON or TOML file and overriding single values
//! through `RVOIP_CORRELATOR_*` environment variables.

use serde::{Deserialize, Serialize};

use crate::error::{CorrelationError, Result};

/// Default byte budget of every correlation cache (30 MiB)
pub const DEFAULT_CACHE_BYTES: u64 = 30 * 1024 * 1024;

/// Prefix of all environment overrides
pub const ENV_PREFIX: &str = "RVOIP_CORRELATOR_";

/// Main configuration for the correlation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Byte budget of the SDP address/port cache
    pub address_port_cache_bytes: u64,
    /// Byte budget of the SSRC cache
    pub ssrc_cache_bytes: u64,
    /// Byte budget of the NG cookie cache
    pub cookie_cache_bytes: u64,
    /// Logging settings
    pub logging: LogSettings,
}

/// Logging section of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Level name understood by [`crate::logging::parse_log_level`]
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            address_port_cache_bytes: DEFAULT_CACHE_BYTES,
            ssrc_cache_bytes: DEFAULT_CACHE_BYTES,
            cookie_cache_bytes: DEFAULT_CACHE_BYTES,
            logging: LogSettings::default(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl CorrelatorConfig {
    /// Load configuration from a `.json` or `.toml` file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CorrelationError::ConfigIo(format!("{}: {}", path, e)))?;

        let config: Self = if path.ends_with(".json") {
            serde_json::from_str(&contents)
                .map_err(|e| CorrelationError::ConfigParse(e.to_string()))?
        } else if path.ends_with(".toml") {
            toml::from_str(&contents)
                .map_err(|e| CorrelationError::ConfigParse(e.to_string()))?
        } else {
            return Err(CorrelationError::ConfigParse(format!(
                "Unsupported configuration format: {}",
                path
            )));
        };

        config.validate()?;
        Ok(config)
    }

    /// Load defaults and apply environment overrides
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok())
    }

    /// Apply overrides looked up by variable name (without the prefix)
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ADDRESS_PORT_CACHE_BYTES") {
            self.address_port_cache_bytes = parse_bytes("ADDRESS_PORT_CACHE_BYTES", &value)?;
        }
        if let Some(value) = lookup("SSRC_CACHE_BYTES") {
            self.ssrc_cache_bytes = parse_bytes("SSRC_CACHE_BYTES", &value)?;
        }
        if let Some(value) = lookup("COOKIE_CACHE_BYTES") {
            self.cookie_cache_bytes = parse_bytes("COOKIE_CACHE_BYTES", &value)?;
        }
        if let Some(value) = lookup("LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = lookup("LOG_JSON") {
            self.logging.json = matches!(value.as_str(), "1" | "true" | "yes");
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject budgets that would make a cache unusable
    pub fn validate(&self) -> Result<()> {
        for (name, bytes) in [
            ("address_port_cache_bytes", self.address_port_cache_bytes),
            ("ssrc_cache_bytes", self.ssrc_cache_bytes),
            ("cookie_cache_bytes", self.cookie_cache_bytes),
        ] {
            if bytes == 0 {
                return Err(CorrelationError::InvalidConfig(format!("{} must be > 0", name)));
            }
        }
        Ok(())
    }
}

fn parse_bytes(name: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        CorrelationError::InvalidConfig(format!("{}{}={} is not a byte count", ENV_PREFIX, name, value))
    })
}
