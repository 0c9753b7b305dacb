//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! for the CNC telemetry server.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cnc_common::config::{ConfigError, ServerConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = ServerConfig::from_file(Path::new("cnc_server.toml"))?;
//!     println!("Endpoint: {}", config.server.endpoint);
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_ENDPOINT, DEFAULT_NAMESPACE_URI, DEFAULT_SERVICE_NAME, ENDPOINT_SCHEME,
    HEARTBEAT_PERIOD_MS, LINE_DELAY_MS, SETTLE_DELAY_MS, UI_REFRESH_MS,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_filter(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "cnc_concept_turn_155_one"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_namespace_uri() -> String {
    DEFAULT_NAMESPACE_URI.to_string()
}

fn default_heartbeat_period_ms() -> u64 {
    HEARTBEAT_PERIOD_MS
}

fn default_line_delay_ms() -> u64 {
    LINE_DELAY_MS
}

fn default_settle_delay_ms() -> u64 {
    SETTLE_DELAY_MS
}

fn default_ui_refresh_ms() -> u64 {
    UI_REFRESH_MS
}

/// Endpoint section (`[server]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    /// Endpoint URL the information model is exposed on.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Namespace URI registered for all CNC nodes.
    #[serde(default = "default_namespace_uri")]
    pub namespace_uri: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            namespace_uri: default_namespace_uri(),
        }
    }
}

/// Timing section (`[timing]`). All values in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingConfig {
    /// Heartbeat period.
    #[serde(default = "default_heartbeat_period_ms")]
    pub heartbeat_period_ms: u64,

    /// Pacing delay after each executed G-code line.
    #[serde(default = "default_line_delay_ms")]
    pub line_delay_ms: u64,

    /// Pause after referencing before reporting completion.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// UI mirror refresh period.
    #[serde(default = "default_ui_refresh_ms")]
    pub ui_refresh_ms: u64,
}

impl TimingConfig {
    /// Heartbeat period as Duration.
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }

    /// Per-line pacing delay as Duration.
    pub fn line_delay(&self) -> Duration {
        Duration::from_millis(self.line_delay_ms)
    }

    /// Referencing settle delay as Duration.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// UI refresh period as Duration.
    pub fn ui_refresh(&self) -> Duration {
        Duration::from_millis(self.ui_refresh_ms)
    }

    /// Timing with every delay set to zero and minimal periods.
    ///
    /// Used for dry runs where pacing is irrelevant.
    pub fn immediate() -> Self {
        Self {
            heartbeat_period_ms: 1,
            line_delay_ms: 0,
            settle_delay_ms: 0,
            ui_refresh_ms: 1,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_period_ms: HEARTBEAT_PERIOD_MS,
            line_delay_ms: LINE_DELAY_MS,
            settle_delay_ms: SETTLE_DELAY_MS,
            ui_refresh_ms: UI_REFRESH_MS,
        }
    }
}

/// Server configuration loaded from `cnc_server.toml`.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "cnc_concept_turn_155_one"
///
/// [server]
/// endpoint = "opc.tcp://localhost:4840/cnc_concept_turn_155_one"
/// namespace_uri = "cnc_concept_turn_155_one"
///
/// [timing]
/// line_delay_ms = 500
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Shared logging / identity section.
    pub shared: SharedConfig,

    /// Endpoint and namespace.
    #[serde(default)]
    pub server: EndpointConfig,

    /// Periods and delays.
    #[serde(default)]
    pub timing: TimingConfig,
}

impl ServerConfig {
    /// Load and validate a server configuration file.
    ///
    /// # Errors
    ///
    /// Any `ConfigError` from loading or validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        debug!("Loaded server config from {:?}", path);
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    /// - `endpoint` is empty or does not use the `opc.tcp://` scheme
    /// - `namespace_uri` is empty
    /// - `heartbeat_period_ms` or `ui_refresh_ms` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.server.endpoint.is_empty() {
            return Err(ConfigError::ValidationError(
                "endpoint cannot be empty".to_string(),
            ));
        }
        if !self.server.endpoint.starts_with(ENDPOINT_SCHEME) {
            return Err(ConfigError::ValidationError(format!(
                "endpoint '{}' must start with {}",
                self.server.endpoint, ENDPOINT_SCHEME
            )));
        }
        if self.server.namespace_uri.is_empty() {
            return Err(ConfigError::ValidationError(
                "namespace_uri cannot be empty".to_string(),
            ));
        }
        if self.timing.heartbeat_period_ms == 0 {
            return Err(ConfigError::ValidationError(
                "heartbeat_period_ms must be > 0".to_string(),
            ));
        }
        if self.timing.ui_refresh_ms == 0 {
            return Err(ConfigError::ValidationError(
                "ui_refresh_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
