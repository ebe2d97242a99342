//! Service configuration module.
//!
//! Handles loading, validating, and merging the service's TOML config file.
//! Stock defaults are the base layer; a user file only needs the values it
//! wants to override, and command line flags override both.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! host = "0.0.0.0"           # Interface to bind
//! port = 8080                # TCP port (0 = pick a free port)
//!
//! [limits]
//! max_body_bytes = 102400    # Largest accepted request body
//! max_image_width = 1000     # Largest accepted image width in pixels
//! max_image_height = 1000    # Largest accepted image height in pixels
//! connection_timeout_ms = 10000  # Deadline for one connection, accept to response
//!
//! [processing]
//! max_concurrent_requests = 3  # Admission slots (omit for auto = cores - 1)
//! filter_threads = 4           # Color filter workers (omit for auto = cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Listening address.
    pub server: ServerConfig,
    /// Request and image size limits.
    pub limits: LimitsConfig,
    /// Concurrency settings.
    pub processing: ProcessingConfig,
}

impl ServiceConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.host must not be empty".into(),
            ));
        }
        if self.limits.max_body_bytes == 0 {
            return Err(ConfigError::Validation(
                "limits.max_body_bytes must be non-zero".into(),
            ));
        }
        if self.limits.max_image_width == 0 || self.limits.max_image_height == 0 {
            return Err(ConfigError::Validation(
                "limits.max_image_width and limits.max_image_height must be non-zero".into(),
            ));
        }
        if self.limits.connection_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "limits.connection_timeout_ms must be non-zero".into(),
            ));
        }
        if self.processing.max_concurrent_requests == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_concurrent_requests must be at least 1".into(),
            ));
        }
        if self.processing.filter_threads == Some(0) {
            return Err(ConfigError::Validation(
                "processing.filter_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Listening address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // Bare IPv6 literal
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Request and image size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest accepted `Content-Length`, in bytes.
    pub max_body_bytes: usize,
    /// Largest accepted image width, in pixels.
    pub max_image_width: u32,
    /// Largest accepted image height, in pixels.
    pub max_image_height: u32,
    /// How long a connection may take from accept to the end of its response,
    /// in milliseconds. Clients that stall past it are disconnected and their
    /// slot is returned.
    pub connection_timeout_ms: u64,
}

impl LimitsConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 100 * 1024,
            max_image_width: 1000,
            max_image_height: 1000,
            connection_timeout_ms: 10_000,
        }
    }
}

/// Concurrency settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of requests processed at once.
    /// When absent, defaults to one less than the number of CPU cores (at
    /// least 1). Larger values are clamped down to that default.
    pub max_concurrent_requests: Option<usize>,
    /// Threads used by the color filters.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub filter_threads: Option<usize>,
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolve the admission slot count from config.
///
/// - `None` → `max(1, cores - 1)`, leaving a core for the accept loop
/// - `Some(n)` → `min(n, auto)` (user can constrain down, not up)
pub fn effective_slots(config: &ProcessingConfig) -> usize {
    let auto = available_cores().saturating_sub(1).max(1);
    config
        .max_concurrent_requests
        .map(|n| n.clamp(1, auto))
        .unwrap_or(auto)
}

/// Resolve the color filter thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = available_cores();
    config
        .filter_threads
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ServiceConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ServiceConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ServiceConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the service config.
///
/// With no path the stock defaults are used. A given path must exist; its
/// values are merged on top of the stock defaults, unknown keys are rejected,
/// and the result is validated.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = path.map(load_raw_config).transpose()?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Image Transformer Configuration
# ===============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Pass this file with `image-transformer --config <FILE> serve`.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Listening address
# ---------------------------------------------------------------------------
[server]
# Interface to bind. Use "127.0.0.1" to accept local connections only.
host = "0.0.0.0"
# TCP port. 0 asks the OS for a free port.
port = 8080

# ---------------------------------------------------------------------------
# Request limits
# ---------------------------------------------------------------------------
[limits]
# Largest accepted request body (Content-Length), in bytes.
max_body_bytes = 102400
# Largest accepted image dimensions, in pixels.
max_image_width = 1000
max_image_height = 1000
# Milliseconds a connection may take from accept until its response is
# written. Slow or idle clients are disconnected and free their slot.
connection_timeout_ms = 10000

# ---------------------------------------------------------------------------
# Concurrency
# ---------------------------------------------------------------------------
[processing]
# Requests processed at once. Requests beyond this are answered with
# 429 Too Many Requests immediately, never queued.
# Omit for auto: one less than the number of CPU cores (at least 1).
# Values above auto are clamped down.
# max_concurrent_requests = 3

# Threads used by the grayscale, sepia and threshold filters.
# Omit for auto: number of CPU cores. Values above that are clamped down.
# filter_threads = 4
"##
}
