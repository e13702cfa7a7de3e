//! Application configuration management.
//!
//! Handles loading and validating the proxilock configuration:
//! - Bluetooth device to track (MAC address)
//! - Lock/unlock RSSI thresholds (the hysteresis band)
//! - Scan timing (interval and per-scan timeout)
//! - Failure tolerance before the fail-safe lock
//!
//! The configuration is immutable for the lifetime of a run. Validation
//! happens at load time; the controller refuses to start on an invalid
//! config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Colon-separated MAC address, e.g. `28:D2:5A:A1:29:6E`.
static MAC_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("valid regex"));

/// Returns `true` if `address` is a well-formed Bluetooth MAC address.
#[must_use]
pub fn is_valid_mac_address(address: &str) -> bool {
    MAC_ADDRESS_RE.is_match(address)
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("configuration file not found at: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file could not be parsed as TOML.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A configuration value failed validation.
    #[error("invalid configuration: {field}: {message}")]
    Validation {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

/// A specialized result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main proxilock configuration.
///
/// Thresholds are RSSI values in dBm (more negative = farther away).
/// `unlock_threshold_dbm` must be strictly greater than
/// `lock_threshold_dbm`; the interval between them is the hysteresis band
/// in which no action is taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth MAC address of the tracked device.
    pub target_address: String,

    /// Lock when RSSI drops to or below this value.
    pub lock_threshold_dbm: i16,

    /// Unlock when RSSI rises to or above this value.
    pub unlock_threshold_dbm: i16,

    /// Seconds between scan cycles.
    pub scan_interval_secs: f64,

    /// Seconds to wait for each discovery sweep.
    pub scan_timeout_secs: f64,

    /// Consecutive scan failures before the fail-safe lock fires.
    pub consecutive_fail_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_address: String::new(),
            lock_threshold_dbm: -80,
            unlock_threshold_dbm: -70,
            scan_interval_secs: 5.0,
            scan_timeout_secs: 3.0,
            consecutive_fail_threshold: 2,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, unparseable,
    /// or fails validation.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    ///
    /// Note that the default config has an empty `target_address` and will
    /// not pass validation until one is set.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        match Self::load(&path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::Validation`] naming the first offending
    /// field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.target_address.is_empty() {
            return Err(Self::invalid("target_address", "must not be empty"));
        }
        if !is_valid_mac_address(&self.target_address) {
            return Err(Self::invalid(
                "target_address",
                format!("'{}' is not a valid MAC address", self.target_address),
            ));
        }
        if self.unlock_threshold_dbm <= self.lock_threshold_dbm {
            return Err(Self::invalid(
                "unlock_threshold_dbm",
                format!(
                    "must be greater than lock_threshold_dbm ({} <= {})",
                    self.unlock_threshold_dbm, self.lock_threshold_dbm
                ),
            ));
        }
        if self.scan_interval_secs <= 0.0 || !self.scan_interval_secs.is_finite() {
            return Err(Self::invalid("scan_interval_secs", "must be positive"));
        }
        if self.scan_timeout_secs <= 0.0 || !self.scan_timeout_secs.is_finite() {
            return Err(Self::invalid("scan_timeout_secs", "must be positive"));
        }
        if self.consecutive_fail_threshold == 0 {
            return Err(Self::invalid(
                "consecutive_fail_threshold",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Time between scan cycles.
    #[must_use]
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs_f64(self.scan_interval_secs)
    }

    /// Wall-clock bound on a single discovery sweep.
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.scan_timeout_secs)
    }

    /// Get the default configuration file path.
    ///
    /// On Linux: `/etc/proxilock/config.toml`.
    /// Elsewhere (development): the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no config directory can be determined.
    pub fn default_path() -> ConfigResult<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from("/etc/proxilock/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "proxilock").ok_or_else(|| {
                ConfigError::Validation {
                    field: "config_path".into(),
                    message: "cannot determine config directory".into(),
                }
            })?;
            Ok(dirs.config_dir().join("config.toml"))
        }
    }

    fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
        ConfigError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}
