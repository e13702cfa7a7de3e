//! Unified error types for the proxilock core library.
//!
//! [`ProxilockError`] covers the failure modes that escape to the caller.
//! Modules keep their own specific error types ([`ConfigError`],
//! [`ActionError`]) for internal use; conversions into the unified type
//! live here.
//!
//! Recoverable conditions never reach this type: a failed scan becomes a
//! `ScanOutcome::Failed` and is folded into the failure-streak mechanism,
//! and a failed OS action is counted in statistics without stopping the
//! loop. Only configuration faults and scheduler-level faults escape.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::ActionError;

/// The unified error type for proxilock operations.
#[derive(Debug, Error)]
pub enum ProxilockError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The configuration was parsed but contains invalid values.
    #[error("configuration validation failed: {0}")]
    ConfigValidation(String),

    /// The Bluetooth adapter could not be initialized.
    #[error("bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// An OS lock/wake call failed.
    #[error("session action failed: {0}")]
    Action(#[from] ActionError),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for proxilock operations.
pub type Result<T> = std::result::Result<T, ProxilockError>;

impl ProxilockError {
    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParse(_) | Self::ConfigValidation(_)
        )
    }

    /// Returns `true` if this error is likely recoverable without user
    /// intervention. Configuration faults are fatal by design.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::AdapterUnavailable(_) | Self::Action(_))
    }
}

impl From<ConfigError> for ProxilockError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::Read { path, source } => {
                Self::ConfigParse(format!("failed to read {}: {source}", path.display()))
            }
            ConfigError::Parse(e) => Self::ConfigParse(e.to_string()),
            ConfigError::Validation { field, message } => {
                Self::ConfigValidation(format!("{field}: {message}"))
            }
        }
    }
}
