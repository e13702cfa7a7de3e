//! # proxilock-core
//!
//! Core logic for the proxilock proximity lock system: infer a user's
//! physical presence from periodic Bluetooth RSSI samples of a paired
//! device and drive the session lock accordingly — lock when the device
//! leaves range, wake when it returns.
//!
//! This crate provides:
//! - Signal classification of raw scan outcomes against RSSI thresholds
//! - The debounce/hysteresis state machine that filters noise, missed
//!   scans and adapter faults into stable lock/unlock transitions
//! - Action dispatch with at-most-once issuance per transition
//! - The fixed-interval scan loop with lifecycle and cancellation
//! - Run statistics and the event recorder seam
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`signal`] - `ScanOutcome` classification into proximity signals
//! - [`engine`] - the debounce & hysteresis state machine
//! - [`dispatch`] - OS action dispatch behind the `SessionControl` seam
//! - [`scan`] - scan sources (BlueZ-backed and scripted)
//! - [`scheduler`] - the scan loop controller and its lifecycle
//! - [`stats`] - run statistics and the `EventRecorder` seam
//! - [`config`] - configuration loading and validation
//! - [`error`] - unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod scan;
pub mod scheduler;
pub mod signal;
pub mod stats;

// Re-export primary types for convenience
pub use config::{is_valid_mac_address, Config, ConfigError, ConfigResult};
pub use dispatch::{ActionDispatcher, ActionError, SessionControl};
pub use engine::{DebounceEngine, LockState, TransitionEvent};
pub use error::{ProxilockError, Result};
#[cfg(feature = "bluetooth")]
pub use scan::{BleScanSource, DiscoveredDevice};
pub use scan::{ScanSource, ScriptedScanSource};
pub use scheduler::{shutdown_channel, LoopPhase, ProximityController};
pub use signal::{evaluate, ProximitySignal, ScanOutcome};
pub use stats::{EventRecorder, NullRecorder, RunStatistics};
