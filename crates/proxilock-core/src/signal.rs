//! Proximity signal classification.
//!
//! A raw scan result enters the system as a [`ScanOutcome`] and is
//! immediately classified against the configured thresholds into a
//! [`ProximitySignal`]. Classification is pure and total; the hysteresis
//! band between the two thresholds maps to [`ProximitySignal::Indeterminate`]
//! so RSSI hovering near a cutoff can never flap the lock state.

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// The result of one discovery sweep for the target device.
///
/// Produced once per scheduler tick, converted at the Bluetooth boundary
/// from whatever the backend reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// The target device was seen with the given signal strength.
    Observed {
        /// Received signal strength in dBm.
        rssi_dbm: i16,
    },
    /// The sweep completed but the target device was not seen.
    NotObserved,
    /// The sweep itself failed (adapter fault, timeout, ...).
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
}

impl ScanOutcome {
    /// The observed RSSI, if any.
    #[must_use]
    pub const fn rssi_dbm(&self) -> Option<i16> {
        match self {
            Self::Observed { rssi_dbm } => Some(*rssi_dbm),
            Self::NotObserved | Self::Failed { .. } => None,
        }
    }

    /// Returns `true` if the sweep completed, whether or not the device
    /// was seen. Only [`ScanOutcome::Failed`] counts against the failure
    /// streak.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// What a single scan outcome says about the device's proximity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximitySignal {
    /// Signal at or above the unlock threshold.
    Near,
    /// Signal at or below the lock threshold, or device absent.
    Far,
    /// Inside the hysteresis band, or no proximity information at all.
    Indeterminate,
}

/// Classify a scan outcome against the configured thresholds.
///
/// - `Observed`: `Near` if `rssi >= unlock_threshold_dbm`, `Far` if
///   `rssi <= lock_threshold_dbm`, otherwise `Indeterminate`.
/// - `NotObserved`: `Far` — absence is treated as maximal distance.
/// - `Failed`: `Indeterminate` — a failure carries no proximity
///   information and must not by itself justify locking or unlocking.
#[must_use]
pub fn evaluate(outcome: &ScanOutcome, config: &Config) -> ProximitySignal {
    match outcome {
        ScanOutcome::Observed { rssi_dbm } => {
            if *rssi_dbm >= config.unlock_threshold_dbm {
                ProximitySignal::Near
            } else if *rssi_dbm <= config.lock_threshold_dbm {
                ProximitySignal::Far
            } else {
                ProximitySignal::Indeterminate
            }
        }
        ScanOutcome::NotObserved => ProximitySignal::Far,
        ScanOutcome::Failed { .. } => ProximitySignal::Indeterminate,
    }
}
