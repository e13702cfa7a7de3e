//! Scan sources: where scan outcomes come from.
//!
//! The controller talks to Bluetooth only through the [`ScanSource`]
//! seam. The real implementation ([`BleScanSource`], behind the
//! `bluetooth` feature) drives a BlueZ discovery sweep via `bluer`;
//! [`ScriptedScanSource`] replays a fixed outcome sequence for tests and
//! dry runs. Whatever the backend reports is converted to a
//! [`ScanOutcome`] right here at the boundary — nothing dynamic leaks
//! further in.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use crate::signal::ScanOutcome;

/// Produces one [`ScanOutcome`] per request for a single target device.
///
/// Implementations must complete or fail within `timeout`; the scheduler
/// additionally guards each call with its own timeout and folds expiry
/// into `ScanOutcome::Failed`.
pub trait ScanSource {
    /// One discovery attempt for `target` (a MAC address), bounded by
    /// `timeout`.
    fn scan(
        &mut self,
        target: &str,
        timeout: Duration,
    ) -> impl Future<Output = ScanOutcome> + Send;
}

/// Replays a scripted sequence of outcomes, then reports the device as
/// absent. The timeout is ignored.
#[derive(Debug, Default)]
pub struct ScriptedScanSource {
    outcomes: VecDeque<ScanOutcome>,
}

impl ScriptedScanSource {
    /// Build a source that yields `outcomes` in order.
    #[must_use]
    pub fn new(outcomes: impl IntoIterator<Item = ScanOutcome>) -> Self {
        Self {
            outcomes: outcomes.into_iter().collect(),
        }
    }

    /// Outcomes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.outcomes.len()
    }
}

impl ScanSource for ScriptedScanSource {
    async fn scan(&mut self, _target: &str, _timeout: Duration) -> ScanOutcome {
        self.outcomes.pop_front().unwrap_or(ScanOutcome::NotObserved)
    }
}

#[cfg(feature = "bluetooth")]
pub use ble::{BleScanSource, DiscoveredDevice};

#[cfg(feature = "bluetooth")]
mod ble {
    use std::time::Duration;

    use bluer::{Adapter, AdapterEvent, Address, Session};
    use futures::{pin_mut, StreamExt};
    use serde::{Deserialize, Serialize};
    use tracing::{debug, warn};

    use super::ScanSource;
    use crate::error::{ProxilockError, Result};
    use crate::signal::ScanOutcome;

    /// A device seen during a diagnostic discovery sweep.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DiscoveredDevice {
        /// Bluetooth MAC address.
        pub address: String,
        /// Device name, if broadcast.
        pub name: Option<String>,
        /// Signal strength in dBm, if reported.
        pub rssi_dbm: Option<i16>,
    }

    /// BlueZ-backed scan source.
    ///
    /// Holds one adapter handle for the lifetime of the run. The
    /// scheduler never overlaps calls, which matters here: BlueZ does not
    /// tolerate concurrent discovery sessions on one adapter.
    pub struct BleScanSource {
        adapter: Adapter,
    }

    impl BleScanSource {
        /// Connect to the default Bluetooth adapter and power it on.
        ///
        /// # Errors
        ///
        /// Returns [`ProxilockError::AdapterUnavailable`] if no adapter is
        /// present or it cannot be powered.
        pub async fn new() -> Result<Self> {
            let session = Session::new()
                .await
                .map_err(|e| ProxilockError::AdapterUnavailable(e.to_string()))?;
            let adapter = session
                .default_adapter()
                .await
                .map_err(|e| ProxilockError::AdapterUnavailable(e.to_string()))?;
            adapter
                .set_powered(true)
                .await
                .map_err(|e| ProxilockError::AdapterUnavailable(e.to_string()))?;
            debug!(adapter = %adapter.name(), "bluetooth adapter ready");
            Ok(Self { adapter })
        }

        /// Diagnostic sweep: collect every device seen within `timeout`.
        ///
        /// Used by `proxilockd --list-devices` to help pick a target MAC.
        ///
        /// # Errors
        ///
        /// Returns an error if discovery cannot be started.
        pub async fn discover_devices(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
            let events = self
                .adapter
                .discover_devices()
                .await
                .map_err(|e| ProxilockError::AdapterUnavailable(e.to_string()))?;
            pin_mut!(events);

            let mut addresses = Vec::new();
            let collect = async {
                while let Some(event) = events.next().await {
                    if let AdapterEvent::DeviceAdded(address) = event {
                        addresses.push(address);
                    }
                }
            };
            // The stream only ends when discovery stops; the timeout is
            // what actually bounds the sweep.
            let _ = tokio::time::timeout(timeout, collect).await;

            let mut devices = Vec::with_capacity(addresses.len());
            for address in addresses {
                match self.adapter.device(address) {
                    Ok(device) => devices.push(DiscoveredDevice {
                        address: address.to_string(),
                        name: device.name().await.unwrap_or(None),
                        rssi_dbm: device.rssi().await.unwrap_or(None),
                    }),
                    Err(e) => warn!(%address, error = %e, "device vanished during sweep"),
                }
            }
            Ok(devices)
        }

        /// Run one discovery sweep until the target reports an RSSI or
        /// the sweep window closes.
        async fn sweep(&self, target: Address) -> std::result::Result<Option<i16>, bluer::Error> {
            // A cached RSSI from a still-connected device short-circuits
            // the sweep.
            if let Ok(device) = self.adapter.device(target) {
                if let Some(rssi) = device.rssi().await.unwrap_or(None) {
                    return Ok(Some(rssi));
                }
            }

            let events = self.adapter.discover_devices().await?;
            pin_mut!(events);

            while let Some(event) = events.next().await {
                match event {
                    AdapterEvent::DeviceAdded(address) if address == target => {
                        let device = self.adapter.device(address)?;
                        if let Some(rssi) = device.rssi().await? {
                            return Ok(Some(rssi));
                        }
                        // Known but without a signal reading; keep
                        // listening until the window closes.
                    }
                    _ => {}
                }
            }
            Ok(None)
        }
    }

    impl ScanSource for BleScanSource {
        async fn scan(&mut self, target: &str, timeout: Duration) -> ScanOutcome {
            let address: Address = match target.parse() {
                Ok(address) => address,
                Err(e) => {
                    return ScanOutcome::Failed {
                        reason: format!("invalid target address '{target}': {e}"),
                    }
                }
            };

            match tokio::time::timeout(timeout, self.sweep(address)).await {
                Ok(Ok(Some(rssi_dbm))) => ScanOutcome::Observed { rssi_dbm },
                Ok(Ok(None)) | Err(_) => ScanOutcome::NotObserved,
                Ok(Err(e)) => ScanOutcome::Failed {
                    reason: e.to_string(),
                },
            }
        }
    }
}
