//! Run statistics and event recording.
//!
//! The controller owns one [`RunStatistics`] instance and mutates it as
//! cycles complete; everyone else sees read-only snapshots. The
//! [`EventRecorder`] seam carries transitions and periodic snapshots out
//! to whatever sink the embedding process provides (the daemon logs them
//! through `tracing`). Recording is append-only and best-effort: a sink
//! failure must never stop scanning, so the trait is infallible by
//! signature and implementations absorb their own errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{LockState, TransitionEvent};
use crate::signal::ScanOutcome;

/// Counters for one run of the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatistics {
    /// When the run started.
    pub started_at_utc: DateTime<Utc>,
    /// Scan cycles attempted.
    pub total_scans: u64,
    /// Cycles whose sweep completed (device seen or not).
    pub successful_scans: u64,
    /// Cycles whose sweep failed.
    pub failed_scans: u64,
    /// Scheduler ticks skipped because a cycle was still in flight.
    pub skipped_ticks: u64,
    /// Transitions into `Locked`.
    pub lock_events: u64,
    /// Transitions into `Unlocked`.
    pub unlock_events: u64,
    /// OS lock/wake calls that failed.
    pub action_failures: u64,
    /// Current run of consecutive failed scans.
    pub current_failure_streak: u32,
    /// Longest run of consecutive failed scans seen.
    pub max_failure_streak: u32,
}

impl RunStatistics {
    /// Fresh counters, stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at_utc: Utc::now(),
            total_scans: 0,
            successful_scans: 0,
            failed_scans: 0,
            skipped_ticks: 0,
            lock_events: 0,
            unlock_events: 0,
            action_failures: 0,
            current_failure_streak: 0,
            max_failure_streak: 0,
        }
    }

    /// Account for one completed scan cycle.
    pub fn record_outcome(&mut self, outcome: &ScanOutcome) {
        self.total_scans += 1;
        if outcome.is_success() {
            self.successful_scans += 1;
            self.current_failure_streak = 0;
        } else {
            self.failed_scans += 1;
            self.current_failure_streak = self.current_failure_streak.saturating_add(1);
            self.max_failure_streak = self.max_failure_streak.max(self.current_failure_streak);
        }
    }

    /// Account for an accepted transition.
    pub fn record_transition(&mut self, event: &TransitionEvent) {
        match event.to {
            LockState::Locked => self.lock_events += 1,
            LockState::Unlocked => self.unlock_events += 1,
            LockState::Unknown => {}
        }
    }

    /// Account for a failed OS action.
    pub fn record_action_failure(&mut self) {
        self.action_failures += 1;
    }

    /// Account for ticks the scheduler skipped instead of queueing.
    pub fn record_skipped_ticks(&mut self, count: u64) {
        self.skipped_ticks += count;
    }

    /// Seconds since the run started.
    #[must_use]
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at_utc).num_seconds()
    }

    /// A read-only copy for recorders.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink for transitions and statistics snapshots.
///
/// Append-only and best-effort: implementations must absorb their own
/// failures rather than surface them into the scan loop.
pub trait EventRecorder {
    /// An accepted state transition.
    fn record_transition(&self, event: &TransitionEvent);

    /// A periodic or final statistics snapshot.
    fn record_snapshot(&self, stats: &RunStatistics);
}

/// Recorder that discards everything. Useful in tests and embeddings
/// that only care about the controller's return value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecorder;

impl EventRecorder for NullRecorder {
    fn record_transition(&self, _event: &TransitionEvent) {}
    fn record_snapshot(&self, _stats: &RunStatistics) {}
}
