//! Event recording through `tracing`.
//!
//! The daemon's [`EventRecorder`] implementation: transitions and
//! statistics snapshots become structured log events, which the logging
//! setup routes to the rolling file and stdout. Best-effort by
//! construction — `tracing` never fails the caller.

use proxilock_core::{EventRecorder, LockState, RunStatistics, TransitionEvent};
use tracing::info;

/// Logs transitions and snapshots as structured events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn record_transition(&self, event: &TransitionEvent) {
        match event.to {
            LockState::Locked => info!(
                from = ?event.from,
                rssi_dbm = event.trigger_rssi_dbm,
                at = %event.at,
                "session locked (device out of range)"
            ),
            LockState::Unlocked => info!(
                from = ?event.from,
                rssi_dbm = event.trigger_rssi_dbm,
                at = %event.at,
                "session unlocked (device nearby)"
            ),
            LockState::Unknown => {}
        }
    }

    fn record_snapshot(&self, stats: &RunStatistics) {
        info!(
            uptime_secs = stats.uptime_secs(),
            total_scans = stats.total_scans,
            successful_scans = stats.successful_scans,
            failed_scans = stats.failed_scans,
            skipped_ticks = stats.skipped_ticks,
            lock_events = stats.lock_events,
            unlock_events = stats.unlock_events,
            action_failures = stats.action_failures,
            max_failure_streak = stats.max_failure_streak,
            "run statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn recorder_accepts_all_event_shapes() {
        let recorder = TracingRecorder;
        recorder.record_transition(&TransitionEvent {
            from: LockState::Unknown,
            to: LockState::Unlocked,
            trigger_rssi_dbm: Some(-58),
            at: Utc::now(),
        });
        recorder.record_transition(&TransitionEvent {
            from: LockState::Unlocked,
            to: LockState::Locked,
            trigger_rssi_dbm: None,
            at: Utc::now(),
        });
        recorder.record_snapshot(&RunStatistics::new());
    }
}
