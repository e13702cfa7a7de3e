//! Debounce and hysteresis state machine.
//!
//! The [`DebounceEngine`] owns the single authoritative [`LockState`] and
//! turns the per-tick stream of scan outcomes into at most one state
//! transition per stable change. Two independent thresholds create a
//! hysteresis band that prevents oscillation near a single cutoff, and a
//! consecutive-failure streak provides the fail-safe lock: sustained
//! inability to observe the device is treated identically to confirmed
//! absence, so an adapter fault can never leave the machine perpetually
//! unlocked.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::signal::{evaluate, ProximitySignal, ScanOutcome};

/// Intended lock state of the session.
///
/// Reflects the controller's *intent*, not a confirmed OS state: a failed
/// lock or wake call does not roll this back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// No transition has been accepted yet.
    Unknown,
    /// The device is considered nearby; the session should be awake.
    Unlocked,
    /// The device is considered gone; the session should be locked.
    Locked,
}

/// One accepted state transition. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// State before the transition.
    pub from: LockState,
    /// State after the transition.
    pub to: LockState,
    /// RSSI that triggered the transition, when the trigger was an
    /// observation. Absent for fail-safe and device-absent locks.
    pub trigger_rssi_dbm: Option<i16>,
    /// When the transition was accepted.
    pub at: DateTime<Utc>,
}

/// The core state machine: consumes scan outcomes, emits transitions.
///
/// `on_scan` must be called strictly serialized, once per scheduler tick.
/// The scheduler guarantees this by never overlapping cycles.
#[derive(Debug)]
pub struct DebounceEngine {
    config: Arc<Config>,
    state: LockState,
    failure_streak: u32,
    last_signal: Option<ProximitySignal>,
}

impl DebounceEngine {
    /// Create an engine in the initial `Unknown` state.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            state: LockState::Unknown,
            failure_streak: 0,
            last_signal: None,
        }
    }

    /// Current intended lock state.
    #[must_use]
    pub const fn state(&self) -> LockState {
        self.state
    }

    /// Current run of consecutive failed scans.
    #[must_use]
    pub const fn failure_streak(&self) -> u32 {
        self.failure_streak
    }

    /// The signal computed on the most recent tick, if any.
    #[must_use]
    pub const fn last_signal(&self) -> Option<ProximitySignal> {
        self.last_signal
    }

    /// Feed one scan outcome into the state machine.
    ///
    /// At most one transition fires per call. The lock rule is evaluated
    /// first: from any state other than `Locked`, a `Far` signal or a
    /// failure streak reaching the configured threshold locks. Otherwise,
    /// from any state other than `Unlocked`, a `Near` signal unlocks (the
    /// very first `Near` observation from `Unknown` legitimately unlocks).
    /// An `Indeterminate` signal with no streak trip changes nothing.
    ///
    /// A fired transition resets the failure streak: the lock event itself
    /// is evidence the failure condition has been handled.
    pub fn on_scan(&mut self, outcome: &ScanOutcome) -> Option<TransitionEvent> {
        if outcome.is_success() {
            self.failure_streak = 0;
        } else {
            self.failure_streak = self.failure_streak.saturating_add(1);
        }

        let signal = evaluate(outcome, &self.config);
        self.last_signal = Some(signal);

        let streak_tripped = self.failure_streak >= self.config.consecutive_fail_threshold;

        let target = if self.state != LockState::Locked
            && (signal == ProximitySignal::Far || streak_tripped)
        {
            LockState::Locked
        } else if self.state != LockState::Unlocked && signal == ProximitySignal::Near {
            LockState::Unlocked
        } else {
            return None;
        };

        let event = TransitionEvent {
            from: self.state,
            to: target,
            trigger_rssi_dbm: outcome.rssi_dbm(),
            at: Utc::now(),
        };
        self.state = target;
        self.failure_streak = 0;
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DebounceEngine {
        engine_with_fail_threshold(3)
    }

    fn engine_with_fail_threshold(threshold: u32) -> DebounceEngine {
        DebounceEngine::new(Arc::new(Config {
            target_address: "28:D2:5A:A1:29:6E".into(),
            lock_threshold_dbm: -80,
            unlock_threshold_dbm: -70,
            consecutive_fail_threshold: threshold,
            ..Config::default()
        }))
    }

    fn observed(rssi_dbm: i16) -> ScanOutcome {
        ScanOutcome::Observed { rssi_dbm }
    }

    fn failed() -> ScanOutcome {
        ScanOutcome::Failed {
            reason: "scan failed".into(),
        }
    }

    #[test]
    fn first_near_observation_unlocks_from_unknown() {
        let mut engine = engine();
        let event = engine.on_scan(&observed(-60)).expect("transition");
        assert_eq!(event.from, LockState::Unknown);
        assert_eq!(event.to, LockState::Unlocked);
        assert_eq!(event.trigger_rssi_dbm, Some(-60));
        assert_eq!(engine.state(), LockState::Unlocked);
    }

    #[test]
    fn scenario_a_unlock_then_lock() {
        // [-60, -85, -85]: Near unlocks, first Far locks, third tick is a no-op.
        let mut engine = engine();
        let transitions: Vec<_> = [-60, -85, -85]
            .into_iter()
            .filter_map(|rssi| engine.on_scan(&observed(rssi)))
            .collect();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].to, LockState::Unlocked);
        assert_eq!(transitions[1].from, LockState::Unlocked);
        assert_eq!(transitions[1].to, LockState::Locked);
    }

    #[test]
    fn scenario_b_fail_streak_locks_once() {
        let mut engine = engine();
        engine.on_scan(&observed(-60)).expect("unlock first");

        assert!(engine.on_scan(&failed()).is_none());
        assert!(engine.on_scan(&failed()).is_none());
        let event = engine.on_scan(&failed()).expect("third failure locks");
        assert_eq!(event.to, LockState::Locked);
        assert_eq!(event.trigger_rssi_dbm, None);
        // Streak resets immediately after the transition fires.
        assert_eq!(engine.failure_streak(), 0);
    }

    #[test]
    fn scenario_c_band_reading_from_unknown_does_nothing() {
        let mut engine = engine();
        assert!(engine.on_scan(&observed(-75)).is_none());
        assert_eq!(engine.state(), LockState::Unknown);
    }

    #[test]
    fn successful_scan_resets_streak() {
        let mut engine = engine();
        engine.on_scan(&observed(-60));
        engine.on_scan(&failed());
        engine.on_scan(&failed());
        assert_eq!(engine.failure_streak(), 2);

        // An in-band observation is a success even though it moves nothing.
        assert!(engine.on_scan(&observed(-75)).is_none());
        assert_eq!(engine.failure_streak(), 0);

        // The streak starts over and needs the full threshold again.
        assert!(engine.on_scan(&failed()).is_none());
        assert!(engine.on_scan(&failed()).is_none());
        assert!(engine.on_scan(&failed()).is_some());
    }

    #[test]
    fn not_observed_locks_immediately() {
        let mut engine = engine();
        engine.on_scan(&observed(-60));
        let event = engine.on_scan(&ScanOutcome::NotObserved).expect("locks");
        assert_eq!(event.to, LockState::Locked);
        assert_eq!(event.trigger_rssi_dbm, None);
    }

    #[test]
    fn no_flap_inside_hysteresis_band() {
        let mut engine = engine();
        engine.on_scan(&observed(-60)).expect("initial settle");

        // RSSI oscillating strictly between the thresholds moves nothing.
        for rssi in [-75, -71, -79, -73, -78, -72] {
            assert!(engine.on_scan(&observed(rssi)).is_none(), "rssi {rssi}");
        }
        assert_eq!(engine.state(), LockState::Unlocked);
    }

    #[test]
    fn never_two_consecutive_transitions_to_same_state() {
        let mut engine = engine_with_fail_threshold(2);
        let outcomes = [
            observed(-60),
            observed(-85),
            observed(-85),
            ScanOutcome::NotObserved,
            failed(),
            failed(),
            observed(-60),
            observed(-60),
            failed(),
            failed(),
        ];
        let mut last_target = None;
        for outcome in &outcomes {
            if let Some(event) = engine.on_scan(outcome) {
                assert_ne!(Some(event.to), last_target, "repeated {:?}", event.to);
                assert_ne!(event.from, event.to);
                last_target = Some(event.to);
            }
        }
    }

    #[test]
    fn fail_threshold_of_one_locks_on_single_failure() {
        let mut engine = engine_with_fail_threshold(1);
        engine.on_scan(&observed(-60));
        let event = engine.on_scan(&failed()).expect("aggressive lock");
        assert_eq!(event.to, LockState::Locked);
    }

    #[test]
    fn failures_from_unknown_state_also_lock() {
        // Fail-safe applies before any observation has ever succeeded.
        let mut engine = engine_with_fail_threshold(2);
        assert!(engine.on_scan(&failed()).is_none());
        let event = engine.on_scan(&failed()).expect("locks from Unknown");
        assert_eq!(event.from, LockState::Unknown);
        assert_eq!(event.to, LockState::Locked);
    }

    #[test]
    fn failures_while_locked_never_re_lock() {
        let mut engine = engine_with_fail_threshold(1);
        engine.on_scan(&ScanOutcome::NotObserved).expect("locks");
        for _ in 0..5 {
            assert!(engine.on_scan(&failed()).is_none());
        }
        assert_eq!(engine.state(), LockState::Locked);
    }

    #[test]
    fn failure_streak_saturates_instead_of_overflowing() {
        // A long-lived locked session accumulates failures indefinitely;
        // the counter must pin at the maximum, not wrap.
        let mut engine = engine_with_fail_threshold(1);
        engine.on_scan(&ScanOutcome::NotObserved).expect("locks");
        engine.failure_streak = u32::MAX - 1;
        assert!(engine.on_scan(&failed()).is_none());
        assert!(engine.on_scan(&failed()).is_none());
        assert_eq!(engine.failure_streak(), u32::MAX);
        assert_eq!(engine.state(), LockState::Locked);
    }

    #[test]
    fn near_reading_unlocks_from_locked() {
        let mut engine = engine();
        engine.on_scan(&ScanOutcome::NotObserved).expect("locks");
        let event = engine.on_scan(&observed(-65)).expect("unlocks");
        assert_eq!(event.from, LockState::Locked);
        assert_eq!(event.to, LockState::Unlocked);
        assert_eq!(event.trigger_rssi_dbm, Some(-65));
    }

    #[test]
    fn last_signal_tracks_most_recent_tick() {
        let mut engine = engine();
        assert_eq!(engine.last_signal(), None);
        engine.on_scan(&observed(-75));
        assert_eq!(engine.last_signal(), Some(ProximitySignal::Indeterminate));
        engine.on_scan(&ScanOutcome::NotObserved);
        assert_eq!(engine.last_signal(), Some(ProximitySignal::Far));
    }
}
