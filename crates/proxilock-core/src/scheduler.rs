//! Scan loop scheduling and controller lifecycle.
//!
//! [`ProximityController`] wires the scan source, debounce engine, action
//! dispatcher and event recorder into one fixed-interval loop. Each tick
//! performs a single scan → evaluate → transition → dispatch cycle as one
//! unit of work; cycles never overlap, which keeps the engine's state
//! strictly serialized and keeps a single discovery session against the
//! adapter. A tick that would fire while a cycle is still in flight is
//! skipped and counted, never queued.
//!
//! Cancellation comes in over a `tokio::sync::watch` channel carrying
//! `true` for "stop". It is observed at two points: before starting a new
//! cycle, and while waiting on a scan (best-effort abort by dropping the
//! scan future).

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigResult};
use crate::dispatch::{ActionDispatcher, SessionControl};
use crate::engine::{DebounceEngine, LockState};
use crate::error::Result;
use crate::scan::ScanSource;
use crate::signal::ScanOutcome;
use crate::stats::{EventRecorder, RunStatistics};

/// Emit an intermediate statistics snapshot every this many cycles.
const SNAPSHOT_EVERY_CYCLES: u64 = 60;

/// A shutdown channel for [`ProximityController::run`]. Send `true` to
/// stop the loop.
#[must_use]
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Lifecycle of the scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Constructed, not yet running.
    Idle,
    /// Cycling on the scan interval.
    Running,
    /// Stop observed; draining the in-flight cycle.
    Stopping,
    /// Done; no further scans will occur.
    Stopped,
}

/// The proximity state controller: one instance per run.
///
/// Owns the authoritative lock state (through its engine) and the run
/// statistics; both are only ever touched by the loop itself.
pub struct ProximityController<S, C, R> {
    config: Arc<Config>,
    source: S,
    engine: DebounceEngine,
    dispatcher: ActionDispatcher<C>,
    recorder: R,
    stats: RunStatistics,
    phase: LoopPhase,
}

impl<S, C, R> ProximityController<S, C, R>
where
    S: ScanSource,
    C: SessionControl,
    R: EventRecorder,
{
    /// Validate `config` and assemble a controller.
    ///
    /// # Errors
    ///
    /// Fails fast with a [`crate::config::ConfigError`] before any
    /// scanning begins if the configuration is invalid.
    pub fn new(config: Config, source: S, session: C, recorder: R) -> ConfigResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            engine: DebounceEngine::new(Arc::clone(&config)),
            dispatcher: ActionDispatcher::new(session),
            recorder,
            stats: RunStatistics::new(),
            phase: LoopPhase::Idle,
            source,
            config,
        })
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Current intended lock state.
    #[must_use]
    pub const fn lock_state(&self) -> LockState {
        self.engine.state()
    }

    /// Read-only view of the counters so far.
    #[must_use]
    pub const fn stats(&self) -> &RunStatistics {
        &self.stats
    }

    /// Drive scan cycles until `shutdown` signals stop (or its sender is
    /// dropped). Returns the final statistics snapshot, which is also
    /// handed to the recorder.
    ///
    /// # Errors
    ///
    /// Recoverable conditions (failed scans, failed OS actions) are
    /// absorbed into statistics; only scheduler-level faults would escape,
    /// and the loop is total over its input variants.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<RunStatistics> {
        self.phase = LoopPhase::Running;
        let period = self.config.scan_interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            target_address = %self.config.target_address,
            interval_secs = self.config.scan_interval_secs,
            "scan loop running"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            let cycle_started = Instant::now();
            let Some(outcome) = self.scan_once(&mut shutdown).await else {
                // Stop observed mid-scan; the cycle is abandoned.
                break;
            };
            self.complete_cycle(&outcome).await;

            let elapsed = cycle_started.elapsed();
            if elapsed > period {
                // The interval's Skip behavior already dropped the missed
                // ticks; account for them.
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let missed = (elapsed.as_secs_f64() / period.as_secs_f64()) as u64;
                self.stats.record_skipped_ticks(missed);
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    missed, "cycle overran the scan interval"
                );
            }
        }

        self.phase = LoopPhase::Stopping;
        info!(
            total_scans = self.stats.total_scans,
            lock_events = self.stats.lock_events,
            unlock_events = self.stats.unlock_events,
            "scan loop stopping"
        );
        let snapshot = self.stats.snapshot();
        self.recorder.record_snapshot(&snapshot);
        self.phase = LoopPhase::Stopped;
        Ok(snapshot)
    }

    /// One bounded scan, cancellable by `shutdown`. `None` means stop was
    /// observed while waiting.
    async fn scan_once(&mut self, shutdown: &mut watch::Receiver<bool>) -> Option<ScanOutcome> {
        let timeout = self.config.scan_timeout();
        let target = self.config.target_address.clone();
        let scan = tokio::time::timeout(timeout, self.source.scan(&target, timeout));
        tokio::pin!(scan);

        loop {
            tokio::select! {
                result = &mut scan => {
                    return Some(match result {
                        Ok(outcome) => outcome,
                        Err(_) => ScanOutcome::Failed {
                            reason: "timeout".into(),
                        },
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return None;
                    }
                    // Spurious wake; keep waiting on the scan.
                }
            }
        }
    }

    /// Evaluate the outcome, fire at most one transition, dispatch and
    /// record it.
    async fn complete_cycle(&mut self, outcome: &ScanOutcome) {
        debug!(?outcome, streak = self.engine.failure_streak(), "scan cycle");
        self.stats.record_outcome(outcome);

        if let Some(event) = self.engine.on_scan(outcome) {
            info!(
                from = ?event.from,
                to = ?event.to,
                rssi_dbm = event.trigger_rssi_dbm,
                "lock state transition"
            );
            self.stats.record_transition(&event);
            self.recorder.record_transition(&event);
            if let Err(e) = self.dispatcher.dispatch(&event).await {
                // State reflects intent; the failure is surfaced through
                // statistics, not retried in a loop.
                warn!(error = %e, "session action failed");
                self.stats.record_action_failure();
            }
        }

        if self.stats.total_scans % SNAPSHOT_EVERY_CYCLES == 0 {
            self.recorder.record_snapshot(&self.stats.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::dispatch::ActionError;
    use crate::engine::TransitionEvent;
    use crate::scan::ScriptedScanSource;

    fn test_config(fail_threshold: u32) -> Config {
        Config {
            target_address: "28:D2:5A:A1:29:6E".into(),
            lock_threshold_dbm: -80,
            unlock_threshold_dbm: -70,
            scan_interval_secs: 0.005,
            scan_timeout_secs: 5.0,
            consecutive_fail_threshold: fail_threshold,
        }
    }

    #[derive(Default)]
    struct RecordingSession {
        locks: u32,
        wakes: u32,
        fail_lock: bool,
    }

    impl SessionControl for &mut RecordingSession {
        async fn lock_session(&mut self) -> std::result::Result<(), ActionError> {
            self.locks += 1;
            if self.fail_lock {
                Err(ActionError::LockFailed("exit status 1".into()))
            } else {
                Ok(())
            }
        }

        async fn wake_session(&mut self) -> std::result::Result<(), ActionError> {
            self.wakes += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct CollectingRecorder {
        transitions: Mutex<Vec<TransitionEvent>>,
        snapshots: Mutex<Vec<RunStatistics>>,
    }

    impl EventRecorder for &CollectingRecorder {
        fn record_transition(&self, event: &TransitionEvent) {
            self.transitions.lock().unwrap().push(event.clone());
        }

        fn record_snapshot(&self, stats: &RunStatistics) {
            self.snapshots.lock().unwrap().push(stats.clone());
        }
    }

    /// Replays a script, then signals shutdown and pends so the loop's
    /// cancellation arm takes over. Makes runs fully deterministic.
    struct StopWhenExhausted {
        inner: ScriptedScanSource,
        stop: watch::Sender<bool>,
    }

    impl ScanSource for StopWhenExhausted {
        async fn scan(&mut self, target: &str, timeout: Duration) -> ScanOutcome {
            if self.inner.remaining() == 0 {
                let _ = self.stop.send(true);
                std::future::pending::<()>().await;
                unreachable!("pending future resolved");
            }
            self.inner.scan(target, timeout).await
        }
    }

    fn observed(rssi_dbm: i16) -> ScanOutcome {
        ScanOutcome::Observed { rssi_dbm }
    }

    fn failed() -> ScanOutcome {
        ScanOutcome::Failed {
            reason: "scan failed".into(),
        }
    }

    async fn run_script(
        config: Config,
        script: Vec<ScanOutcome>,
        session: &mut RecordingSession,
        recorder: &CollectingRecorder,
    ) -> RunStatistics {
        let (tx, rx) = shutdown_channel();
        let source = StopWhenExhausted {
            inner: ScriptedScanSource::new(script),
            stop: tx,
        };
        let mut controller =
            ProximityController::new(config, source, session, recorder).expect("valid config");
        let snapshot = controller.run(rx).await.expect("run completes");
        assert_eq!(controller.phase(), LoopPhase::Stopped);
        snapshot
    }

    #[test]
    fn invalid_config_fails_before_scanning() {
        let mut config = test_config(2);
        config.unlock_threshold_dbm = -90;
        let recorder = CollectingRecorder::default();
        let mut session = RecordingSession::default();
        let result = ProximityController::new(
            config,
            ScriptedScanSource::default(),
            &mut session,
            &recorder,
        );
        assert!(result.is_err());
        assert_eq!(session.locks, 0);
    }

    #[tokio::test]
    async fn end_to_end_unlock_then_lock() {
        let recorder = CollectingRecorder::default();
        let mut session = RecordingSession::default();
        let snapshot = run_script(
            test_config(3),
            vec![observed(-60), observed(-85), observed(-85)],
            &mut session,
            &recorder,
        )
        .await;

        assert_eq!(snapshot.total_scans, 3);
        assert_eq!(snapshot.successful_scans, 3);
        assert_eq!(snapshot.unlock_events, 1);
        assert_eq!(snapshot.lock_events, 1);
        assert_eq!(session.wakes, 1);
        assert_eq!(session.locks, 1);

        let transitions = recorder.transitions.lock().unwrap();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].to, LockState::Unlocked);
        assert_eq!(transitions[1].to, LockState::Locked);
        // Final snapshot always lands.
        assert!(!recorder.snapshots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fail_streak_locks_exactly_once() {
        let recorder = CollectingRecorder::default();
        let mut session = RecordingSession::default();
        let snapshot = run_script(
            test_config(3),
            vec![observed(-60), failed(), failed(), failed(), failed()],
            &mut session,
            &recorder,
        )
        .await;

        assert_eq!(snapshot.failed_scans, 4);
        assert_eq!(snapshot.lock_events, 1);
        assert_eq!(snapshot.max_failure_streak, 4);
        assert_eq!(session.locks, 1);
    }

    #[tokio::test]
    async fn band_oscillation_produces_no_transitions() {
        let recorder = CollectingRecorder::default();
        let mut session = RecordingSession::default();
        let snapshot = run_script(
            test_config(3),
            vec![
                observed(-60),
                observed(-75),
                observed(-71),
                observed(-79),
                observed(-73),
            ],
            &mut session,
            &recorder,
        )
        .await;

        assert_eq!(snapshot.unlock_events, 1);
        assert_eq!(snapshot.lock_events, 0);
        assert_eq!(session.locks, 0);
    }

    #[tokio::test]
    async fn failed_action_is_counted_not_fatal() {
        let recorder = CollectingRecorder::default();
        let mut session = RecordingSession {
            fail_lock: true,
            ..RecordingSession::default()
        };
        let snapshot = run_script(
            test_config(1),
            vec![ScanOutcome::NotObserved, ScanOutcome::NotObserved],
            &mut session,
            &recorder,
        )
        .await;

        assert_eq!(snapshot.lock_events, 1);
        assert_eq!(snapshot.action_failures, 1);
        // The loop kept going after the failure.
        assert_eq!(snapshot.total_scans, 2);
    }

    #[tokio::test]
    async fn stop_before_first_cycle_scans_nothing() {
        let (tx, rx) = shutdown_channel();
        tx.send(true).unwrap();

        let recorder = CollectingRecorder::default();
        let mut session = RecordingSession::default();
        let mut controller = ProximityController::new(
            test_config(2),
            ScriptedScanSource::new([observed(-60)]),
            &mut session,
            &recorder,
        )
        .expect("valid config");

        let snapshot = controller.run(rx).await.expect("run completes");
        assert_eq!(snapshot.total_scans, 0);
        assert_eq!(controller.phase(), LoopPhase::Stopped);
        assert_eq!(controller.lock_state(), LockState::Unknown);
        assert_eq!(recorder.snapshots.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scan_timeout_becomes_failed_outcome() {
        /// Never resolves; every scan runs into the timeout.
        struct StalledSource;

        impl ScanSource for StalledSource {
            async fn scan(&mut self, _target: &str, _timeout: Duration) -> ScanOutcome {
                std::future::pending().await
            }
        }

        let mut config = test_config(1);
        config.scan_timeout_secs = 0.01;

        let recorder = CollectingRecorder::default();
        let mut session = RecordingSession::default();
        let (tx, rx) = shutdown_channel();
        let mut controller =
            ProximityController::new(config, StalledSource, &mut session, &recorder)
                .expect("valid config");

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(true);
        });
        let snapshot = controller.run(rx).await.expect("run completes");
        stopper.await.unwrap();

        assert!(snapshot.failed_scans >= 1);
        assert_eq!(snapshot.successful_scans, 0);
        // Fail threshold 1: the first timeout locks, and only once.
        assert_eq!(snapshot.lock_events, 1);
        assert_eq!(session.locks, 1);
    }
}
