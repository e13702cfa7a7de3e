//! Action dispatch at the OS boundary.
//!
//! The [`ActionDispatcher`] turns accepted transitions into exactly one
//! OS call each, through the [`SessionControl`] seam. It trusts the
//! engine's at-most-one-per-tick guarantee and adds no further
//! deduplication; it only tracks what it last issued and how often, for
//! the run statistics.

use std::future::Future;

use thiserror::Error;
use tracing::debug;

use crate::engine::{LockState, TransitionEvent};

/// An OS lock/wake call failed.
///
/// Reported upward and counted, but never rolled back into the lock
/// state: the state machine reflects intent, and a failed action gets its
/// next chance only at the next natural transition.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The session lock primitive failed.
    #[error("lock command failed: {0}")]
    LockFailed(String),

    /// The session wake primitive failed.
    #[error("wake command failed: {0}")]
    WakeFailed(String),
}

/// The OS session primitives, as seen by the core.
///
/// Both calls must be idempotent from the caller's perspective: locking
/// an already-locked session is success, not an error (a manually locked
/// machine must not race this system into a failure). Waking only nudges
/// the display/session awake; it never bypasses OS authentication.
/// Implementations must bound their own wall-clock work: the scan loop
/// awaits each action inline, so a primitive that can hang would stall
/// scanning and delay shutdown.
pub trait SessionControl {
    /// Lock the session.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::LockFailed`] if the underlying call failed.
    fn lock_session(&mut self) -> impl Future<Output = Result<(), ActionError>> + Send;

    /// Wake the display/session by simulating user activity.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::WakeFailed`] if the underlying call failed.
    fn wake_session(&mut self) -> impl Future<Output = Result<(), ActionError>> + Send;
}

/// Issues one OS action per accepted transition.
#[derive(Debug)]
pub struct ActionDispatcher<C> {
    session: C,
    last_issued: Option<LockState>,
    locks_issued: u64,
    wakes_issued: u64,
}

impl<C: SessionControl> ActionDispatcher<C> {
    /// Wrap a session controller.
    pub const fn new(session: C) -> Self {
        Self {
            session,
            last_issued: None,
            locks_issued: 0,
            wakes_issued: 0,
        }
    }

    /// Invoke the OS action corresponding to `event`.
    ///
    /// Exactly one invocation per event. A counter is bumped and
    /// `last_issued` recorded even on failure, because the attempt was
    /// made and the intended state stands regardless.
    ///
    /// # Errors
    ///
    /// Propagates the [`ActionError`] from the underlying primitive.
    pub async fn dispatch(&mut self, event: &TransitionEvent) -> Result<(), ActionError> {
        match event.to {
            LockState::Locked => {
                debug!(from = ?event.from, "dispatching session lock");
                self.last_issued = Some(LockState::Locked);
                self.locks_issued += 1;
                self.session.lock_session().await
            }
            LockState::Unlocked => {
                debug!(from = ?event.from, "dispatching session wake");
                self.last_issued = Some(LockState::Unlocked);
                self.wakes_issued += 1;
                self.session.wake_session().await
            }
            // The engine never targets Unknown.
            LockState::Unknown => Ok(()),
        }
    }

    /// The action most recently issued, if any.
    #[must_use]
    pub const fn last_issued(&self) -> Option<LockState> {
        self.last_issued
    }

    /// Number of lock actions issued so far.
    #[must_use]
    pub const fn locks_issued(&self) -> u64 {
        self.locks_issued
    }

    /// Number of wake actions issued so far.
    #[must_use]
    pub const fn wakes_issued(&self) -> u64 {
        self.wakes_issued
    }

    /// Access the wrapped session controller.
    pub const fn session(&self) -> &C {
        &self.session
    }
}
