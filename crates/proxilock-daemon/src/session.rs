//! Linux session lock/wake primitives.
//!
//! Thin wrappers over the platform commands: `loginctl lock-session` to
//! lock, and a D-Bus screensaver poke to wake the display. Neither call
//! bypasses OS authentication; waking only spares the user from having
//! to nudge the machine themselves.

use std::time::Duration;

use proxilock_core::{ActionError, SessionControl};
use tokio::process::Command;
use tracing::{debug, warn};

/// How often to retry the lock command before giving up.
const DEFAULT_COMMAND_RETRIES: u32 = 3;

/// Upper bound on a single command's wall-clock time. A stuck
/// `loginctl` or `dbus-send` must not stall the scan loop.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Session controller backed by `loginctl` and `dbus-send`.
#[derive(Debug)]
pub struct LoginctlSession {
    retries: u32,
    command_timeout: Duration,
}

impl LoginctlSession {
    /// Controller with the default retry count and command timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            retries: DEFAULT_COMMAND_RETRIES,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Controller with an explicit retry count (minimum 1).
    #[must_use]
    pub const fn with_retries(retries: u32) -> Self {
        Self {
            retries: if retries == 0 { 1 } else { retries },
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Run a command, bounded by `timeout`. The child is killed if the
    /// future is dropped before it exits.
    async fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<(), String> {
        let mut child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn {program}: {e}"))?;

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(format!("{program} exited with {status}")),
            Ok(Err(e)) => Err(format!("failed waiting on {program}: {e}")),
            Err(_) => Err(format!(
                "{program} did not exit within {}ms",
                timeout.as_millis()
            )),
        }
    }
}

impl Default for LoginctlSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionControl for LoginctlSession {
    /// Lock the session.
    ///
    /// `loginctl lock-session` succeeds on an already-locked session, so
    /// a manual lock racing this call is harmless. Transient failures are
    /// retried a bounded number of times before being reported.
    async fn lock_session(&mut self) -> Result<(), ActionError> {
        let mut last_error = String::new();
        for attempt in 1..=self.retries {
            match Self::run_command("loginctl", &["lock-session"], self.command_timeout).await {
                Ok(()) => {
                    debug!(attempt, "session lock issued");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "lock attempt failed");
                    last_error = e;
                }
            }
        }
        Err(ActionError::LockFailed(last_error))
    }

    /// Wake the display by simulating user activity over D-Bus.
    async fn wake_session(&mut self) -> Result<(), ActionError> {
        Self::run_command(
            "dbus-send",
            &[
                "--session",
                "--type=method_call",
                "--dest=org.freedesktop.ScreenSaver",
                "/org/freedesktop/ScreenSaver",
                "org.freedesktop.ScreenSaver.SimulateUserActivity",
            ],
            self.command_timeout,
        )
        .await
        .map(|()| debug!("session wake issued"))
        .map_err(ActionError::WakeFailed)
    }
}
