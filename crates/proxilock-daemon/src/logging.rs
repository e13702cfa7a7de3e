//! Tracing setup for the daemon.
//!
//! In production the daemon writes JSON events to a daily-rotated file
//! under the platform log directory and compact lines to stdout for
//! journald; during development everything goes to stdout in the default
//! human-readable format.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Non-blocking writers stop flushing once their guard drops, so the
// guards have to outlive every log call.
static WRITER_GUARDS: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `PROXILOCK_LOG_LEVEL`, defaulting
/// to `info`.
///
/// # Errors
///
/// Returns an error if the level directive cannot be parsed.
pub fn init(is_production: bool) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_directive()))?;

    if is_production {
        let log_dir = log_directory();
        std::fs::create_dir_all(&log_dir).ok();

        let daily = RollingFileAppender::new(Rotation::DAILY, &log_dir, "proxilock");
        let (file_writer, file_guard) = tracing_appender::non_blocking(daily);
        let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(file_writer)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(stdout_writer)
                    .with_ansi(false),
            )
            .init();

        let _ = WRITER_GUARDS.set(vec![file_guard, stdout_guard]);
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}

fn default_directive() -> String {
    std::env::var("PROXILOCK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/proxilock")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "proxilock")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}
