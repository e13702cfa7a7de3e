//! # proxilockd
//!
//! Daemon for the proxilock proximity lock system.
//!
//! This binary:
//! - Loads and validates the configuration
//! - Scans for the paired Bluetooth device on a fixed interval
//! - Locks the session when the device leaves range, wakes it on return
//! - Logs structured events to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package proxilock-daemon
//!
//! # Production
//! PROXILOCK_ENV=production ./proxilockd --config /etc/proxilock/config.toml
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;

use anyhow::Context;
use proxilock_core::Config;
use tracing::info;

mod logging;
mod recorder;
mod session;

const USAGE: &str = "\
proxilockd - lock the session when your phone leaves Bluetooth range

USAGE:
    proxilockd [OPTIONS]

OPTIONS:
    -c, --config <PATH>   Path to config.toml (default: /etc/proxilock/config.toml)
        --list-devices    Run one discovery sweep and print every device in range
    -h, --help            Print this help
";

struct Args {
    config: Option<PathBuf>,
    list_devices: bool,
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let mut args = Args {
        config: None,
        list_devices: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "-c" | "--config" => {
                let path = iter.next().context("--config requires a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--list-devices" => args.list_devices = true,
            other => anyhow::bail!("unknown argument: {other} (try --help)"),
        }
    }
    Ok(Some(args))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(args) = parse_args()? else {
        print!("{USAGE}");
        return Ok(());
    };

    let is_production = std::env::var("PROXILOCK_ENV").is_ok_and(|v| v == "production");
    logging::init(is_production)?;

    if args.list_devices {
        return list_devices().await;
    }

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting proxilockd");
    info!(
        target_address = %config.target_address,
        lock_threshold_dbm = config.lock_threshold_dbm,
        unlock_threshold_dbm = config.unlock_threshold_dbm,
        scan_interval_secs = config.scan_interval_secs,
        scan_timeout_secs = config.scan_timeout_secs,
        consecutive_fail_threshold = config.consecutive_fail_threshold,
        "configuration loaded"
    );

    run(config).await
}

#[cfg(feature = "bluetooth")]
async fn run(config: Config) -> anyhow::Result<()> {
    use proxilock_core::{shutdown_channel, BleScanSource, ProximityController};

    use crate::recorder::TracingRecorder;
    use crate::session::LoginctlSession;

    let source = BleScanSource::new().await?;
    let mut controller =
        ProximityController::new(config, source, LoginctlSession::new(), TracingRecorder)?;

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, stopping");
            let _ = shutdown_tx.send(true);
        }
    });

    let stats = controller.run(shutdown_rx).await?;

    let uptime = stats.uptime_secs().max(0);
    let (hours, rest) = (uptime / 3600, uptime % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    info!(
        uptime = %format!("{hours}h {minutes}m {seconds}s"),
        total_scans = stats.total_scans,
        locks = stats.lock_events,
        unlocks = stats.unlock_events,
        "proxilockd stopped gracefully"
    );
    Ok(())
}

#[cfg(not(feature = "bluetooth"))]
async fn run(_config: Config) -> anyhow::Result<()> {
    anyhow::bail!("proxilockd was built without the `bluetooth` feature")
}

/// Diagnostic sweep to help pick a target MAC address.
#[cfg(feature = "bluetooth")]
async fn list_devices() -> anyhow::Result<()> {
    use std::time::Duration;

    let source = proxilock_core::BleScanSource::new().await?;
    let devices = source.discover_devices(Duration::from_secs(5)).await?;
    if devices.is_empty() {
        println!("No devices found. Ensure Bluetooth is enabled.");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&devices)?);
    Ok(())
}

#[cfg(not(feature = "bluetooth"))]
async fn list_devices() -> anyhow::Result<()> {
    anyhow::bail!("proxilockd was built without the `bluetooth` feature")
}
