//! Daemon spawning logic
//!
//! Starts the daemon on demand by re-executing the current binary with the
//! hidden `daemon` subcommand.

use std::process::Stdio;
use std::time::{Duration, Instant};

use crate::common::{paths, Error, Result};
use crate::ipc::{transport, DaemonClient};

/// How long to wait for a fresh daemon's socket
const SPAWN_TIMEOUT_SECS: u64 = 5;

/// Ensure the daemon is running, spawning it if necessary
pub async fn ensure_daemon_running() -> Result<()> {
    match DaemonClient::connect().await {
        Ok(_) => Ok(()),
        Err(Error::DaemonNotRunning) => spawn_daemon().await,
        Err(e) => Err(e),
    }
}

async fn spawn_daemon() -> Result<()> {
    tracing::debug!("Spawning daemon process");

    let exe_path = std::env::current_exe().map_err(|e| {
        Error::Internal(format!("Failed to get current executable path: {}", e))
    })?;

    paths::ensure_socket_dir()?;
    paths::remove_socket()?;

    // The daemon writes its own log file; terminal output goes nowhere
    let mut command = std::process::Command::new(&exe_path);
    command
        .arg("daemon")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x00000008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    command
        .spawn()
        .map_err(|e| Error::Internal(format!("Failed to spawn daemon: {}", e)))?;

    let deadline = Instant::now() + Duration::from_secs(SPAWN_TIMEOUT_SECS);
    while Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;

        #[cfg(unix)]
        if !paths::socket_path().exists() {
            continue;
        }

        if transport::connect().await.is_ok() {
            tracing::debug!("Daemon started successfully");
            return Ok(());
        }
    }

    Err(Error::DaemonSpawnTimeout(SPAWN_TIMEOUT_SECS))
}
