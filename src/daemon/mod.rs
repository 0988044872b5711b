//! Daemon mode - background process owning every debug session
//!
//! The daemon is spawned automatically by CLI commands and keeps backend
//! processes alive across CLI invocations.

mod handler;
mod server;

use crate::common::{config::Config, Result};

/// Run in daemon mode
///
/// Entry point for the hidden `daemon` command. The daemon:
/// 1. Creates an IPC socket/pipe for CLI connections
/// 2. Serves each connection on its own task against the session manager
/// 3. Periodically drops sessions whose backend exited
/// 4. Kills every backend on shutdown, signal or idle timeout
pub async fn run() -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "Starting broker daemon"
    );

    let config = Config::load()?;
    let daemon = server::Daemon::new(config)?;
    daemon.run().await
}
