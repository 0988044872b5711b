//! Daemon server - IPC listener and main event loop

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use interprocess::local_socket::traits::tokio::Listener as ListenerTrait;
use tokio::io::BufReader;
use tokio::sync::Notify;

use crate::common::{config::Config, error::IpcError, paths, Result};
use crate::ipc::{
    protocol::{Command, Request, Response},
    transport,
};
use crate::session::SessionManager;

use super::handler;

/// A client that sends nothing for this long is dropped
const CLIENT_TIMEOUT: Duration = Duration::from_secs(300);

/// State shared between the accept loop and client tasks
struct Shared {
    manager: SessionManager,
    last_activity: Mutex<Instant>,
    shutdown: Notify,
}

impl Shared {
    fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }
}

/// Main daemon server
pub struct Daemon {
    shared: Arc<Shared>,
    idle_timeout: Duration,
    reconcile_interval: Duration,
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new(config: Config) -> Result<Self> {
        let idle_timeout = Duration::from_secs(config.daemon.idle_timeout_minutes * 60);
        let reconcile_interval = Duration::from_secs(config.daemon.reconcile_interval_secs.max(1));
        let manager = SessionManager::new(config)?;

        Ok(Self {
            shared: Arc::new(Shared {
                manager,
                last_activity: Mutex::new(Instant::now()),
                shutdown: Notify::new(),
            }),
            idle_timeout,
            reconcile_interval,
        })
    }

    /// Run the daemon main loop
    pub async fn run(&self) -> Result<()> {
        let listener = transport::create_listener().await?;
        tracing::info!("Daemon listening on {}", paths::socket_name());

        let mut reconcile = tokio::time::interval(self.reconcile_interval);
        reconcile.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_signal() => {
                    tracing::info!("Received termination signal, shutting down gracefully");
                    break;
                }
                _ = self.shared.shutdown.notified() => {
                    tracing::info!("Shutdown requested, exiting");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok(stream) => {
                            self.shared.touch();
                            let shared = Arc::clone(&self.shared);
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(shared, stream).await {
                                    tracing::error!("Error handling client: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = reconcile.tick() => {
                    let removed = self.shared.manager.reconcile().await;
                    if !removed.is_empty() {
                        tracing::info!(?removed, "Reconciled exited backends");
                    }
                    if self.shared.manager.session_count().await == 0
                        && self.shared.idle_for() > self.idle_timeout
                    {
                        tracing::info!("Idle timeout reached, shutting down daemon");
                        break;
                    }
                }
            }
        }

        tracing::info!("Cleaning up daemon resources");
        self.shared.manager.shutdown().await;

        paths::remove_socket()?;
        tracing::info!("Daemon shutdown complete");

        Ok(())
    }
}

/// Resolves on SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("Failed to install signal handlers: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

/// Resolves on Ctrl+C
#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Serve one client connection until it disconnects
async fn handle_client(shared: Arc<Shared>, stream: transport::platform::Stream) -> Result<()> {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    loop {
        let request_data =
            match tokio::time::timeout(CLIENT_TIMEOUT, transport::recv_message(&mut reader)).await
            {
                Ok(Ok(data)) => data,
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("Client disconnected");
                    break;
                }
                Ok(Err(e)) => {
                    tracing::error!("Error reading request: {}", e);
                    break;
                }
                Err(_) => {
                    tracing::debug!("Client timeout");
                    break;
                }
            };

        let request: Request = match serde_json::from_slice(&request_data) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!("Invalid request: {}", e);
                let response = Response::error(
                    0,
                    IpcError {
                        code: "INVALID_REQUEST".to_string(),
                        message: e.to_string(),
                    },
                );
                let json = serde_json::to_vec(&response)?;
                transport::send_message(&mut writer, &json).await?;
                continue;
            }
        };

        tracing::debug!("Received command: {:?}", request.command);
        let is_shutdown = matches!(request.command, Command::Shutdown);

        let response = handler::handle_command(&shared.manager, request.id, request.command).await;
        let json = serde_json::to_vec(&response)?;
        transport::send_message(&mut writer, &json).await?;
        shared.touch();

        if is_shutdown {
            shared.shutdown.notify_one();
            break;
        }
    }

    Ok(())
}
