//! Session facade
//!
//! Composes port allocation, process supervision, the registry and the
//! command bridge into the operations callers see. Input is validated before
//! anything else happens, and a missing session is reported before any
//! request is sent to a backend.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::backend::rpc::{self, BackendCommand, CommandBridge, ExecutionCommand, HttpBridge};
use crate::backend::types::{
    ClearBreakpointIn, CommandOut, CreateBreakpointIn, CreateBreakpointOut, DebuggerState,
    EvalIn, EvalOut, ListLocalVarsOut, Variable,
};
use crate::backend::{
    BackendProcess, DebuggerBackend, LaunchSpec, LogSettings, PortAllocator, SpawnOptions,
};
use crate::common::{config::Config, Error, Result};

use super::registry::SessionRegistry;
use super::state::{parse_resource_uri, Breakpoint, Session, SessionResource, SessionSummary};

/// Length of generated session identifiers
const SESSION_ID_LEN: usize = 12;

/// Owns every live session and the process-wide spawn settings
pub struct SessionManager {
    config: Config,
    host: IpAddr,
    registry: SessionRegistry,
    ports: PortAllocator,
    bridge: Arc<dyn CommandBridge>,
    spawn_options: RwLock<SpawnOptions>,
}

impl SessionManager {
    /// Create a manager that talks to backends over HTTP
    pub fn new(config: Config) -> Result<Self> {
        let bridge = Arc::new(HttpBridge::new(config.timeouts.request())?);
        Self::with_bridge(config, bridge)
    }

    /// Create a manager with a custom command bridge
    pub fn with_bridge(config: Config, bridge: Arc<dyn CommandBridge>) -> Result<Self> {
        let host: IpAddr = config.backend.host.parse().map_err(|e| {
            Error::Config(format!(
                "backend host '{}' is not an IP address: {}",
                config.backend.host, e
            ))
        })?;

        Ok(Self {
            config,
            host,
            registry: SessionRegistry::new(),
            ports: PortAllocator::new(host),
            bridge,
            spawn_options: RwLock::new(SpawnOptions::default()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // === Session lifecycle ===

    /// Spawn a backend and register it as a new session
    ///
    /// Either the session is registered with a backend that accepts
    /// connections, or nothing is left behind: no registry entry, no process,
    /// no reserved port.
    #[tracing::instrument(skip(self), fields(kind = %spec.kind(), target = %spec.target()))]
    pub async fn start_session(&self, spec: LaunchSpec) -> Result<SessionSummary> {
        spec.validate()?;
        let program = self.config.backend_program()?;
        let options = self.spawn_options.read().await.clone();

        let lease = self.ports.lease().await?;
        let endpoint = SocketAddr::new(self.host, lease.port());

        let mut process = BackendProcess::launch(&program, &spec, endpoint, &options)?;
        if let Err(e) = self.await_ready(&mut process, &spec, endpoint).await {
            tracing::warn!(%endpoint, error = %e, "Backend failed to start, cleaning up");
            if let Err(kill_err) = process.terminate().await {
                tracing::error!(error = %kill_err, "Failed to terminate backend after startup failure");
            }
            return Err(e);
        }

        let session = self
            .registry
            .insert_fresh(new_session_id, |id| Session::new(id, spec, endpoint, process))
            .await;
        lease.keep();
        tracing::info!(session = %session.id(), %endpoint, "Debug session started");
        Ok(session.summary().await)
    }

    async fn await_ready(
        &self,
        process: &mut BackendProcess,
        spec: &LaunchSpec,
        endpoint: SocketAddr,
    ) -> Result<()> {
        let timeouts = &self.config.timeouts;
        if !spec.listens() {
            return process.wait_alive(timeouts.probe_interval()).await;
        }

        if process
            .wait_ready(endpoint, timeouts.startup(), timeouts.probe_interval())
            .await?
        {
            Ok(())
        } else {
            Err(Error::BackendStartupTimeout {
                kind: spec.kind().to_string(),
                port: endpoint.port(),
                secs: timeouts.startup_secs,
            })
        }
    }

    /// Tear down one session: unregister, kill the backend, free its port
    pub async fn stop_session(&self, id: &str) -> Result<SessionSummary> {
        let session = self
            .registry
            .remove(id)
            .await
            .ok_or_else(|| Error::session_not_found("stop", id))?;
        let result = session.terminate().await;
        self.ports.release(session.port());
        tracing::info!(session = %id, "Debug session stopped");
        result?;
        Ok(session.summary().await)
    }

    /// Drop sessions whose backend exited on its own
    ///
    /// Returns the ids that were removed.
    pub async fn reconcile(&self) -> Vec<String> {
        let mut removed = Vec::new();
        for session in self.registry.list().await {
            if session.is_alive().await {
                continue;
            }
            if self.registry.remove_exact(&session).await {
                session.terminate().await.ok();
                self.ports.release(session.port());
                tracing::warn!(
                    session = %session.id(),
                    kind = %session.kind(),
                    "Backend exited, session removed"
                );
                removed.push(session.id().to_string());
            }
        }
        removed
    }

    /// Kill every backend and wait for each to exit
    pub async fn shutdown(&self) {
        let sessions = self.registry.drain().await;
        if !sessions.is_empty() {
            tracing::info!(count = sessions.len(), "Terminating all backends");
        }
        for session in sessions {
            if let Err(e) = session.terminate().await {
                tracing::error!(session = %session.id(), error = %e, "Failed to terminate backend");
            }
            self.ports.release(session.port());
        }
    }

    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut summaries = Vec::new();
        for session in self.registry.list().await {
            summaries.push(session.summary().await);
        }
        summaries
    }

    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    /// Ports currently held by live sessions
    pub fn reserved_ports(&self) -> usize {
        self.ports.reserved_count()
    }

    /// Resolve a `delve:///<id>` URI to its session document
    pub async fn read_resource(&self, uri: &str) -> Result<SessionResource> {
        let id = parse_resource_uri(uri).ok_or_else(|| {
            Error::invalid_argument(format!("'{}' is not a delve:///<session> URI", uri))
        })?;
        Ok(self.registry.get("read-resource", id).await?.resource())
    }

    // === Breakpoints ===

    /// Create a breakpoint and mirror it under the backend's id
    pub async fn set_breakpoint(
        &self,
        id: &str,
        file: &str,
        line: u32,
        condition: Option<String>,
    ) -> Result<Breakpoint> {
        const OP: &str = "set-breakpoint";
        if file.trim().is_empty() {
            return Err(Error::invalid_argument("breakpoint file is required"));
        }
        if line == 0 {
            return Err(Error::invalid_argument("breakpoint line must be at least 1"));
        }
        let condition = condition.filter(|c| !c.trim().is_empty());

        let session = self.registry.get(OP, id).await?;
        let command = BackendCommand::CreateBreakpoint(CreateBreakpointIn {
            file: file.to_string(),
            line,
            cond: condition.clone(),
        });
        let reply: CreateBreakpointOut = self.call(&session, &command).await?;
        let bp_id = reply.id().ok_or_else(|| {
            Error::transport(OP, id, "CreateBreakpoint response has no breakpoint id")
        })?;

        let breakpoint = Breakpoint {
            id: bp_id,
            file: file.to_string(),
            line,
            condition,
        };
        session.record_breakpoint(breakpoint.clone()).await;
        tracing::info!(session = %id, breakpoint = bp_id, %file, line, "Breakpoint set");
        Ok(breakpoint)
    }

    /// Clear a breakpoint known to the local mirror
    ///
    /// The mirror entry is removed only after the backend confirms.
    pub async fn remove_breakpoint(&self, id: &str, breakpoint_id: i64) -> Result<Breakpoint> {
        const OP: &str = "remove-breakpoint";
        let session = self.registry.get(OP, id).await?;
        if session.breakpoint(breakpoint_id).await.is_none() {
            return Err(Error::BreakpointNotFound {
                operation: OP,
                session: id.to_string(),
                id: breakpoint_id,
            });
        }

        let command = BackendCommand::ClearBreakpoint(ClearBreakpointIn { id: breakpoint_id });
        self.bridge
            .send(session.id(), session.endpoint(), &command)
            .await?;

        let removed = session
            .forget_breakpoint(breakpoint_id)
            .await
            .ok_or_else(|| Error::BreakpointNotFound {
                operation: OP,
                session: id.to_string(),
                id: breakpoint_id,
            })?;
        tracing::info!(session = %id, breakpoint = breakpoint_id, "Breakpoint removed");
        Ok(removed)
    }

    pub async fn list_breakpoints(&self, id: &str) -> Result<Vec<Breakpoint>> {
        Ok(self.registry.get("list-breakpoints", id).await?.breakpoints().await)
    }

    // === Execution and inspection ===

    /// Forward continue/next/step/step-out to the backend
    pub async fn execute(&self, id: &str, command: ExecutionCommand) -> Result<DebuggerState> {
        let session = self.registry.get(command.operation(), id).await?;
        let reply: CommandOut = self
            .call(&session, &BackendCommand::Command(command))
            .await?;
        Ok(reply.state)
    }

    pub async fn list_variables(&self, id: &str) -> Result<Vec<Variable>> {
        let session = self.registry.get("list-variables", id).await?;
        let reply: ListLocalVarsOut = self.call(&session, &BackendCommand::ListLocalVars).await?;
        Ok(reply.variables)
    }

    pub async fn evaluate(&self, id: &str, expr: &str) -> Result<Variable> {
        if expr.trim().is_empty() {
            return Err(Error::invalid_argument("expression is required"));
        }
        let session = self.registry.get("evaluate", id).await?;
        let command = BackendCommand::Eval(EvalIn {
            expr: expr.to_string(),
        });
        let reply: EvalOut = self.call(&session, &command).await?;
        Ok(reply.variable)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        session: &Session,
        command: &BackendCommand,
    ) -> Result<T> {
        rpc::call(self.bridge.as_ref(), session.id(), session.endpoint(), command).await
    }

    // === Process-wide settings ===

    /// Select the low-level backend for sessions started from now on
    pub async fn set_backend(&self, backend: DebuggerBackend) {
        self.spawn_options.write().await.backend = Some(backend);
        tracing::info!(backend = backend.as_str(), "Backend selection updated");
    }

    /// Enable backend logging for sessions started from now on
    pub async fn configure_logging(&self, log: LogSettings) {
        tracing::info!(components = ?log.components, destination = ?log.destination, "Backend logging updated");
        self.spawn_options.write().await.log = Some(log);
    }

    pub async fn spawn_options(&self) -> SpawnOptions {
        self.spawn_options.read().await.clone()
    }

    /// Version report of the configured backend executable
    pub async fn version(&self) -> Result<String> {
        let program: PathBuf = self.config.backend_program()?;
        let output = tokio::process::Command::new(&program)
            .arg("version")
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| Error::SpawnFailed {
                program: program.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::SpawnFailed {
                program: program.display().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn new_session_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(SESSION_ID_LEN);
    id
}
