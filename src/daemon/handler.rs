//! Command handler for processing IPC requests
//!
//! Translates IPC commands into session manager operations.

use serde_json::json;

use crate::backend::LogSettings;
use crate::common::{error::IpcError, Result};
use crate::ipc::protocol::{
    BreakpointList, Command, EvaluateResult, ExecuteResult, Response, SessionList, StatusResult,
    VariablesResult,
};
use crate::session::SessionManager;

/// Handle an IPC command
pub async fn handle_command(manager: &SessionManager, id: u64, command: Command) -> Response {
    match handle_command_inner(manager, command).await {
        Ok(result) => Response::success(id, result),
        Err(e) => {
            tracing::debug!(error = %e, "Command failed");
            Response::error(id, IpcError::from(&e))
        }
    }
}

async fn handle_command_inner(
    manager: &SessionManager,
    command: Command,
) -> Result<serde_json::Value> {
    match command {
        // === Session Management ===
        Command::Start { spec } => {
            let summary = manager.start_session(spec).await?;
            Ok(serde_json::to_value(summary)?)
        }

        Command::Stop { session } => {
            let summary = manager.stop_session(&session).await?;
            Ok(json!({ "status": "stopped", "session": summary }))
        }

        Command::Sessions => {
            let result = SessionList {
                sessions: manager.list_sessions().await,
            };
            Ok(serde_json::to_value(result)?)
        }

        Command::Resource { uri } => {
            let resource = manager.read_resource(&uri).await?;
            Ok(serde_json::to_value(resource)?)
        }

        Command::Reconcile => {
            let removed = manager.reconcile().await;
            Ok(json!({ "removed": removed }))
        }

        // === Breakpoints ===
        Command::BreakpointSet {
            session,
            file,
            line,
            condition,
        } => {
            let breakpoint = manager
                .set_breakpoint(&session, &file, line, condition)
                .await?;
            Ok(serde_json::to_value(breakpoint)?)
        }

        Command::BreakpointRemove { session, id } => {
            let breakpoint = manager.remove_breakpoint(&session, id).await?;
            Ok(serde_json::to_value(breakpoint)?)
        }

        Command::BreakpointList { session } => {
            let breakpoints = manager.list_breakpoints(&session).await?;
            Ok(serde_json::to_value(BreakpointList {
                session,
                breakpoints,
            })?)
        }

        // === Execution Control ===
        Command::Execute { session, command } => {
            let state = manager.execute(&session, command).await?;
            Ok(serde_json::to_value(ExecuteResult {
                session,
                command,
                state,
            })?)
        }

        // === Inspection ===
        Command::Variables { session } => {
            let variables = manager.list_variables(&session).await?;
            Ok(serde_json::to_value(VariablesResult { session, variables })?)
        }

        Command::Evaluate { session, expr } => {
            let variable = manager.evaluate(&session, &expr).await?;
            Ok(serde_json::to_value(EvaluateResult {
                session,
                expr,
                variable,
            })?)
        }

        // === Backend Settings ===
        Command::SetBackend { backend } => {
            manager.set_backend(backend).await;
            Ok(json!({ "backend": backend }))
        }

        Command::ConfigureLogging {
            components,
            destination,
        } => {
            let settings = LogSettings::new(components, destination)?;
            manager.configure_logging(settings.clone()).await;
            Ok(serde_json::to_value(settings)?)
        }

        Command::Version => {
            let version = manager.version().await?;
            Ok(json!({ "version": version }))
        }

        // === Daemon ===
        Command::Status => {
            let options = manager.spawn_options().await;
            let result = StatusResult {
                daemon_running: true,
                pid: std::process::id(),
                sessions: manager.session_count().await,
                backend: options.backend,
                log_components: options.log.map(|l| l.components).unwrap_or_default(),
            };
            Ok(serde_json::to_value(result)?)
        }

        Command::Shutdown => {
            manager.shutdown().await;
            Ok(json!({}))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DebuggerBackend, LaunchSpec};
    use crate::common::config::Config;

    fn manager() -> SessionManager {
        SessionManager::new(Config::default()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_session_maps_to_code() {
        let manager = manager();
        let response = handle_command(
            &manager,
            7,
            Command::Evaluate {
                session: "missing".to_string(),
                expr: "x".to_string(),
            },
        )
        .await;

        assert_eq!(response.id, 7);
        assert!(!response.success);
        let error = response.error.unwrap();
        assert_eq!(error.code, "SESSION_NOT_FOUND");
        assert!(error.message.contains("missing"));
    }

    #[tokio::test]
    async fn test_invalid_spec_rejected() {
        let manager = manager();
        let response = handle_command(
            &manager,
            1,
            Command::Start {
                spec: LaunchSpec::Trace {
                    regexp: String::new(),
                    package: None,
                    ebpf: false,
                    stack: None,
                    pid: None,
                },
            },
        )
        .await;
        assert_eq!(response.error.unwrap().code, "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_settings_reflected_in_status() {
        let manager = manager();
        let response = handle_command(
            &manager,
            1,
            Command::SetBackend {
                backend: DebuggerBackend::Rr,
            },
        )
        .await;
        assert!(response.success);

        let response = handle_command(
            &manager,
            2,
            Command::ConfigureLogging {
                components: vec!["bogus".to_string()],
                destination: None,
            },
        )
        .await;
        assert_eq!(response.error.unwrap().code, "INVALID_ARGUMENT");

        let response = handle_command(&manager, 3, Command::Status).await;
        let status: StatusResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert_eq!(status.sessions, 0);
        assert_eq!(status.backend, Some(DebuggerBackend::Rr));
        assert!(status.log_components.is_empty());
    }
}
