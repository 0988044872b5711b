//! IPC protocol message types
//!
//! Defines the request/response format for CLI ↔ daemon communication.
//! Uses a simple length-prefixed JSON protocol.

use serde::{Deserialize, Serialize};

use crate::backend::types::{DebuggerState, Variable};
use crate::backend::{DebuggerBackend, ExecutionCommand, LaunchSpec};
use crate::common::error::IpcError;
use crate::session::{Breakpoint, SessionSummary};

/// IPC request from CLI to daemon
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for matching responses
    pub id: u64,
    /// The command to execute
    pub command: Command,
}

/// IPC response from daemon to CLI
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this response corresponds to
    pub id: u64,
    /// Whether the command succeeded
    pub success: bool,
    /// Result data on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error information on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<IpcError>,
}

impl Response {
    /// Create a success response
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: u64, error: IpcError) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error),
        }
    }

    /// Create a success response with no data
    pub fn ok(id: u64) -> Self {
        Self {
            id,
            success: true,
            result: Some(serde_json::json!({})),
            error: None,
        }
    }
}

/// Commands that can be sent from CLI to daemon
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // === Session Management ===
    /// Spawn a backend and register a session
    Start { spec: LaunchSpec },

    /// Tear down a session
    Stop { session: String },

    /// List live sessions
    Sessions,

    /// Read the document behind a `delve:///<id>` URI
    Resource { uri: String },

    /// Drop sessions whose backend has exited
    Reconcile,

    // === Breakpoints ===
    BreakpointSet {
        session: String,
        file: String,
        line: u32,
        condition: Option<String>,
    },

    BreakpointRemove { session: String, id: i64 },

    BreakpointList { session: String },

    // === Execution Control ===
    /// continue / next / step / step-out
    Execute {
        session: String,
        command: ExecutionCommand,
    },

    // === Inspection ===
    Variables { session: String },

    Evaluate { session: String, expr: String },

    // === Backend Settings ===
    /// Low-level backend for future sessions
    SetBackend { backend: DebuggerBackend },

    /// Backend log output for future sessions
    ConfigureLogging {
        components: Vec<String>,
        destination: Option<String>,
    },

    /// Backend version report
    Version,

    // === Daemon ===
    Status,

    Shutdown,
}

/// Result of `Sessions`
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<SessionSummary>,
}

/// Result of `BreakpointList`
#[derive(Debug, Serialize, Deserialize)]
pub struct BreakpointList {
    pub session: String,
    pub breakpoints: Vec<Breakpoint>,
}

/// Result of `Execute`
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub session: String,
    pub command: ExecutionCommand,
    pub state: DebuggerState,
}

/// Result of `Variables`
#[derive(Debug, Serialize, Deserialize)]
pub struct VariablesResult {
    pub session: String,
    pub variables: Vec<Variable>,
}

/// Result of `Evaluate`
#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluateResult {
    pub session: String,
    pub expr: String,
    pub variable: Variable,
}

/// Result of `Status`
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResult {
    pub daemon_running: bool,
    pub pid: u32,
    pub sessions: usize,
    pub backend: Option<DebuggerBackend>,
    pub log_components: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_command_wire_format() {
        let request = Request {
            id: 3,
            command: Command::Start {
                spec: LaunchSpec::Core {
                    executable: "./server".to_string(),
                    core_path: "core.1".to_string(),
                },
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 3,
                "command": {
                    "type": "start",
                    "spec": {"kind": "core", "executable": "./server", "core_path": "core.1"}
                }
            })
        );
    }

    #[test]
    fn test_execute_round_trip() {
        let raw = json!({"type": "execute", "session": "abc", "command": "step_out"});
        let command: Command = serde_json::from_value(raw).unwrap();
        match command {
            Command::Execute { session, command } => {
                assert_eq!(session, "abc");
                assert_eq!(command, ExecutionCommand::StepOut);
            }
            other => panic!("Expected Execute, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        let raw = json!({"type": "restart", "session": "abc"});
        assert!(serde_json::from_value::<Command>(raw).is_err());
    }
}
