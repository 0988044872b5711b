//! Error types for the Delve session broker
//!
//! Every error renders as a single line naming the failing operation, the
//! session it concerns (when there is one), and either the backend's own
//! message or the local precondition that failed.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the broker
#[derive(Error, Debug)]
pub enum Error {
    // === Daemon/Connection Errors ===
    #[error("Daemon not running. Start a session with 'delve-broker debug <package>'")]
    DaemonNotRunning,

    #[error("Failed to spawn daemon: timed out waiting for socket after {0} seconds")]
    DaemonSpawnTimeout(u64),

    #[error("Failed to connect to daemon: {0}")]
    DaemonConnectionFailed(#[source] io::Error),

    #[error("Daemon communication error: {0}")]
    DaemonCommunication(String),

    #[error("{message}")]
    Remote { code: String, message: String },

    // === Session Errors ===
    #[error("{operation}: debug session {id} not found")]
    SessionNotFound { operation: &'static str, id: String },

    #[error("{operation}: breakpoint {id} not found in session {session}")]
    BreakpointNotFound {
        operation: &'static str,
        session: String,
        id: i64,
    },

    // === Backend Lifecycle Errors ===
    #[error("No free local port available: {0}")]
    ResourceExhaustion(String),

    #[error("Failed to start backend '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Backend for '{kind}' session did not accept connections on port {port} within {secs} seconds")]
    BackendStartupTimeout {
        kind: String,
        port: u16,
        secs: u64,
    },

    // === Backend Protocol Errors ===
    #[error("{operation} on session {session}: transport error: {message}")]
    Transport {
        operation: &'static str,
        session: String,
        message: String,
    },

    #[error("{operation} on session {session}: backend error: {message}")]
    Backend {
        operation: &'static str,
        session: String,
        message: String,
    },

    // === Input Errors ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a session not found error
    pub fn session_not_found(operation: &'static str, id: &str) -> Self {
        Self::SessionNotFound {
            operation,
            id: id.to_string(),
        }
    }

    /// Create a transport error for a request against a running backend
    pub fn transport(operation: &'static str, session: &str, message: impl ToString) -> Self {
        Self::Transport {
            operation,
            session: session.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a backend-reported error, keeping the message verbatim
    pub fn backend(operation: &'static str, session: &str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            session: session.to_string(),
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// IPC-serializable error for daemon responses
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IpcError {
    pub code: String,
    pub message: String,
}

impl From<&Error> for IpcError {
    fn from(e: &Error) -> Self {
        let code = match e {
            Error::DaemonNotRunning => "DAEMON_NOT_RUNNING",
            Error::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            Error::BreakpointNotFound { .. } => "BREAKPOINT_NOT_FOUND",
            Error::ResourceExhaustion(_) => "RESOURCE_EXHAUSTION",
            Error::SpawnFailed { .. } => "SPAWN_FAILED",
            Error::BackendStartupTimeout { .. } => "BACKEND_STARTUP_TIMEOUT",
            Error::Transport { .. } => "TRANSPORT_ERROR",
            Error::Backend { .. } => "BACKEND_ERROR",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            _ => "INTERNAL_ERROR",
        }
        .to_string();

        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl From<IpcError> for Error {
    fn from(e: IpcError) -> Self {
        // The daemon already rendered the full message; keep it as-is.
        match e.code.as_str() {
            "DAEMON_NOT_RUNNING" => Error::DaemonNotRunning,
            _ => Error::Remote {
                code: e.code,
                message: e.message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_message_is_verbatim() {
        let err = Error::backend("set-breakpoint", "abc123", "Breakpoint exists at main.go:10");
        let text = err.to_string();
        assert!(text.contains("set-breakpoint"));
        assert!(text.contains("abc123"));
        assert!(text.ends_with("Breakpoint exists at main.go:10"));
    }

    #[test]
    fn test_ipc_codes() {
        let err = Error::session_not_found("evaluate", "missing");
        let ipc = IpcError::from(&err);
        assert_eq!(ipc.code, "SESSION_NOT_FOUND");
        assert_eq!(ipc.message, "evaluate: debug session missing not found");

        let err = Error::transport("continue", "s1", "connection refused");
        assert_eq!(IpcError::from(&err).code, "TRANSPORT_ERROR");
    }
}
