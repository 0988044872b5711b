//! Command bridge to a running backend
//!
//! Each command is one `POST http://<endpoint>/api/v2/<Name>` with a JSON
//! body, answered by one JSON document. Nothing is retried here.
//!
//! Failures fall in two classes that callers must be able to tell apart:
//! - transport: the endpoint could not be reached, the request timed out,
//!   or the reply was not well-formed JSON of the expected shape
//! - backend: a well-formed reply carrying an `error` message, passed on
//!   verbatim

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{Error, Result};

use super::types::{ClearBreakpointIn, CommandIn, CreateBreakpointIn, EvalIn};

/// API version segment of every request path
pub const API_VERSION: &str = "v2";

/// Execution control commands sent through `Command`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionCommand {
    Continue,
    Next,
    Step,
    StepOut,
}

impl ExecutionCommand {
    /// Name understood by the backend
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Next => "next",
            Self::Step => "step",
            Self::StepOut => "stepout",
        }
    }

    /// Operation name used in error messages
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Next => "next",
            Self::Step => "step",
            Self::StepOut => "step-out",
        }
    }
}

/// A single backend request
#[derive(Debug, Clone)]
pub enum BackendCommand {
    CreateBreakpoint(CreateBreakpointIn),
    ClearBreakpoint(ClearBreakpointIn),
    Command(ExecutionCommand),
    ListLocalVars,
    Eval(EvalIn),
}

impl BackendCommand {
    /// Path segment after `/api/v2/`
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateBreakpoint(_) => "CreateBreakpoint",
            Self::ClearBreakpoint(_) => "ClearBreakpoint",
            Self::Command(_) => "Command",
            Self::ListLocalVars => "ListLocalVars",
            Self::Eval(_) => "Eval",
        }
    }

    /// Facade operation this request belongs to
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateBreakpoint(_) => "set-breakpoint",
            Self::ClearBreakpoint(_) => "remove-breakpoint",
            Self::Command(cmd) => cmd.operation(),
            Self::ListLocalVars => "list-variables",
            Self::Eval(_) => "evaluate",
        }
    }

    /// JSON request body
    pub fn body(&self) -> Result<Value> {
        let body = match self {
            Self::CreateBreakpoint(args) => serde_json::to_value(args)?,
            Self::ClearBreakpoint(args) => serde_json::to_value(args)?,
            Self::Command(cmd) => serde_json::to_value(CommandIn {
                name: cmd.wire_name().to_string(),
            })?,
            Self::ListLocalVars => Value::Object(Default::default()),
            Self::Eval(args) => serde_json::to_value(args)?,
        };
        Ok(body)
    }

    /// Whether the backend holds the reply until the program stops again
    ///
    /// Execution commands can legitimately run for as long as the debuggee
    /// does, so they get no request deadline.
    pub fn waits_for_stop(&self) -> bool {
        matches!(self, Self::Command(_))
    }
}

/// Sends commands to a session's backend endpoint
#[async_trait]
pub trait CommandBridge: Send + Sync {
    /// Issue one command and return the decoded reply
    ///
    /// `session` only labels errors; `endpoint` is where the request goes.
    async fn send(
        &self,
        session: &str,
        endpoint: SocketAddr,
        command: &BackendCommand,
    ) -> Result<Value>;
}

/// Send a command and decode the reply into `T`
///
/// A reply that does not match `T` is a transport error: the exchange
/// produced no usable data.
pub async fn call<T: DeserializeOwned>(
    bridge: &dyn CommandBridge,
    session: &str,
    endpoint: SocketAddr,
    command: &BackendCommand,
) -> Result<T> {
    let value = bridge.send(session, endpoint, command).await?;
    serde_json::from_value(value).map_err(|e| {
        Error::transport(
            command.operation(),
            session,
            format!("unexpected {} response: {}", command.name(), e),
        )
    })
}

/// HTTP implementation of the bridge
///
/// Connecting is always bounded by `timeout`. The whole exchange is bounded
/// by it too, except for execution commands, which wait on the debuggee.
pub struct HttpBridge {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpBridge {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0)
            .no_proxy()
            .user_agent(concat!("delve-broker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            request_timeout: timeout,
        })
    }
}

#[async_trait]
impl CommandBridge for HttpBridge {
    async fn send(
        &self,
        session: &str,
        endpoint: SocketAddr,
        command: &BackendCommand,
    ) -> Result<Value> {
        let operation = command.operation();
        let url = format!("http://{}/api/{}/{}", endpoint, API_VERSION, command.name());
        let body = command.body()?;

        tracing::debug!(session, %url, %body, "Backend request");

        let mut request = self.client.post(&url).json(&body);
        if !command.waits_for_stop() {
            request = request.timeout(self.request_timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(operation, session, describe_reqwest(&e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(operation, session, describe_reqwest(&e)))?;

        tracing::debug!(session, status = status.as_u16(), body = %text, "Backend response");

        interpret_reply(operation, session, status.as_u16(), &text)
    }
}

fn describe_reqwest(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("backend unreachable: {}", e)
    } else {
        e.to_string()
    }
}

/// Classify a reply by its status and body
fn interpret_reply(operation: &'static str, session: &str, status: u16, text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        Error::transport(
            operation,
            session,
            format!("malformed response (HTTP {}): {}", status, e),
        )
    })?;

    if let Some(message) = value.get("error").and_then(Value::as_str) {
        if !message.is_empty() {
            return Err(Error::backend(operation, session, message));
        }
    }

    if !(200..300).contains(&status) {
        return Err(Error::backend(operation, session, text.trim()));
    }

    Ok(value)
}
