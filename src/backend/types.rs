//! Delve API v2 message types
//!
//! Request bodies are fixed by the backend. Response types only name the
//! fields the broker reads; anything else the backend sends is ignored.

use serde::{Deserialize, Serialize};

/// Body of `CreateBreakpoint`
#[derive(Debug, Clone, Serialize)]
pub struct CreateBreakpointIn {
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cond: Option<String>,
}

/// Body of `ClearBreakpoint`
#[derive(Debug, Clone, Serialize)]
pub struct ClearBreakpointIn {
    pub id: i64,
}

/// Body of `Command`
#[derive(Debug, Clone, Serialize)]
pub struct CommandIn {
    pub name: String,
}

/// Body of `Eval`
#[derive(Debug, Clone, Serialize)]
pub struct EvalIn {
    pub expr: String,
}

/// Breakpoint as reported by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendBreakpoint {
    pub id: i64,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line: u32,
    #[serde(rename = "functionName", default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(rename = "Cond", default, skip_serializing_if = "Option::is_none")]
    pub cond: Option<String>,
}

/// Response to `CreateBreakpoint`
///
/// The id arrives either at the top level or inside a `Breakpoint` object,
/// depending on the backend build.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBreakpointOut {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "Breakpoint", default)]
    pub breakpoint: Option<BackendBreakpoint>,
}

impl CreateBreakpointOut {
    pub fn id(&self) -> Option<i64> {
        self.id.or_else(|| self.breakpoint.as_ref().map(|bp| bp.id))
    }
}

/// A variable or evaluation result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub kind: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Variable>,
}

/// Response to `ListLocalVars`
#[derive(Debug, Clone, Deserialize)]
pub struct ListLocalVarsOut {
    #[serde(rename = "Variables", default)]
    pub variables: Vec<Variable>,
}

/// Response to `Eval`
#[derive(Debug, Clone, Deserialize)]
pub struct EvalOut {
    #[serde(rename = "Variable")]
    pub variable: Variable,
}

/// Location of the thread the debugger is focused on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadLocation {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line: u32,
}

/// Debugger state after an execution command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebuggerState {
    #[serde(rename = "Running", default)]
    pub running: bool,
    #[serde(rename = "currentThread", default, skip_serializing_if = "Option::is_none")]
    pub current_thread: Option<ThreadLocation>,
    #[serde(default)]
    pub exited: bool,
    #[serde(rename = "exitStatus", default)]
    pub exit_status: i32,
}

/// Response to `Command`
#[derive(Debug, Clone, Deserialize)]
pub struct CommandOut {
    #[serde(rename = "State", default)]
    pub state: DebuggerState,
}
