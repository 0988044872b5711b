//! Everything that talks to the Delve backend
//!
//! - `port`: local port reservation for backend listeners
//! - `launch`: session kinds and the backend command line
//! - `process`: spawning, readiness probing and termination
//! - `rpc`: the request/response bridge to a running backend

pub mod launch;
pub mod port;
pub mod process;
pub mod rpc;
pub mod types;

pub use launch::{DebuggerBackend, LaunchSpec, LogSettings, SessionKind, SpawnOptions};
pub use port::PortAllocator;
pub use process::BackendProcess;
pub use rpc::{BackendCommand, CommandBridge, ExecutionCommand, HttpBridge};
