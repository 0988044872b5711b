//! Delve session broker
//!
//! Starts and supervises headless Delve backends, one per debug session, and
//! relays breakpoint, execution and inspection commands to them over their
//! JSON API.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod common;
pub mod daemon;
pub mod ipc;
pub mod session;

// Re-export commonly used types for tests
pub use backend::{ExecutionCommand, LaunchSpec};
pub use common::{Error, Result};
pub use session::SessionManager;
