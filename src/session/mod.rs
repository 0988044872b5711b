//! Debug session management
//!
//! A session pairs one spawned backend with its endpoint and a local mirror
//! of the breakpoints it holds. `SessionManager` is the only way to create,
//! drive and destroy sessions.

pub mod manager;
pub mod registry;
pub mod state;

pub use manager::SessionManager;
pub use registry::SessionRegistry;
pub use state::{Breakpoint, Session, SessionResource, SessionSummary, RESOURCE_SCHEME};
