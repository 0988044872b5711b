//! Per-session state: one backend process plus its mirrored breakpoints

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::backend::{BackendProcess, LaunchSpec, SessionKind};
use crate::common::Result;

/// URI scheme under which sessions are exposed as resources
pub const RESOURCE_SCHEME: &str = "delve";

/// A breakpoint the backend acknowledged creating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Backend-assigned identifier
    pub id: i64,
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Overview of a session for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub kind: SessionKind,
    pub target: String,
    pub port: u16,
    pub uri: String,
    pub pid: Option<u32>,
    pub alive: bool,
    pub breakpoints: usize,
}

/// The read-only document behind `delve:///<id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub target: String,
    pub port: u16,
}

/// Live debugging conversation with one backend process
#[derive(Debug)]
pub struct Session {
    id: String,
    spec: LaunchSpec,
    target: String,
    endpoint: SocketAddr,
    created_at: SystemTime,
    process: Mutex<BackendProcess>,
    breakpoints: Mutex<HashMap<i64, Breakpoint>>,
}

impl Session {
    pub fn new(id: String, spec: LaunchSpec, endpoint: SocketAddr, process: BackendProcess) -> Self {
        Self {
            id,
            target: spec.target(),
            spec,
            endpoint,
            created_at: SystemTime::now(),
            process: Mutex::new(process),
            breakpoints: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.spec.kind()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn uri(&self) -> String {
        format!("{}:///{}", RESOURCE_SCHEME, self.id)
    }

    /// Whether the backend process is still running
    pub async fn is_alive(&self) -> bool {
        self.process.lock().await.is_running()
    }

    pub async fn pid(&self) -> Option<u32> {
        self.process.lock().await.pid()
    }

    /// Kill the backend process; harmless if it is already gone
    pub async fn terminate(&self) -> Result<()> {
        self.process.lock().await.terminate().await
    }

    /// Mirror a breakpoint the backend has created
    pub async fn record_breakpoint(&self, breakpoint: Breakpoint) {
        self.breakpoints
            .lock()
            .await
            .insert(breakpoint.id, breakpoint);
    }

    pub async fn breakpoint(&self, id: i64) -> Option<Breakpoint> {
        self.breakpoints.lock().await.get(&id).cloned()
    }

    pub async fn forget_breakpoint(&self, id: i64) -> Option<Breakpoint> {
        self.breakpoints.lock().await.remove(&id)
    }

    /// Mirrored breakpoints ordered by id
    pub async fn breakpoints(&self) -> Vec<Breakpoint> {
        let mut list: Vec<_> = self.breakpoints.lock().await.values().cloned().collect();
        list.sort_by_key(|bp| bp.id);
        list
    }

    pub async fn summary(&self) -> SessionSummary {
        let (pid, alive) = {
            let mut process = self.process.lock().await;
            (process.pid(), process.is_running())
        };
        SessionSummary {
            id: self.id.clone(),
            kind: self.kind(),
            target: self.target.clone(),
            port: self.port(),
            uri: self.uri(),
            pid,
            alive,
            breakpoints: self.breakpoints.lock().await.len(),
        }
    }

    pub fn resource(&self) -> SessionResource {
        SessionResource {
            id: self.id.clone(),
            kind: self.kind(),
            target: self.target.clone(),
            port: self.port(),
        }
    }
}

/// Extract the session id from a `delve:///<id>` URI
pub fn parse_resource_uri(uri: &str) -> Option<&str> {
    let rest = uri.strip_prefix(RESOURCE_SCHEME)?.strip_prefix("://")?;
    let id = rest.trim_start_matches('/');
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(id)
}
