//! End-to-end tests for the session manager
//!
//! These run real backend processes using the `mock_dlv` binary built
//! alongside the broker, which speaks the same command line and JSON API as
//! Delve.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use delve_broker::backend::rpc::{BackendCommand, CommandBridge, HttpBridge};
use delve_broker::backend::SessionKind;
use delve_broker::common::config::Config;
use delve_broker::{Error, ExecutionCommand, LaunchSpec, Result, SessionManager};

/// Bridge that records every request before passing it to the real one
struct RecordingBridge {
    inner: HttpBridge,
    calls: Mutex<Vec<(&'static str, Value)>>,
}

impl RecordingBridge {
    fn new() -> Self {
        Self {
            inner: HttpBridge::new(Duration::from_secs(5)).expect("http client"),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(&'static str, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandBridge for RecordingBridge {
    async fn send(
        &self,
        session: &str,
        endpoint: SocketAddr,
        command: &BackendCommand,
    ) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((command.name(), command.body().unwrap()));
        self.inner.send(session, endpoint, command).await
    }
}

fn mock_config(startup_secs: u64) -> Config {
    let mut config = Config::default();
    config.backend.path = PathBuf::from(env!("CARGO_BIN_EXE_mock_dlv"));
    config.timeouts.startup_secs = startup_secs;
    config.timeouts.probe_interval_ms = 20;
    config.timeouts.request_secs = 5;
    config
}

fn manager() -> (SessionManager, Arc<RecordingBridge>) {
    let bridge = Arc::new(RecordingBridge::new());
    let manager = SessionManager::with_bridge(mock_config(10), bridge.clone()).unwrap();
    (manager, bridge)
}

fn debug_current_dir() -> LaunchSpec {
    LaunchSpec::Debug {
        package: Some(".".to_string()),
        build_flags: None,
    }
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[tokio::test]
async fn test_start_session_registers_it() {
    let (manager, _) = manager();

    let summary = manager.start_session(debug_current_dir()).await.unwrap();
    assert!(!summary.id.is_empty());
    assert!(summary.port >= 1024);
    assert_eq!(summary.kind, SessionKind::Debug);
    assert_eq!(summary.target, ".");
    assert!(summary.alive);
    assert_eq!(summary.uri, format!("delve:///{}", summary.id));

    let sessions = manager.list_sessions().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, summary.id);
    assert_eq!(manager.reserved_ports(), 1);

    let resource = manager.read_resource(&summary.uri).await.unwrap();
    assert_eq!(resource.id, summary.id);
    assert_eq!(resource.kind, SessionKind::Debug);
    assert_eq!(resource.port, summary.port);
    assert_eq!(
        serde_json::to_value(&resource).unwrap(),
        json!({"id": summary.id, "type": "debug", "target": ".", "port": summary.port})
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn test_breakpoint_lifecycle() {
    let (manager, bridge) = manager();
    let session = manager.start_session(debug_current_dir()).await.unwrap();

    let bp = manager
        .set_breakpoint(&session.id, "main.go", 10, None)
        .await
        .unwrap();
    assert_eq!(bp.id, 1);
    assert_eq!(bp.file, "main.go");
    assert_eq!(bp.line, 10);

    let calls = bridge.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "CreateBreakpoint");
    assert_eq!(calls[0].1, json!({"file": "main.go", "line": 10}));

    // Duplicate location: the backend's message comes through untouched
    match manager.set_breakpoint(&session.id, "main.go", 10, None).await {
        Err(Error::Backend {
            operation, message, ..
        }) => {
            assert_eq!(operation, "set-breakpoint");
            assert_eq!(message, "Breakpoint exists at main.go:10 at 1");
        }
        other => panic!("Expected backend error, got {:?}", other),
    }
    assert_eq!(manager.list_breakpoints(&session.id).await.unwrap(), vec![bp.clone()]);

    // Unknown id is rejected locally without a backend round trip
    let before = bridge.calls().len();
    match manager.remove_breakpoint(&session.id, 99).await {
        Err(Error::BreakpointNotFound { id, .. }) => assert_eq!(id, 99),
        other => panic!("Expected BreakpointNotFound, got {:?}", other),
    }
    assert_eq!(bridge.calls().len(), before);
    assert_eq!(manager.list_breakpoints(&session.id).await.unwrap().len(), 1);

    let removed = manager.remove_breakpoint(&session.id, bp.id).await.unwrap();
    assert_eq!(removed, bp);
    assert!(manager.list_breakpoints(&session.id).await.unwrap().is_empty());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_breakpoint_changes_keep_unrelated_entries() {
    let (manager, _) = manager();
    let manager = Arc::new(manager);
    let session = manager.start_session(debug_current_dir()).await.unwrap();

    let first = manager
        .set_breakpoint(&session.id, "main.go", 1, None)
        .await
        .unwrap()
        .id;

    let mut tasks = Vec::new();
    for line in 100..140u32 {
        let manager = Arc::clone(&manager);
        let id = session.id.clone();
        tasks.push(tokio::spawn(async move {
            manager.set_breakpoint(&id, "main.go", line, None).await
        }));
    }
    let remover = {
        let manager = Arc::clone(&manager);
        let id = session.id.clone();
        tokio::spawn(async move { manager.remove_breakpoint(&id, first).await })
    };

    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(remover.await.unwrap().unwrap().id, first);

    let breakpoints = manager.list_breakpoints(&session.id).await.unwrap();
    assert_eq!(breakpoints.len(), 40);
    assert!(breakpoints.iter().all(|bp| bp.id != first));
    let mut lines: Vec<u32> = breakpoints.iter().map(|bp| bp.line).collect();
    lines.sort_unstable();
    assert_eq!(lines, (100..140).collect::<Vec<u32>>());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_execution_and_inspection() {
    let (manager, bridge) = manager();
    let session = manager.start_session(debug_current_dir()).await.unwrap();

    manager
        .set_breakpoint(&session.id, "main.go", 10, Some("x > 1".to_string()))
        .await
        .unwrap();

    let state = manager
        .execute(&session.id, ExecutionCommand::Continue)
        .await
        .unwrap();
    assert!(!state.exited);
    let thread = state.current_thread.unwrap();
    assert_eq!((thread.file.as_str(), thread.line), ("main.go", 10));

    let state = manager
        .execute(&session.id, ExecutionCommand::StepOut)
        .await
        .unwrap();
    assert_eq!(state.current_thread.unwrap().line, 11);
    assert_eq!(bridge.calls().last().unwrap().1, json!({"name": "stepout"}));

    let variables = manager.list_variables(&session.id).await.unwrap();
    assert!(variables.iter().any(|v| v.name == "x" && v.value == "41"));

    let result = manager.evaluate(&session.id, "x+1").await.unwrap();
    assert_eq!(result.value, "42");
    assert_eq!(result.type_name, "int");

    match manager.evaluate(&session.id, "y").await {
        Err(Error::Backend { operation, message, .. }) => {
            assert_eq!(operation, "evaluate");
            assert_eq!(message, "could not find symbol value for y");
        }
        other => panic!("Expected backend error, got {:?}", other),
    }

    manager.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_starts_get_distinct_ports() {
    let (manager, _) = manager();

    let (a, b, c, d) = tokio::join!(
        manager.start_session(debug_current_dir()),
        manager.start_session(LaunchSpec::Test {
            package: None,
            test_flags: vec!["-test.run".to_string(), "TestFoo".to_string()],
        }),
        manager.start_session(LaunchSpec::Exec {
            binary: "./server".to_string(),
            args: vec!["--port".to_string(), "9000".to_string()],
        }),
        manager.start_session(LaunchSpec::Core {
            executable: "./server".to_string(),
            core_path: "core.1234".to_string(),
        }),
    );
    let summaries = [a.unwrap(), b.unwrap(), c.unwrap(), d.unwrap()];

    let mut ports: Vec<u16> = summaries.iter().map(|s| s.port).collect();
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(ports.len(), 4);

    let mut ids: Vec<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);

    assert_eq!(manager.session_count().await, 4);
    assert_eq!(manager.reserved_ports(), 4);

    manager.shutdown().await;
    assert_eq!(manager.session_count().await, 0);
    assert_eq!(manager.reserved_ports(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_startup_timeout_leaves_nothing_behind() {
    let bridge = Arc::new(RecordingBridge::new());
    let manager = SessionManager::with_bridge(mock_config(1), bridge).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("backend.pid");

    let err = manager
        .start_session(LaunchSpec::Exec {
            binary: "no-listen".to_string(),
            args: vec![pid_file.display().to_string()],
        })
        .await
        .unwrap_err();
    match err {
        Error::BackendStartupTimeout { kind, secs, .. } => {
            assert_eq!(kind, "exec");
            assert_eq!(secs, 1);
        }
        other => panic!("Expected BackendStartupTimeout, got {:?}", other),
    }

    assert_eq!(manager.session_count().await, 0);
    assert_eq!(manager.reserved_ports(), 0);

    let pid: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(!process_exists(pid), "backend {} still running", pid);
}

#[tokio::test]
async fn test_early_exit_is_spawn_failure() {
    let (manager, _) = manager();

    let err = manager
        .start_session(LaunchSpec::Debug {
            package: Some("exit-early".to_string()),
            build_flags: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SpawnFailed { .. }), "{:?}", err);
    assert_eq!(manager.session_count().await, 0);
    assert_eq!(manager.reserved_ports(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_dead_backend_reports_transport_error_until_reconciled() {
    let (manager, _) = manager();
    let session = manager.start_session(debug_current_dir()).await.unwrap();
    let pid = session.pid.unwrap();

    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
    for _ in 0..100 {
        if !manager.list_sessions().await[0].alive {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    match manager.execute(&session.id, ExecutionCommand::Continue).await {
        Err(Error::Transport { operation, session: id, .. }) => {
            assert_eq!(operation, "continue");
            assert_eq!(id, session.id);
        }
        other => panic!("Expected transport error, got {:?}", other),
    }
    assert_eq!(manager.session_count().await, 1);

    let removed = manager.reconcile().await;
    assert_eq!(removed, vec![session.id.clone()]);
    assert_eq!(manager.session_count().await, 0);
    assert_eq!(manager.reserved_ports(), 0);

    assert!(matches!(
        manager.execute(&session.id, ExecutionCommand::Continue).await,
        Err(Error::SessionNotFound { .. })
    ));
}

#[tokio::test]
async fn test_missing_session_never_reaches_backend() {
    let (manager, bridge) = manager();
    let _live = manager.start_session(debug_current_dir()).await.unwrap();

    match manager.evaluate("does-not-exist", "x").await {
        Err(Error::SessionNotFound { operation, id }) => {
            assert_eq!(operation, "evaluate");
            assert_eq!(id, "does-not-exist");
        }
        other => panic!("Expected SessionNotFound, got {:?}", other),
    }
    assert!(bridge.calls().is_empty());

    manager.shutdown().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_stop_and_shutdown_kill_backends() {
    let (manager, _) = manager();
    let first = manager.start_session(debug_current_dir()).await.unwrap();
    let second = manager
        .start_session(LaunchSpec::Attach { pid: std::process::id() })
        .await
        .unwrap();
    assert_eq!(second.target, std::process::id().to_string());

    let stopped = manager.stop_session(&first.id).await.unwrap();
    assert_eq!(stopped.id, first.id);
    assert!(!process_exists(first.pid.unwrap()));
    assert_eq!(manager.session_count().await, 1);
    assert!(matches!(
        manager.stop_session(&first.id).await,
        Err(Error::SessionNotFound { .. })
    ));

    manager.shutdown().await;
    assert!(!process_exists(second.pid.unwrap()));
    assert_eq!(manager.session_count().await, 0);
    assert_eq!(manager.reserved_ports(), 0);
}

#[tokio::test]
async fn test_version_reports_backend() {
    let (manager, _) = manager();
    let version = manager.version().await.unwrap();
    assert!(version.contains("1.23.0-mock"));
}
