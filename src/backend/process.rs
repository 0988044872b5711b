//! Backend process supervision
//!
//! Spawns Delve with every standard stream piped, forwards its output into
//! the log, and guarantees the process is killed when the handle goes away.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, Command};

use crate::common::{Error, Result};

use super::launch::{LaunchSpec, SpawnOptions};

/// A spawned backend process, exclusively owned by one session
#[derive(Debug)]
pub struct BackendProcess {
    child: Child,
    /// Held open so the backend never sees EOF on stdin
    _stdin: Option<ChildStdin>,
    pid: Option<u32>,
    program: PathBuf,
    exit_status: Option<ExitStatus>,
}

impl BackendProcess {
    /// Start a headless backend for `spec` listening on `endpoint`
    pub fn launch(
        program: &Path,
        spec: &LaunchSpec,
        endpoint: SocketAddr,
        options: &SpawnOptions,
    ) -> Result<Self> {
        let args = spec.to_args(&endpoint.ip().to_string(), endpoint.port(), options);
        tracing::info!(
            kind = %spec.kind(),
            target = %spec.target(),
            %endpoint,
            "Starting backend"
        );
        Self::spawn(program, &args)
    }

    /// Spawn the backend without waiting for it to become ready
    pub fn spawn(program: &Path, args: &[String]) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| Error::SpawnFailed {
            program: program.display().to_string(),
            reason: e.to_string(),
        })?;

        let pid = child.id();
        tracing::debug!(program = %program.display(), ?pid, ?args, "Spawned backend");

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, pid, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, pid, "stderr");
        }

        Ok(Self {
            _stdin: child.stdin.take(),
            child,
            pid,
            program: program.to_path_buf(),
            exit_status: None,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status if the process has already ended
    pub fn try_exit_status(&mut self) -> Result<Option<ExitStatus>> {
        if self.exit_status.is_none() {
            self.exit_status = self.child.try_wait()?;
        }
        Ok(self.exit_status)
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.try_exit_status(), Ok(None))
    }

    /// Kill the process and reap it
    ///
    /// Calling this on a process that already exited is not an error.
    pub async fn terminate(&mut self) -> Result<()> {
        if self.try_exit_status()?.is_some() {
            return Ok(());
        }

        if let Err(e) = self.child.start_kill() {
            // Lost a race with the process exiting on its own
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(e.into());
            }
        }
        let status = self.child.wait().await?;
        tracing::debug!(pid = ?self.pid, %status, "Backend terminated");
        self.exit_status = Some(status);
        Ok(())
    }

    /// Wait until the backend accepts TCP connections on `addr`
    ///
    /// Probes every `interval` until `window` elapses. Fails early with
    /// `SpawnFailed` if the process exits first; the caller owns cleanup.
    pub async fn wait_ready(
        &mut self,
        addr: SocketAddr,
        window: Duration,
        interval: Duration,
    ) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + window;

        loop {
            self.check_alive()?;

            let connect_timeout = interval.max(Duration::from_millis(10));
            let attempt = tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await;
            if let Ok(Ok(_stream)) = attempt {
                tracing::debug!(%addr, pid = ?self.pid, "Backend accepting connections");
                return Ok(true);
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Wait out one probe interval and make sure the process survived it
    ///
    /// For backends that connect out instead of listening.
    pub async fn wait_alive(&mut self, interval: Duration) -> Result<()> {
        tokio::time::sleep(interval).await;
        self.check_alive()
    }

    fn check_alive(&mut self) -> Result<()> {
        match self.try_exit_status()? {
            Some(status) => Err(Error::SpawnFailed {
                program: self.program.display().to_string(),
                reason: format!("exited during startup with {}", status),
            }),
            None => Ok(()),
        }
    }
}

/// Drain a backend stream into debug logs so the pipe never fills up
fn forward_output<R>(stream: R, pid: Option<u32>, name: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "delve_broker::backend::output", ?pid, stream = name, "{}", line);
        }
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sleeper() -> BackendProcess {
        BackendProcess::spawn(Path::new("sleep"), &["30".to_string()]).unwrap()
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let mut process = sleeper();
        assert!(process.pid().is_some());
        assert!(process.is_running());

        process.terminate().await.unwrap();
        assert!(!process.is_running());
        process.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let err = BackendProcess::spawn(Path::new("/nonexistent/dlv"), &[]).unwrap_err();
        assert!(matches!(err, Error::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_wait_ready_times_out_without_listener() {
        let mut process = sleeper();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let ready = process
            .wait_ready(addr, Duration::from_millis(200), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(!ready);
        process.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_ready_detects_early_exit() {
        let mut process = BackendProcess::spawn(Path::new("true"), &[]).unwrap();
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let result = process
            .wait_ready(addr, Duration::from_secs(5), Duration::from_millis(20))
            .await;
        match result {
            Err(Error::SpawnFailed { reason, .. }) => assert!(reason.contains("exited")),
            other => panic!("Expected SpawnFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wait_ready_with_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut process = sleeper();
        let ready = process
            .wait_ready(addr, Duration::from_secs(2), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(ready);
        process.terminate().await.unwrap();
    }
}
