//! Backend invocation
//!
//! Describes what a session asks Delve to do and turns it into the exact
//! command line for a headless, multi-client, API v2 server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

/// Session kind, mapped one-to-one onto a Delve subcommand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Build and launch a package (`dlv debug`)
    Debug,
    /// Attach to a running process (`dlv attach`)
    Attach,
    /// Run a precompiled binary (`dlv exec`)
    Exec,
    /// Build and debug a test binary (`dlv test`)
    Test,
    /// Inspect a core dump (`dlv core`)
    Core,
    /// Start a DAP server (`dlv dap`)
    Dap,
    /// Replay an rr recording (`dlv replay`)
    Replay,
    /// Trace function calls (`dlv trace`)
    Trace,
}

impl SessionKind {
    pub fn subcommand(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Attach => "attach",
            Self::Exec => "exec",
            Self::Test => "test",
            Self::Core => "core",
            Self::Dap => "dap",
            Self::Replay => "replay",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subcommand())
    }
}

/// A session-starting request with the arguments its kind needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LaunchSpec {
    Debug {
        package: Option<String>,
        build_flags: Option<String>,
    },
    Attach {
        pid: u32,
    },
    Exec {
        binary: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Test {
        package: Option<String>,
        #[serde(default)]
        test_flags: Vec<String>,
    },
    Core {
        executable: String,
        core_path: String,
    },
    Dap {
        client_addr: Option<String>,
    },
    Replay {
        trace_path: String,
        on_process: Option<u32>,
    },
    Trace {
        regexp: String,
        package: Option<String>,
        #[serde(default)]
        ebpf: bool,
        stack: Option<u32>,
        pid: Option<u32>,
    },
}

fn package_or_default(package: &Option<String>) -> String {
    match package.as_deref() {
        Some(p) if !p.trim().is_empty() => p.to_string(),
        _ => ".".to_string(),
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid_argument(format!("{} is required", field)));
    }
    Ok(())
}

impl LaunchSpec {
    pub fn kind(&self) -> SessionKind {
        match self {
            Self::Debug { .. } => SessionKind::Debug,
            Self::Attach { .. } => SessionKind::Attach,
            Self::Exec { .. } => SessionKind::Exec,
            Self::Test { .. } => SessionKind::Test,
            Self::Core { .. } => SessionKind::Core,
            Self::Dap { .. } => SessionKind::Dap,
            Self::Replay { .. } => SessionKind::Replay,
            Self::Trace { .. } => SessionKind::Trace,
        }
    }

    /// Reject malformed input before any port or process is touched
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Attach { pid } if *pid == 0 => {
                Err(Error::invalid_argument("process ID is required"))
            }
            Self::Exec { binary, .. } => require("binary", binary),
            Self::Core {
                executable,
                core_path,
            } => {
                require("executable", executable)?;
                require("core path", core_path)
            }
            Self::Replay { trace_path, .. } => require("trace path", trace_path),
            Self::Trace { regexp, .. } => require("regexp", regexp),
            Self::Dap {
                client_addr: Some(addr),
            } => require("client address", addr),
            _ => Ok(()),
        }
    }

    /// What the session is about, as shown to callers
    pub fn target(&self) -> String {
        match self {
            Self::Debug { package, .. } | Self::Test { package, .. } => {
                package_or_default(package)
            }
            Self::Trace { package, .. } => package_or_default(package),
            Self::Attach { pid } => pid.to_string(),
            Self::Exec { binary, .. } => binary.clone(),
            Self::Core { executable, .. } => executable.clone(),
            Self::Dap { .. } => String::new(),
            Self::Replay { trace_path, .. } => trace_path.clone(),
        }
    }

    /// Arguments that follow the target on the command line
    fn trailing_args(&self) -> Vec<String> {
        match self {
            Self::Debug { build_flags, .. } => match build_flags {
                Some(flags) if !flags.is_empty() => {
                    vec!["--build-flags".to_string(), flags.clone()]
                }
                _ => Vec::new(),
            },
            Self::Attach { .. } => Vec::new(),
            Self::Exec { args, .. } => {
                if args.is_empty() {
                    Vec::new()
                } else {
                    std::iter::once("--".to_string())
                        .chain(args.iter().cloned())
                        .collect()
                }
            }
            Self::Test { test_flags, .. } => std::iter::once("--".to_string())
                .chain(test_flags.iter().cloned())
                .collect(),
            Self::Core { core_path, .. } => vec![core_path.clone()],
            Self::Dap { client_addr } => match client_addr {
                Some(addr) => vec!["--client-addr".to_string(), addr.clone()],
                None => Vec::new(),
            },
            Self::Replay { on_process, .. } => match on_process {
                Some(pid) => vec!["--onprocess".to_string(), pid.to_string()],
                None => Vec::new(),
            },
            Self::Trace {
                regexp,
                ebpf,
                stack,
                pid,
                ..
            } => {
                let mut args = vec![regexp.clone()];
                if *ebpf {
                    args.push("--ebpf".to_string());
                }
                if let Some(depth) = stack {
                    args.push("--stack".to_string());
                    args.push(depth.to_string());
                }
                if let Some(pid) = pid {
                    args.push("--pid".to_string());
                    args.push(pid.to_string());
                }
                args
            }
        }
    }

    /// Whether the backend will accept connections on its listen address
    ///
    /// `dap --client-addr` dials out to the client instead of listening.
    pub fn listens(&self) -> bool {
        !matches!(
            self,
            Self::Dap {
                client_addr: Some(_)
            }
        )
    }

    /// Full argument vector for the backend executable
    pub fn to_args(&self, host: &str, port: u16, options: &SpawnOptions) -> Vec<String> {
        let mut args = vec![
            self.kind().subcommand().to_string(),
            "--headless".to_string(),
            format!("--listen={}:{}", host, port),
            "--accept-multiclient".to_string(),
            "--api-version=2".to_string(),
        ];
        args.extend(options.to_args());

        let target = self.target();
        if !target.is_empty() {
            args.push(target);
        }
        args.extend(self.trailing_args());
        args
    }
}

/// Delve's low-level backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebuggerBackend {
    #[default]
    Default,
    Native,
    Lldb,
    Rr,
}

impl DebuggerBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Native => "native",
            Self::Lldb => "lldb",
            Self::Rr => "rr",
        }
    }
}

impl FromStr for DebuggerBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(Self::Default),
            "native" => Ok(Self::Native),
            "lldb" => Ok(Self::Lldb),
            "rr" => Ok(Self::Rr),
            other => Err(Error::invalid_argument(format!(
                "invalid backend '{}', expected one of: default, native, lldb, rr",
                other
            ))),
        }
    }
}

/// Components Delve can emit logs for
pub const LOG_COMPONENTS: &[&str] = &[
    "debugger",
    "gdbwire",
    "lldbout",
    "debuglineerr",
    "rpc",
    "dap",
    "fncall",
    "minidump",
    "stack",
];

/// Backend log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    pub components: Vec<String>,
    pub destination: Option<String>,
}

impl LogSettings {
    pub fn new(components: Vec<String>, destination: Option<String>) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::invalid_argument(
                "at least one log component is required",
            ));
        }
        if let Some(bad) = components
            .iter()
            .find(|c| !LOG_COMPONENTS.contains(&c.as_str()))
        {
            return Err(Error::invalid_argument(format!(
                "invalid log component '{}', expected any of: {}",
                bad,
                LOG_COMPONENTS.join(", ")
            )));
        }
        Ok(Self {
            components,
            destination: destination.filter(|d| !d.is_empty()),
        })
    }
}

/// Process-wide settings applied to sessions spawned after they are set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnOptions {
    pub backend: Option<DebuggerBackend>,
    pub log: Option<LogSettings>,
}

impl SpawnOptions {
    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(backend) = self.backend {
            args.push(format!("--backend={}", backend.as_str()));
        }
        if let Some(log) = &self.log {
            args.push("--log".to_string());
            args.push(format!("--log-output={}", log.components.join(",")));
            if let Some(dest) = &log.destination {
                args.push(format!("--log-dest={}", dest));
            }
        }
        args
    }
}
