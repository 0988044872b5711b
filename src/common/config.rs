//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Backend executable settings
    #[serde(default)]
    pub backend: BackendSettings,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Where to find the Delve executable and how to reach it
#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    /// Path to the `dlv` executable, or a bare name looked up in PATH
    #[serde(default = "default_backend_path")]
    pub path: PathBuf,

    /// Host that backends listen on and that requests are sent to
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            path: default_backend_path(),
            host: default_host(),
        }
    }
}

fn default_backend_path() -> PathBuf {
    PathBuf::from("dlv")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// How long a freshly spawned backend has to accept connections
    #[serde(default = "default_startup")]
    pub startup_secs: u64,

    /// Delay between readiness probes
    #[serde(default = "default_probe_interval")]
    pub probe_interval_ms: u64,

    /// Timeout for a single backend request
    #[serde(default = "default_request")]
    pub request_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup_secs: default_startup(),
            probe_interval_ms: default_probe_interval(),
            request_secs: default_request(),
        }
    }
}

impl Timeouts {
    pub fn startup(&self) -> Duration {
        Duration::from_secs(self.startup_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

fn default_startup() -> u64 {
    10
}
fn default_probe_interval() -> u64 {
    50
}
fn default_request() -> u64 {
    30
}

/// Daemon configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    /// Auto-exit after this many minutes with no live session
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_minutes: u64,

    /// How often to look for backends that exited on their own
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: default_idle_timeout(),
            reconcile_interval_secs: default_reconcile_interval(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    30
}
fn default_reconcile_interval() -> u64 {
    1
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every backend unusable
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("timeouts.startup_secs", self.timeouts.startup_secs),
            ("timeouts.probe_interval_ms", self.timeouts.probe_interval_ms),
            ("timeouts.request_secs", self.timeouts.request_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(super::Error::Config(format!("{} must be greater than 0", name)));
        }
        Ok(())
    }

    /// Resolve the backend executable
    ///
    /// Explicit paths are used as-is; bare names are searched in PATH.
    pub fn backend_program(&self) -> Result<PathBuf> {
        let path = &self.backend.path;
        if path.components().count() > 1 || path.is_absolute() {
            return Ok(path.clone());
        }
        which::which(path).map_err(|e| {
            super::Error::Config(format!(
                "backend executable '{}' not found in PATH: {}",
                path.display(),
                e
            ))
        })
    }
}
