//! Configuration resolution for relaygate.
//!
//! Resolution order:
//! 1. Built-in defaults
//! 2. Site config file (`$XDG_CONFIG_HOME/relaygate/settings.json` or an
//!    explicit path). A missing file is not an error.
//! 3. Environment variables
//!
//! The result is validated once at startup and treated as immutable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Name of the per-user site directory under `$HOME`.
const SITE_DIR: &str = ".relaygate";

/// Complete site configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SiteConfig {
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub paths: PathConfig,
}

/// Relay task queue limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Maximum age of a queued task before it is treated as expired.
    pub task_ttl_secs: i64,
    /// Maximum number of pending tasks a single relay may hold.
    pub max_tasks_per_relay: usize,
    /// How long DONE/FAILED tasks stay retrievable after their transition.
    /// `None` reuses `task_ttl_secs`.
    pub completed_task_retention_secs: Option<i64>,
    /// Interval of the background sweep that reclaims expired tasks.
    pub sweep_interval_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            task_ttl_secs: 120,
            max_tasks_per_relay: 10,
            completed_task_retention_secs: None,
            sweep_interval_secs: 60,
        }
    }
}

impl TaskConfig {
    /// Effective retention for terminal tasks.
    pub fn completed_retention_secs(&self) -> i64 {
        self.completed_task_retention_secs
            .unwrap_or(self.task_ttl_secs)
    }
}

/// Delivery of relay results into the monitoring core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Unix socket of the monitoring core.
    pub monitoring_socket_path: Option<PathBuf>,
    /// Bound on connect + send + shutdown.
    pub timeout_secs: u64,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            monitoring_socket_path: None,
            timeout_secs: 5,
        }
    }
}

impl ForwardingConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Config-serial watching for relay config sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// File holding the site's current configuration serial.
    pub config_serial_path: Option<PathBuf>,
    pub poll_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            config_serial_path: None,
            poll_interval_secs: 10,
        }
    }
}

/// Filesystem locations for durable state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PathConfig {
    pub database_path: Option<PathBuf>,
    /// Directory holding `ca.pem` and `ca-key.pem` of the relay CA.
    pub ca_dir: Option<PathBuf>,
}

impl SiteConfig {
    /// Load configuration, falling back to defaults when the file is absent.
    ///
    /// `path` overrides the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path.map(Path::to_path_buf).or_else(global_config_path) {
            Some(path) if path.exists() => load_config_file(&path)?,
            Some(path) => {
                tracing::info!(path = %path.display(), "No site config file, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Reject values the task queue and forwarder cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.tasks.task_ttl_secs <= 0 {
            return Err(Error::Config(format!(
                "task_ttl_secs must be positive, got {}",
                self.tasks.task_ttl_secs
            )));
        }
        if self.tasks.max_tasks_per_relay < 1 {
            return Err(Error::Config(
                "max_tasks_per_relay must be at least 1".to_string(),
            ));
        }
        if let Some(retention) = self.tasks.completed_task_retention_secs {
            if retention < 0 {
                return Err(Error::Config(format!(
                    "completed_task_retention_secs must not be negative, got {retention}"
                )));
            }
        }
        if self.forwarding.timeout_secs == 0 {
            return Err(Error::Config(
                "forwarding.timeout_secs must be positive".to_string(),
            ));
        }
        if self.sync.poll_interval_secs == 0 || self.tasks.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "poll and sweep intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the SQLite relay registry.
    pub fn database_path(&self) -> Result<PathBuf> {
        resolve(self.paths.database_path.as_ref(), "relaygate.db")
    }

    /// Directory of the relay CA material.
    pub fn ca_dir(&self) -> Result<PathBuf> {
        resolve(self.paths.ca_dir.as_ref(), "ca")
    }

    /// Unix socket the monitoring core listens on.
    pub fn monitoring_socket_path(&self) -> Result<PathBuf> {
        resolve(
            self.forwarding.monitoring_socket_path.as_ref(),
            "run/monitoring-data.sock",
        )
    }

    /// File holding the current configuration serial.
    pub fn config_serial_path(&self) -> Result<PathBuf> {
        resolve(self.sync.config_serial_path.as_ref(), "config-serial")
    }
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("relaygate").join("settings.json"))
}

/// Per-user site directory (`~/.relaygate`).
pub fn site_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(SITE_DIR))
}

fn resolve(explicit: Option<&PathBuf>, default_name: &str) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.clone());
    }
    site_dir()
        .map(|dir| dir.join(default_name))
        .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))
}

fn load_config_file(path: &Path) -> Result<SiteConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn apply_env_overrides(config: &mut SiteConfig) {
    if let Ok(val) = std::env::var("RELAYGATE_TASK_TTL") {
        if let Some(n) = parse_override("RELAYGATE_TASK_TTL", &val) {
            config.tasks.task_ttl_secs = n;
        }
    }
    if let Ok(val) = std::env::var("RELAYGATE_MAX_TASKS_PER_RELAY") {
        if let Some(n) = parse_override("RELAYGATE_MAX_TASKS_PER_RELAY", &val) {
            config.tasks.max_tasks_per_relay = n;
        }
    }
    if let Ok(val) = std::env::var("RELAYGATE_MONITORING_SOCKET") {
        config.forwarding.monitoring_socket_path = Some(PathBuf::from(val));
    }
}

/// Parse a numeric override, warning and keeping the configured value when
/// it does not parse.
fn parse_override<T: FromStr>(var: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}
