use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::RepositoryIdentity;
use crate::scheduler::{DispatchPolicy, SchedulerConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    /// Defaults to `~/.coverage-improver/data/coverage.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(default)]
    pub fork: ForkConfig,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            workspace_root: default_workspace_root(),
            fork: ForkConfig::default(),
            scheduler: SchedulerSettings::default(),
            worker: WorkerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Database location, falling back to the per-user default.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
            .unwrap_or_else(|| PathBuf::from("coverage.db"))
    }
}

fn default_workspace_root() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".coverage-improver").join("workspaces"))
        .unwrap_or_else(|| PathBuf::from("workspaces"))
}

/// Whether work happens on a fork, and whose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
}

impl ForkConfig {
    /// Identity of `owner/name` under this fork configuration. Fork owner and
    /// organization are dropped when fork mode is off, and blank values count
    /// as absent.
    pub fn identity(&self, owner: &str, name: &str) -> RepositoryIdentity {
        if !self.enabled {
            return RepositoryIdentity::upstream(owner, name);
        }
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        RepositoryIdentity {
            owner: owner.to_string(),
            name: name.to_string(),
            fork_mode: true,
            fork_owner: present(&self.owner),
            fork_org: present(&self.org),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub dispatch: DispatchPolicy,
    #[serde(default)]
    pub stale_after_secs: Option<u64>,
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            dispatch: DispatchPolicy::default(),
            stale_after_secs: None,
        }
    }
}

impl SchedulerSettings {
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_millis(self.interval_ms),
            dispatch: self.dispatch,
            stale_after: self.stale_after_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMode {
    /// Run `command` through the shell.
    Command,
    /// Fabricate pull request URLs.
    #[default]
    DryRun,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSettings {
    #[serde(default)]
    pub mode: WorkerMode,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl WorkerSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
