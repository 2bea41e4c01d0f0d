//! Settings file management

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::EngineError;
use crate::logs::LogLevel;
use crate::models::project::Project;

/// Engine settings loaded from a JSON file; never serialized, the seeded
/// projects carry credentials
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for rolling log files; omit to log to stdout only
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub json_logs: bool,

    /// Directory per-run workspaces are created under
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Worker pool configuration
    #[serde(default)]
    pub runner: RunnerSettings,

    /// Build environment configuration
    #[serde(default)]
    pub build: BuildSettings,

    /// Remote transfer configuration
    #[serde(default)]
    pub transfer: TransferSettings,

    /// Project snapshots the store is seeded with
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: None,
            json_logs: false,
            workspace_root: None,
            runner: RunnerSettings::default(),
            build: BuildSettings::default(),
            transfer: TransferSettings::default(),
            projects: Vec::new(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file
    pub async fn load(path: &Path) -> Result<Self, EngineError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            EngineError::ConfigError(format!(
                "unable to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;
        let settings = serde_json::from_slice(&bytes)?;
        Ok(settings)
    }

    /// Find a seeded project by id or name
    pub fn find_project(&self, key: &str) -> Option<&Project> {
        self.projects
            .iter()
            .find(|p| p.id.to_string() == key || p.name == key)
    }
}

/// Worker pool settings
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSettings {
    /// Number of worker slots
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum deliveries per task, counting crash redeliveries
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,
}

fn default_worker_count() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    64
}

fn default_max_deliveries() -> u32 {
    2
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            max_deliveries: default_max_deliveries(),
        }
    }
}

/// Build environment settings
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSettings {
    /// Container memory ceiling, docker syntax
    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,

    /// CPU quota as a fraction of one core
    #[serde(default = "default_cpu_quota")]
    pub cpu_quota: f64,
}

fn default_memory_limit() -> String {
    "1g".to_string()
}

fn default_cpu_quota() -> f64 {
    0.5
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            memory_limit: default_memory_limit(),
            cpu_quota: default_cpu_quota(),
        }
    }
}

/// Remote transfer settings
#[derive(Debug, Clone, Deserialize)]
pub struct TransferSettings {
    /// SSH connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Settle delay after the restart command, in seconds
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_settle_delay() -> u64 {
    2
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            settle_delay_secs: default_settle_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_from_empty_json() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.runner.worker_count, 2);
        assert_eq!(settings.build.memory_limit, "1g");
        assert_eq!(settings.transfer.connect_timeout_secs, 10);
        assert!(settings.projects.is_empty());
    }

    #[test]
    fn test_find_project_by_name() {
        let json = r#"{
            "projects": [{
                "id": "4f5c9cf4-9f44-4a9e-bd3a-111111111111",
                "name": "api",
                "repo_url": "https://example.com/api.git",
                "language": "python",
                "deploy_path": "/srv/api",
                "target_host": "10.0.0.5",
                "target_username": "deploy",
                "ssh_key_path": "/etc/keys/deploy"
            }]
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert!(settings.find_project("api").is_some());
        assert!(settings
            .find_project("4f5c9cf4-9f44-4a9e-bd3a-111111111111")
            .is_some());
        assert!(settings.find_project("web").is_none());
    }
}
