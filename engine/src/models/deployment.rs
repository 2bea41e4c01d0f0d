//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a deployment
///
/// Transitions are monotonic: pending -> running -> {success, failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl DeploymentStatus {
    /// Whether this status ends the deployment lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How a deployment was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Manual,
    Webhook,
}

impl Default for TriggerSource {
    fn default() -> Self {
        TriggerSource::Manual
    }
}

/// One execution attempt of building and activating a commit on a target host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment ID
    pub id: Uuid,

    /// Project this deployment belongs to
    pub project_id: Uuid,

    /// Commit hash to build and deploy
    pub commit_hash: String,

    /// Commit message, if known
    pub commit_message: Option<String>,

    /// Commit author, if known
    pub author: Option<String>,

    /// Branch name
    pub branch: String,

    /// Trigger source
    pub triggered_by: TriggerSource,

    /// Opaque webhook payload, if webhook-triggered
    pub webhook_payload: Option<serde_json::Value>,

    /// Current status
    pub status: DeploymentStatus,

    /// When the deployment was submitted
    pub start_time: DateTime<Utc>,

    /// When the deployment reached a terminal status
    pub end_time: Option<DateTime<Utc>>,

    /// Total elapsed time in whole seconds, set at terminal status
    pub duration_secs: Option<i64>,

    /// Build phase elapsed time in seconds
    pub build_time_secs: Option<i64>,

    /// Transfer phase elapsed time in seconds
    pub deploy_time_secs: Option<i64>,

    /// Accumulated log text, append-only
    pub logs: String,

    /// Human-readable failure message
    pub error_message: Option<String>,
}

impl Deployment {
    /// Create a new pending deployment starting now
    pub fn new(project_id: Uuid, commit_hash: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            commit_hash: commit_hash.into(),
            commit_message: None,
            author: None,
            branch: branch.into(),
            triggered_by: TriggerSource::Manual,
            webhook_payload: None,
            status: DeploymentStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            duration_secs: None,
            build_time_secs: None,
            deploy_time_secs: None,
            logs: String::new(),
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition to a new status, rejecting anything non-monotonic
    ///
    /// Re-asserting the current status is a no-op, so a redelivered run can
    /// pass through running again after a worker crash.
    pub fn transition(&mut self, to: DeploymentStatus) -> Result<(), String> {
        use DeploymentStatus::*;
        match (self.status, to) {
            (from, to) if from == to && !from.is_terminal() => Ok(()),
            (Pending, Running) | (Running, Success) | (Running, Failed) => {
                self.status = to;
                Ok(())
            }
            (from, to) => Err(format!("invalid status transition: {} -> {}", from, to)),
        }
    }

    /// Append a formatted log line
    pub fn append_log(&mut self, line: &str) {
        if !self.logs.is_empty() {
            self.logs.push('\n');
        }
        self.logs.push_str(line);
    }
}

/// Kind of a streamed log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Error,
}

impl LogKind {
    fn label(&self) -> &'static str {
        match self {
            LogKind::Info => "INFO",
            LogKind::Success => "SUCCESS",
            LogKind::Error => "ERROR",
        }
    }
}

/// An ephemeral log line emitted during a run
///
/// Never persisted individually; only concatenated into `Deployment::logs`
/// and pushed to live subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        LogEntry::new(LogKind::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        LogEntry::new(LogKind::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        LogEntry::new(LogKind::Error, message)
    }

    /// Render the line as stored in `Deployment::logs`
    pub fn format_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.kind.label(),
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_happy_path() {
        let mut d = Deployment::new(Uuid::new_v4(), "abc123", "main");
        assert_eq!(d.status, DeploymentStatus::Pending);

        d.transition(DeploymentStatus::Running).unwrap();
        d.transition(DeploymentStatus::Success).unwrap();
        assert!(d.is_terminal());
    }

    #[test]
    fn test_transition_never_reverses() {
        let mut d = Deployment::new(Uuid::new_v4(), "abc123", "main");
        d.transition(DeploymentStatus::Running).unwrap();
        d.transition(DeploymentStatus::Failed).unwrap();

        assert!(d.transition(DeploymentStatus::Running).is_err());
        assert!(d.transition(DeploymentStatus::Pending).is_err());
        assert!(d.transition(DeploymentStatus::Success).is_err());
    }

    #[test]
    fn test_format_line() {
        let entry = LogEntry::new(LogKind::Success, "done");
        let line = entry.format_line();
        assert!(line.contains("[SUCCESS] done"));
    }
}
