//! Persistence seam for deployments and project snapshots

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::EngineError;
use crate::models::deployment::{Deployment, DeploymentStatus};
use crate::models::project::Project;

pub use memory::MemoryStore;

/// Partial update applied to a persisted deployment
///
/// The pipeline writes short independent patches at each phase boundary
/// rather than holding one long transaction across the whole run.
#[derive(Debug, Clone, Default)]
pub struct DeploymentPatch {
    pub status: Option<DeploymentStatus>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub build_time_secs: Option<i64>,
    pub deploy_time_secs: Option<i64>,
    pub error_message: Option<String>,
}

impl DeploymentPatch {
    pub fn status(status: DeploymentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Patch marking a deployment terminal with end time and whole-second duration
    pub fn terminal(
        status: DeploymentStatus,
        start_time: DateTime<Utc>,
        error_message: Option<String>,
    ) -> Self {
        let end = Utc::now();
        Self {
            status: Some(status),
            end_time: Some(end),
            duration_secs: Some((end - start_time).num_seconds()),
            error_message,
            ..Default::default()
        }
    }
}

/// Store for deployment records and read-only project snapshots
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn insert_deployment(&self, deployment: Deployment) -> Result<(), EngineError>;

    async fn get_deployment(&self, id: Uuid) -> Result<Deployment, EngineError>;

    async fn get_project(&self, id: Uuid) -> Result<Project, EngineError>;

    /// Apply a partial update; status changes are validated as monotonic
    async fn apply(&self, id: Uuid, patch: DeploymentPatch) -> Result<(), EngineError>;

    /// Append one formatted line to the deployment's accumulated log text
    async fn append_log(&self, id: Uuid, line: &str) -> Result<(), EngineError>;
}
