//! Deployment trigger seam
//!
//! The entry point the manual CLI path and the webhook collaborator call:
//! creates the pending deployment record, opens its hub channel, and hands
//! the id to the task runner. Returns as soon as the work is enqueued.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::hub::LogHub;
use crate::models::deployment::{Deployment, TriggerSource};
use crate::store::DeploymentStore;
use crate::utils::short_commit;
use crate::workers::runner::TaskRunner;

/// Inputs supplied by a triggering collaborator
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub project_id: Uuid,
    pub commit_hash: String,
    pub commit_message: Option<String>,
    pub author: Option<String>,
    pub branch: String,
    pub source: TriggerSource,
    pub payload: Option<serde_json::Value>,
}

/// Creates deployment records and submits them for execution
pub struct DeployTrigger {
    store: Arc<dyn DeploymentStore>,
    hub: Arc<LogHub>,
    runner: Arc<TaskRunner>,
}

impl DeployTrigger {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        hub: Arc<LogHub>,
        runner: Arc<TaskRunner>,
    ) -> Self {
        Self { store, hub, runner }
    }

    /// Create and enqueue a deployment, returning its id immediately
    pub async fn trigger(&self, request: TriggerRequest) -> Result<Uuid, EngineError> {
        // The project must exist before a record is created
        let project = self.store.get_project(request.project_id).await?;

        let mut deployment = Deployment::new(project.id, request.commit_hash, request.branch);
        deployment.commit_message = request.commit_message;
        deployment.author = request.author;
        deployment.triggered_by = request.source;
        deployment.webhook_payload = request.payload;

        let id = deployment.id;
        let commit = deployment.commit_hash.clone();
        self.store.insert_deployment(deployment).await?;

        // Open the hub channel now so observers can join before the first
        // worker log line
        self.hub.open(id).await;
        if let Err(e) = self.runner.submit(id) {
            // Nothing will ever publish or close this channel
            self.hub.close(id).await;
            return Err(e);
        }

        info!(
            "Deployment {} queued for project {} at {}",
            id,
            project.name,
            short_commit(&commit)
        );
        Ok(id)
    }
}
