//! In-memory deployment store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::models::deployment::Deployment;
use crate::models::project::Project;
use crate::store::{DeploymentPatch, DeploymentStore};

/// In-memory store backing the engine
///
/// Projects are seeded at startup and treated as read-only snapshots;
/// deployments are mutated through patches only.
#[derive(Default)]
pub struct MemoryStore {
    deployments: RwLock<HashMap<Uuid, Deployment>>,
    projects: RwLock<HashMap<Uuid, Project>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_project(&self, project: Project) {
        self.projects.write().await.insert(project.id, project);
    }

    /// Ids of every stored deployment, in no particular order
    pub async fn deployment_ids(&self) -> Vec<Uuid> {
        self.deployments.read().await.keys().copied().collect()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn insert_deployment(&self, deployment: Deployment) -> Result<(), EngineError> {
        self.deployments
            .write()
            .await
            .insert(deployment.id, deployment);
        Ok(())
    }

    async fn get_deployment(&self, id: Uuid) -> Result<Deployment, EngineError> {
        self.deployments
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("deployment {}", id)))
    }

    async fn get_project(&self, id: Uuid) -> Result<Project, EngineError> {
        self.projects
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("project {}", id)))
    }

    async fn apply(&self, id: Uuid, patch: DeploymentPatch) -> Result<(), EngineError> {
        let mut deployments = self.deployments.write().await;
        let deployment = deployments
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("deployment {}", id)))?;

        if let Some(status) = patch.status {
            deployment
                .transition(status)
                .map_err(EngineError::StoreError)?;
        }
        if let Some(end_time) = patch.end_time {
            deployment.end_time = Some(end_time);
        }
        if let Some(duration) = patch.duration_secs {
            deployment.duration_secs = Some(duration);
        }
        if let Some(build_time) = patch.build_time_secs {
            deployment.build_time_secs = Some(build_time);
        }
        if let Some(deploy_time) = patch.deploy_time_secs {
            deployment.deploy_time_secs = Some(deploy_time);
        }
        if let Some(error_message) = patch.error_message {
            deployment.error_message = Some(error_message);
        }

        Ok(())
    }

    async fn append_log(&self, id: Uuid, line: &str) -> Result<(), EngineError> {
        let mut deployments = self.deployments.write().await;
        let deployment = deployments
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("deployment {}", id)))?;
        deployment.append_log(line);
        Ok(())
    }
}
