//! Deployment orchestrator
//!
//! Sequences the build and transfer phases for one deployment, mutating the
//! persisted record at each phase boundary and routing every log line
//! through the sink to the hub and the store. Exactly one concurrent
//! execution per deployment is assumed; the task runner enforces it.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::deploy::build::{BuildExecutor, BuildRequest};
use crate::deploy::sink::{self, LogSink};
use crate::deploy::transfer::{ArtifactTransfer, TransferRequest};
use crate::deploy::workspace::Workspace;
use crate::errors::EngineError;
use crate::hub::LogHub;
use crate::models::deployment::{Deployment, DeploymentStatus};
use crate::models::project::Project;
use crate::store::{DeploymentPatch, DeploymentStore};
use crate::utils::short_commit;
use crate::workers::runner::ExecuteDeployment;

/// Pipeline options
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory per-run workspaces are created under
    pub workspace_root: PathBuf,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("slipway"),
        }
    }
}

/// Orchestrates one deployment run end to end
pub struct DeploymentPipeline {
    store: Arc<dyn DeploymentStore>,
    hub: Arc<LogHub>,
    builder: Arc<dyn BuildExecutor>,
    transfer: Arc<dyn ArtifactTransfer>,
    options: PipelineOptions,
}

impl DeploymentPipeline {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        hub: Arc<LogHub>,
        builder: Arc<dyn BuildExecutor>,
        transfer: Arc<dyn ArtifactTransfer>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            hub,
            builder,
            transfer,
            options,
        }
    }

    /// Execute a deployment to completion
    ///
    /// `Ok(true)`/`Ok(false)` is a completed run; the record is already
    /// terminal. `Err` is an unexpected engine failure, which the task
    /// runner converts into a forced failed status.
    pub async fn execute(&self, deployment_id: Uuid) -> Result<bool, EngineError> {
        let deployment = self.store.get_deployment(deployment_id).await?;
        let project = self.store.get_project(deployment.project_id).await?;

        info!(
            "Executing deployment {} for project {} ({})",
            deployment_id,
            project.name,
            short_commit(&deployment.commit_hash)
        );

        self.hub.open(deployment_id).await;
        self.store
            .apply(deployment_id, DeploymentPatch::status(DeploymentStatus::Running))
            .await?;
        self.hub
            .set_status(deployment_id, DeploymentStatus::Running)
            .await;

        let (sink, rx) = LogSink::channel();
        let drain = sink::spawn_drain(deployment_id, rx, self.store.clone(), self.hub.clone());

        sink.info(format!("Starting deployment of project: {}", project.name));
        sink.info(format!(
            "Commit: {} (branch {})",
            short_commit(&deployment.commit_hash),
            deployment.branch
        ));
        sink.info(format!("Target host: {}", project.target_host));

        let outcome = self.run_phases(&deployment, &project, &sink).await;

        let (status, error_message) = match &outcome {
            Ok(()) => {
                let elapsed = (Utc::now() - deployment.start_time).num_seconds();
                sink.success(format!(
                    "Deployment completed successfully in {} seconds",
                    elapsed
                ));
                (DeploymentStatus::Success, None)
            }
            Err(e) => {
                sink.error(format!("Deployment failed: {}", e));
                (DeploymentStatus::Failed, Some(e.to_string()))
            }
        };

        // Drain every line into the store and hub before the terminal write,
        // so persisted logs are complete when the status flips
        drop(sink);
        if drain.await.is_err() {
            error!("Log drain task for deployment {} aborted", deployment_id);
        }

        let terminal = self
            .store
            .apply(
                deployment_id,
                DeploymentPatch::terminal(status, deployment.start_time, error_message),
            )
            .await;

        self.hub.set_status(deployment_id, status).await;
        self.hub.close(deployment_id).await;
        terminal?;

        match status {
            DeploymentStatus::Success => {
                info!("Deployment {} succeeded", deployment_id);
                Ok(true)
            }
            _ => {
                info!("Deployment {} failed", deployment_id);
                Ok(false)
            }
        }
    }

    /// Run both phases inside a scoped workspace
    ///
    /// The workspace is removed on every path out of here, success or
    /// failure; `Workspace` also carries a drop fallback.
    async fn run_phases(
        &self,
        deployment: &Deployment,
        project: &Project,
        sink: &LogSink,
    ) -> Result<(), EngineError> {
        let workspace = Workspace::create(&self.options.workspace_root, deployment.id).await?;
        let result = self
            .run_phases_in(deployment, project, &workspace, sink)
            .await;
        workspace.remove().await;
        result
    }

    async fn run_phases_in(
        &self,
        deployment: &Deployment,
        project: &Project,
        workspace: &Workspace,
        sink: &LogSink,
    ) -> Result<(), EngineError> {
        // Build phase
        sink.info("=== Build phase ===");
        let build_request = BuildRequest {
            repo_url: project.repo_url.clone(),
            commit_hash: deployment.commit_hash.clone(),
            language: project.language.clone(),
            build_command: project.build_command.clone(),
            repo_dir: workspace.repo_dir(),
        };
        let report = self.builder.build(&build_request, sink).await?;
        self.store
            .apply(
                deployment.id,
                DeploymentPatch {
                    build_time_secs: Some(report.elapsed_secs),
                    ..Default::default()
                },
            )
            .await?;

        // Transfer phase, reusing the build output from the workspace
        sink.info("=== Transfer phase ===");
        let transfer_request = TransferRequest {
            artifact_dir: workspace.repo_dir(),
            archive_path: workspace.archive_path(),
            host: project.target_host.clone(),
            port: project.target_port,
            username: project.target_username.clone(),
            credential: project.credential()?,
            deploy_path: project.deploy_path.clone(),
            restart_command: project.restart_command.clone(),
        };
        let report = self.transfer.transfer(&transfer_request, sink).await?;
        self.store
            .apply(
                deployment.id,
                DeploymentPatch {
                    deploy_time_secs: Some(report.elapsed_secs),
                    ..Default::default()
                },
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ExecuteDeployment for DeploymentPipeline {
    async fn execute(&self, deployment_id: Uuid) -> Result<bool, EngineError> {
        DeploymentPipeline::execute(self, deployment_id).await
    }
}
