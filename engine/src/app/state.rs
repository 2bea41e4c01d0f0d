//! Application state management

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use crate::app::options::AppOptions;
use crate::deploy::build::ContainerBuildExecutor;
use crate::deploy::pipeline::DeploymentPipeline;
use crate::deploy::transfer::SshTransfer;
use crate::errors::EngineError;
use crate::hub::LogHub;
use crate::store::{DeploymentStore, MemoryStore};
use crate::trigger::DeployTrigger;
use crate::workers::runner::TaskRunner;

/// Main application state
pub struct AppState {
    /// Deployment and project store
    pub store: Arc<MemoryStore>,

    /// Log broadcast hub
    pub hub: Arc<LogHub>,

    /// Deployment orchestrator
    pub pipeline: Arc<DeploymentPipeline>,

    /// Task runner worker pool
    pub runner: Arc<TaskRunner>,

    /// Trigger seam
    pub trigger: DeployTrigger,

    shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Wire the engine together and start the worker pool
    pub fn init(options: &AppOptions) -> Self {
        info!("Initializing application state...");

        let (shutdown_tx, _) = broadcast::channel(1);

        let store = Arc::new(MemoryStore::new());
        let store_dyn: Arc<dyn DeploymentStore> = store.clone();

        let hub = Arc::new(LogHub::new(store_dyn.clone(), options.hub.clone()));

        let builder = Arc::new(ContainerBuildExecutor::new(options.build.clone()));
        let transfer = Arc::new(SshTransfer::new(options.transfer.clone()));

        let pipeline = Arc::new(DeploymentPipeline::new(
            store_dyn.clone(),
            hub.clone(),
            builder,
            transfer,
            options.pipeline_options(),
        ));

        let runner = Arc::new(TaskRunner::start(
            options.runner.clone(),
            pipeline.clone(),
            store_dyn.clone(),
            hub.clone(),
            &shutdown_tx,
        ));

        let trigger = DeployTrigger::new(store_dyn, hub.clone(), runner.clone());

        Self {
            store,
            hub,
            pipeline,
            runner,
            trigger,
            shutdown_tx,
        }
    }

    /// Signal shutdown and await the worker pool
    pub async fn shutdown(&self, max_delay: Duration) -> Result<(), EngineError> {
        info!("Shutting down slipway engine...");
        let _ = self.shutdown_tx.send(());
        self.runner.shutdown(max_delay).await?;
        info!("Shutdown complete");
        Ok(())
    }
}
