//! Async task runner for deployment execution
//!
//! Decouples triggering from execution: `submit` enqueues a deployment id
//! and returns immediately; a fixed pool of worker slots runs one
//! deployment each. Deliveries are late-acknowledged: a delivery is only
//! acked once the orchestrator call fully returns, so a crash mid-run puts
//! the id back on the queue for a full, non-idempotent re-run.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::EngineError;
use crate::hub::LogHub;
use crate::models::deployment::DeploymentStatus;
use crate::store::{DeploymentPatch, DeploymentStore};

/// Orchestrator seam the runner drives; implemented by `DeploymentPipeline`
#[async_trait]
pub trait ExecuteDeployment: Send + Sync {
    async fn execute(&self, deployment_id: Uuid) -> Result<bool, EngineError>;
}

/// Task runner options
#[derive(Debug, Clone)]
pub struct Options {
    /// Number of worker slots; one in-flight deployment per slot
    pub worker_count: usize,

    /// Bounded queue capacity
    pub queue_capacity: usize,

    /// Maximum deliveries per task, counting crash redeliveries
    pub max_deliveries: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            worker_count: 2,
            queue_capacity: 64,
            max_deliveries: 2,
        }
    }
}

/// One queued unit of work
#[derive(Debug, Clone)]
struct Delivery {
    deployment_id: Uuid,
    attempt: u32,
}

/// Bounded work queue with a fixed worker pool
pub struct TaskRunner {
    tx: mpsc::Sender<Delivery>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRunner {
    /// Start the worker pool; workers exit on the shutdown broadcast
    pub fn start(
        options: Options,
        executor: Arc<dyn ExecuteDeployment>,
        store: Arc<dyn DeploymentStore>,
        hub: Arc<LogHub>,
        shutdown_tx: &broadcast::Sender<()>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(options.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..options.worker_count)
            .map(|slot| {
                tokio::spawn(worker_loop(
                    slot,
                    options.clone(),
                    executor.clone(),
                    store.clone(),
                    hub.clone(),
                    rx.clone(),
                    tx.clone(),
                    shutdown_tx.subscribe(),
                ))
            })
            .collect();

        Self {
            tx,
            handles: std::sync::Mutex::new(handles),
        }
    }

    /// Enqueue a deployment and return immediately
    pub fn submit(&self, deployment_id: Uuid) -> Result<(), EngineError> {
        self.tx
            .try_send(Delivery {
                deployment_id,
                attempt: 1,
            })
            .map_err(|e| EngineError::QueueError(format!("failed to enqueue deployment: {}", e)))
    }

    /// Await worker completion, bounded by `max_delay`
    ///
    /// Callers send the shutdown broadcast first; in-flight runs finish
    /// before their worker observes it.
    pub async fn shutdown(&self, max_delay: Duration) -> Result<(), EngineError> {
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self
                .handles
                .lock()
                .map_err(|_| EngineError::ShutdownError("runner handles poisoned".to_string()))?;
            guard.drain(..).collect()
        };

        match tokio::time::timeout(max_delay, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    result.map_err(|e| EngineError::ShutdownError(e.to_string()))?;
                }
                Ok(())
            }
            Err(_) => Err(EngineError::ShutdownError(format!(
                "workers did not stop within {:?}",
                max_delay
            ))),
        }
    }
}

async fn worker_loop(
    slot: usize,
    options: Options,
    executor: Arc<dyn ExecuteDeployment>,
    store: Arc<dyn DeploymentStore>,
    hub: Arc<LogHub>,
    rx: Arc<Mutex<mpsc::Receiver<Delivery>>>,
    tx: mpsc::Sender<Delivery>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("Deploy worker {} starting...", slot);

    loop {
        // Hold the receiver lock only while waiting; one delivery in
        // flight per slot
        let delivery = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Deploy worker {} shutting down...", slot);
                    return;
                }
                delivery = rx.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => return,
                },
            }
        };

        handle_delivery(slot, &options, &executor, &store, &hub, &tx, delivery).await;
    }
}

/// Run one delivery to completion; returning from here is the ack
async fn handle_delivery(
    slot: usize,
    options: &Options,
    executor: &Arc<dyn ExecuteDeployment>,
    store: &Arc<dyn DeploymentStore>,
    hub: &Arc<LogHub>,
    tx: &mpsc::Sender<Delivery>,
    delivery: Delivery,
) {
    let id = delivery.deployment_id;
    info!(
        "Worker {} executing deployment {} (delivery {})",
        slot, id, delivery.attempt
    );

    let run = AssertUnwindSafe(executor.execute(id)).catch_unwind().await;

    match run {
        Ok(Ok(true)) => {
            info!("Worker {} completed deployment {}", slot, id);
        }
        Ok(Ok(false)) => {
            info!("Worker {} finished deployment {} with failed status", slot, id);
        }
        Ok(Err(e)) => {
            error!("Deployment {} raised: {}", id, e);
            // Force the record into failed before surfacing to bookkeeping;
            // the run may have opened a live channel it never closed
            force_fail(store, id, e.to_string()).await;
            hub.close(id).await;
        }
        Err(_) => {
            error!("Worker {} crashed while executing deployment {}", slot, id);
            if delivery.attempt < options.max_deliveries {
                // Never acked; redeliver for a full re-run. This worker is
                // also the queue's consumer, so a blocking send against a
                // full queue would wedge the slot forever; a full or closed
                // queue fails the deployment instead.
                let redelivery = Delivery {
                    deployment_id: id,
                    attempt: delivery.attempt + 1,
                };
                if tx.try_send(redelivery).is_err() {
                    force_fail(store, id, "deployment worker crashed".to_string()).await;
                    hub.close(id).await;
                }
            } else {
                force_fail(store, id, "deployment worker crashed".to_string()).await;
                hub.close(id).await;
            }
        }
    }
}

async fn force_fail(store: &Arc<dyn DeploymentStore>, id: Uuid, message: String) {
    let deployment = match store.get_deployment(id).await {
        Ok(deployment) => deployment,
        Err(e) => {
            error!("Unable to load deployment {} to mark it failed: {}", id, e);
            return;
        }
    };
    if deployment.is_terminal() {
        return;
    }

    // Keep the transition chain monotonic even when the run never started
    if deployment.status == DeploymentStatus::Pending {
        let running = DeploymentPatch::status(DeploymentStatus::Running);
        if let Err(e) = store.apply(id, running).await {
            error!("Unable to mark deployment {} running: {}", id, e);
            return;
        }
    }

    let patch = DeploymentPatch::terminal(
        DeploymentStatus::Failed,
        deployment.start_time,
        Some(message),
    );
    if let Err(e) = store.apply(id, patch).await {
        error!("Unable to mark deployment {} failed: {}", id, e);
    }
}
