//! Deployment trigger integration tests

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use slipway::errors::EngineError;
use slipway::hub::{HubMessage, HubOptions, LogHub};
use slipway::models::deployment::{DeploymentStatus, TriggerSource};
use slipway::models::project::Project;
use slipway::store::{DeploymentStore, MemoryStore};
use slipway::trigger::{DeployTrigger, TriggerRequest};
use slipway::workers::runner::{ExecuteDeployment, Options, TaskRunner};
use tokio::sync::broadcast;
use uuid::Uuid;

struct IdleExecutor;

#[async_trait]
impl ExecuteDeployment for IdleExecutor {
    async fn execute(&self, _deployment_id: Uuid) -> Result<bool, EngineError> {
        // Park forever; these tests only exercise the trigger seam
        std::future::pending::<()>().await;
        Ok(true)
    }
}

fn test_project() -> Project {
    Project {
        id: Uuid::new_v4(),
        name: "api".to_string(),
        repo_url: "https://example.com/api.git".to_string(),
        language: "python".to_string(),
        build_command: None,
        deploy_path: "/srv/api".to_string(),
        restart_command: None,
        target_host: "10.0.0.5".to_string(),
        target_port: 22,
        target_username: "deploy".to_string(),
        ssh_key_path: Some(PathBuf::from("/etc/keys/deploy")),
        ssh_password: None,
    }
}

fn request_for(project: &Project) -> TriggerRequest {
    TriggerRequest {
        project_id: project.id,
        commit_hash: "abc123de4567".to_string(),
        commit_message: Some("fix the thing".to_string()),
        author: Some("dev".to_string()),
        branch: "main".to_string(),
        source: TriggerSource::Manual,
        payload: None,
    }
}

fn create_trigger(
    worker_count: usize,
) -> (
    Arc<MemoryStore>,
    Arc<LogHub>,
    DeployTrigger,
    broadcast::Sender<()>,
) {
    let store = Arc::new(MemoryStore::new());
    let store_dyn: Arc<dyn DeploymentStore> = store.clone();
    let hub = Arc::new(LogHub::new(store_dyn.clone(), HubOptions::default()));
    let (shutdown_tx, _) = broadcast::channel(1);
    let options = Options {
        worker_count,
        ..Default::default()
    };
    let runner = Arc::new(TaskRunner::start(
        options,
        Arc::new(IdleExecutor),
        store_dyn.clone(),
        hub.clone(),
        &shutdown_tx,
    ));
    let trigger = DeployTrigger::new(store_dyn, hub.clone(), runner);
    (store, hub, trigger, shutdown_tx)
}

#[tokio::test]
async fn test_trigger_creates_pending_record_and_opens_channel() {
    let (store, hub, trigger, _shutdown_tx) = create_trigger(1);
    let project = test_project();
    store.insert_project(project.clone()).await;

    let id = trigger.trigger(request_for(&project)).await.unwrap();

    let deployment = store.get_deployment(id).await.unwrap();
    assert_eq!(deployment.project_id, project.id);
    assert_eq!(deployment.status, DeploymentStatus::Pending);
    assert_eq!(deployment.commit_hash, "abc123de4567");

    // The channel is live before any worker log line
    let mut stream = hub.subscribe(id).await.unwrap();
    assert!(matches!(stream.next().await, Some(HubMessage::Welcome { .. })));
    match stream.next().await {
        Some(HubMessage::History { status, .. }) => {
            assert_eq!(status, DeploymentStatus::Pending)
        }
        other => panic!("expected history, got {:?}", other),
    }
}

#[tokio::test]
async fn test_trigger_unknown_project_fails_without_record() {
    let (store, _hub, trigger, _shutdown_tx) = create_trigger(1);
    let project = test_project();

    let result = trigger.trigger(request_for(&project)).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
    assert!(store.deployment_ids().await.is_empty());
}

#[tokio::test]
async fn test_failed_submit_closes_live_channel() {
    // Zero workers drops the queue's receiving end, so submission fails
    let (store, hub, trigger, _shutdown_tx) = create_trigger(0);
    let project = test_project();
    store.insert_project(project.clone()).await;

    let result = trigger.trigger(request_for(&project)).await;
    assert!(matches!(result, Err(EngineError::QueueError(_))));

    // The record exists, but no live channel was left behind: subscribing
    // replays the persisted record and ends instead of waiting forever
    let ids = store.deployment_ids().await;
    assert_eq!(ids.len(), 1);
    let mut stream = hub.subscribe(ids[0]).await.unwrap();
    assert!(matches!(stream.next().await, Some(HubMessage::Welcome { .. })));
    assert!(matches!(stream.next().await, Some(HubMessage::History { .. })));
    assert!(stream.next().await.is_none());
}
