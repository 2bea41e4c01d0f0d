//! Deployment pipeline integration tests
//!
//! The build and transfer seams are stubbed; these tests exercise the
//! orchestration: status transitions, phase timings, log persistence, and
//! short-circuiting on phase failure.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use slipway::deploy::build::{BuildExecutor, BuildRequest};
use slipway::deploy::pipeline::{DeploymentPipeline, PipelineOptions};
use slipway::deploy::sink::LogSink;
use slipway::deploy::transfer::{ArtifactTransfer, TransferRequest};
use slipway::deploy::PhaseReport;
use slipway::errors::EngineError;
use slipway::hub::{HubOptions, LogHub};
use slipway::models::deployment::{Deployment, DeploymentStatus};
use slipway::models::project::Project;
use slipway::store::{DeploymentStore, MemoryStore};
use uuid::Uuid;

struct StubBuilder {
    fail: bool,
    calls: AtomicU32,
}

#[async_trait]
impl BuildExecutor for StubBuilder {
    async fn build(
        &self,
        request: &BuildRequest,
        sink: &LogSink,
    ) -> Result<PhaseReport, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EngineError::BuildError("compilation failed".to_string()));
        }
        sink.info(format!("Built {} from {}", request.language, request.repo_url));
        Ok(PhaseReport { elapsed_secs: 3 })
    }
}

struct StubTransfer {
    calls: AtomicU32,
}

#[async_trait]
impl ArtifactTransfer for StubTransfer {
    async fn transfer(
        &self,
        request: &TransferRequest,
        sink: &LogSink,
    ) -> Result<PhaseReport, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sink.info(format!("Shipped artifacts to {}", request.host));
        Ok(PhaseReport { elapsed_secs: 2 })
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    pipeline: DeploymentPipeline,
    builder: Arc<StubBuilder>,
    transfer: Arc<StubTransfer>,
}

fn create_harness(build_fails: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let store_dyn: Arc<dyn DeploymentStore> = store.clone();
    let hub = Arc::new(LogHub::new(store_dyn.clone(), HubOptions::default()));
    let builder = Arc::new(StubBuilder {
        fail: build_fails,
        calls: AtomicU32::new(0),
    });
    let transfer = Arc::new(StubTransfer {
        calls: AtomicU32::new(0),
    });
    let pipeline = DeploymentPipeline::new(
        store_dyn,
        hub,
        builder.clone(),
        transfer.clone(),
        PipelineOptions {
            workspace_root: std::env::temp_dir().join("slipway-pipeline-test"),
        },
    );
    Harness {
        store,
        pipeline,
        builder,
        transfer,
    }
}

fn test_project(language: &str) -> Project {
    Project {
        id: Uuid::new_v4(),
        name: "api".to_string(),
        repo_url: "https://example.com/api.git".to_string(),
        language: language.to_string(),
        build_command: None,
        deploy_path: "/srv/api".to_string(),
        restart_command: Some("systemctl restart api".to_string()),
        target_host: "10.0.0.5".to_string(),
        target_port: 22,
        target_username: "deploy".to_string(),
        ssh_key_path: Some(PathBuf::from("/etc/keys/deploy")),
        ssh_password: None,
    }
}

async fn seed(harness: &Harness, project: Project) -> Uuid {
    let deployment = Deployment::new(project.id, "abc123de4567", "main");
    let id = deployment.id;
    harness.store.insert_project(project).await;
    harness.store.insert_deployment(deployment).await.unwrap();
    id
}

#[tokio::test]
async fn test_successful_run_records_timings_and_logs() {
    let harness = create_harness(false);
    let id = seed(&harness, test_project("python")).await;

    let completed = harness.pipeline.execute(id).await.unwrap();
    assert!(completed);

    let deployment = harness.store.get_deployment(id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Success);
    assert_eq!(deployment.build_time_secs, Some(3));
    assert_eq!(deployment.deploy_time_secs, Some(2));
    assert!(deployment.end_time.is_some());
    assert!(deployment.duration_secs.is_some());
    assert!(deployment.error_message.is_none());

    // Phase banners and both stub lines landed in the persisted log
    assert!(deployment.logs.contains("=== Build phase ==="));
    assert!(deployment.logs.contains("Built python"));
    assert!(deployment.logs.contains("=== Transfer phase ==="));
    assert!(deployment.logs.contains("Shipped artifacts to 10.0.0.5"));
    assert!(deployment.logs.contains("completed successfully"));

    assert_eq!(harness.builder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.transfer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_build_failure_skips_transfer() {
    let harness = create_harness(true);
    let id = seed(&harness, test_project("python")).await;

    let completed = harness.pipeline.execute(id).await.unwrap();
    assert!(!completed);

    let deployment = harness.store.get_deployment(id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment
        .error_message
        .unwrap()
        .contains("compilation failed"));
    assert!(deployment.logs.contains("Deployment failed"));
    assert!(deployment.build_time_secs.is_none());
    assert!(deployment.deploy_time_secs.is_none());

    assert_eq!(harness.transfer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_credential_fails_before_transfer() {
    let harness = create_harness(false);
    let mut project = test_project("python");
    project.ssh_key_path = None;
    let id = seed(&harness, project).await;

    let completed = harness.pipeline.execute(id).await.unwrap();
    assert!(!completed);

    let deployment = harness.store.get_deployment(id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment.error_message.unwrap().contains("neither"));

    // The build ran; the transfer was never reached
    assert_eq!(harness.builder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.transfer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_deployment_is_an_engine_error() {
    let harness = create_harness(false);
    let result = harness.pipeline.execute(Uuid::new_v4()).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_terminal_logs_are_complete_before_status_flips() {
    let harness = create_harness(false);
    let id = seed(&harness, test_project("node")).await;

    harness.pipeline.execute(id).await.unwrap();

    // Once the record reads terminal, every emitted line is already in it
    let deployment = harness.store.get_deployment(id).await.unwrap();
    assert!(deployment.status.is_terminal());
    assert!(deployment.logs.contains("Built node"));
    assert!(deployment.logs.contains("completed successfully"));
}
