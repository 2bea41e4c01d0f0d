//! One-shot deployment run loop
//!
//! Triggers a deployment, follows its live log stream on stdout, and waits
//! for the terminal status. Used by the CLI entry point; a webhook
//! collaborator would call the trigger seam directly instead.

use tracing::{error, info};
use uuid::Uuid;

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::errors::EngineError;
use crate::hub::HubMessage;
use crate::models::deployment::{DeploymentStatus, LogEntry};
use crate::models::project::Project;
use crate::store::DeploymentStore;
use crate::trigger::TriggerRequest;

/// Trigger one deployment and follow it to completion
///
/// Returns true when the deployment finished with success status. Ctrl-c
/// stops following the stream and shuts the runner down; the in-flight
/// deployment record keeps whatever status it reached.
pub async fn run(
    options: AppOptions,
    projects: Vec<Project>,
    request: TriggerRequest,
) -> Result<bool, EngineError> {
    let state = AppState::init(&options);

    for project in projects {
        state.store.insert_project(project).await;
    }

    let deployment_id = state.trigger.trigger(request).await?;
    let mut stream = state.hub.subscribe(deployment_id).await?;

    loop {
        tokio::select! {
            message = stream.next() => {
                match message {
                    Some(message) => print_message(message),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; detaching from deployment {}", deployment_id);
                break;
            }
        }
    }

    state.shutdown(options.max_shutdown_delay).await?;

    finished_successfully(&state, deployment_id).await
}

/// Render one hub message to stdout the way a live observer sees it
fn print_message(message: HubMessage) {
    match message {
        HubMessage::Welcome { deployment_id } => {
            info!("Following deployment {}", deployment_id);
        }
        HubMessage::History { logs, .. } => {
            if !logs.is_empty() {
                println!("{}", logs);
            }
        }
        HubMessage::Log {
            log_type,
            message,
            timestamp,
            ..
        } => {
            let entry = LogEntry {
                kind: log_type,
                message,
                timestamp,
            };
            println!("{}", entry.format_line());
        }
    }
}

async fn finished_successfully(
    state: &AppState,
    deployment_id: Uuid,
) -> Result<bool, EngineError> {
    let deployment = state.store.get_deployment(deployment_id).await?;
    match deployment.status {
        DeploymentStatus::Success => {
            info!(
                "Deployment {} succeeded in {}s",
                deployment_id,
                deployment.duration_secs.unwrap_or_default()
            );
            Ok(true)
        }
        status => {
            error!(
                "Deployment {} ended with status {}{}",
                deployment_id,
                status,
                deployment
                    .error_message
                    .map(|m| format!(": {}", m))
                    .unwrap_or_default()
            );
            Ok(false)
        }
    }
}
