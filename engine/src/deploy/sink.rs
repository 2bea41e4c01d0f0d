//! Append-only log channel for a deployment run
//!
//! Phases write entries to the sink; a single drain task delivers each
//! entry, in emission order, to the persisted record and to the hub. This
//! decouples log production from delivery: a slow store write never stalls
//! a build's output stream.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;
use uuid::Uuid;

use crate::hub::LogHub;
use crate::models::deployment::LogEntry;
use crate::store::DeploymentStore;

/// Producer handle given to the build and transfer phases
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<LogEntry>,
}

impl LogSink {
    /// Create a sink and the receiving end for its drain task
    pub fn channel() -> (LogSink, mpsc::UnboundedReceiver<LogEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (LogSink { tx }, rx)
    }

    pub fn push(&self, entry: LogEntry) {
        // The drain outlives every producer in normal operation; an entry
        // emitted after the run was torn down is dropped
        let _ = self.tx.send(entry);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogEntry::info(message));
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(LogEntry::success(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogEntry::error(message));
    }
}

/// Drain entries until every sink clone is dropped
///
/// Each entry is appended to the store and published to the hub before the
/// next one is taken, so persisted and fanned-out order always match.
pub fn spawn_drain(
    deployment_id: Uuid,
    mut rx: mpsc::UnboundedReceiver<LogEntry>,
    store: Arc<dyn DeploymentStore>,
    hub: Arc<LogHub>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            if let Err(e) = store.append_log(deployment_id, &entry.format_line()).await {
                error!(
                    "Failed to persist log line for deployment {}: {}",
                    deployment_id, e
                );
            }
            hub.publish(deployment_id, &entry).await;
        }
    })
}
