//! Log broadcast hub
//!
//! Fans out log lines for a running deployment to live subscribers and
//! replays accumulated history to late joiners. History append and fanout
//! happen under one guarded critical section, so a subscriber joining
//! mid-run can never observe a gap or a duplicate line.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::models::deployment::{DeploymentStatus, LogEntry, LogKind};
use crate::store::DeploymentStore;

/// Hub options
#[derive(Debug, Clone)]
pub struct HubOptions {
    /// Per-subscriber buffered message capacity; a subscriber that falls
    /// this far behind is dropped rather than blocking delivery to others
    pub subscriber_capacity: usize,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            subscriber_capacity: 256,
        }
    }
}

/// Structured message delivered to live-log subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HubMessage {
    Welcome {
        deployment_id: Uuid,
    },
    History {
        deployment_id: Uuid,
        logs: String,
        status: DeploymentStatus,
    },
    Log {
        deployment_id: Uuid,
        log_type: LogKind,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

struct Channel {
    history: String,
    status: DeploymentStatus,
    subscribers: Vec<mpsc::Sender<HubMessage>>,
}

impl Channel {
    fn new() -> Self {
        Self {
            history: String::new(),
            status: DeploymentStatus::Pending,
            subscribers: Vec::new(),
        }
    }

    fn append_history(&mut self, line: &str) {
        if !self.history.is_empty() {
            self.history.push('\n');
        }
        self.history.push_str(line);
    }
}

/// Process-wide registry of per-deployment log channels
pub struct LogHub {
    store: Arc<dyn DeploymentStore>,
    options: HubOptions,
    channels: Mutex<HashMap<Uuid, Channel>>,
}

impl LogHub {
    pub fn new(store: Arc<dyn DeploymentStore>, options: HubOptions) -> Self {
        Self {
            store,
            options,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Open the live channel for a deployment about to run
    pub async fn open(&self, deployment_id: Uuid) {
        let mut channels = self.channels.lock().await;
        channels.entry(deployment_id).or_insert_with(Channel::new);
    }

    /// Publish one entry to every current subscriber, in emission order
    pub async fn publish(&self, deployment_id: Uuid, entry: &LogEntry) {
        let mut channels = self.channels.lock().await;
        let Some(channel) = channels.get_mut(&deployment_id) else {
            return;
        };

        channel.append_history(&entry.format_line());

        let message = HubMessage::Log {
            deployment_id,
            log_type: entry.kind,
            message: entry.message.clone(),
            timestamp: entry.timestamp,
        };

        // try_send keeps a slow or closed subscriber from blocking the rest;
        // it is dropped from the registry instead
        let before = channel.subscribers.len();
        channel
            .subscribers
            .retain(|tx| tx.try_send(message.clone()).is_ok());
        let dropped = before - channel.subscribers.len();
        if dropped > 0 {
            debug!(
                "Dropped {} subscriber(s) for deployment {}",
                dropped, deployment_id
            );
        }
    }

    /// Record the status reported in history snapshots
    pub async fn set_status(&self, deployment_id: Uuid, status: DeploymentStatus) {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get_mut(&deployment_id) {
            channel.status = status;
        }
    }

    /// Close the live channel; subscriber streams end after draining
    pub async fn close(&self, deployment_id: Uuid) {
        let mut channels = self.channels.lock().await;
        channels.remove(&deployment_id);
    }

    /// Subscribe to a deployment's log stream
    ///
    /// Delivers a welcome message and a history snapshot immediately, then
    /// every subsequently published entry in exact emission order until the
    /// channel closes. Subscribing to a deployment with no live channel
    /// replays the persisted record and ends.
    pub async fn subscribe(&self, deployment_id: Uuid) -> Result<LogStream, EngineError> {
        let mut queued = VecDeque::new();
        queued.push_back(HubMessage::Welcome { deployment_id });

        {
            let mut channels = self.channels.lock().await;
            if let Some(channel) = channels.get_mut(&deployment_id) {
                queued.push_back(HubMessage::History {
                    deployment_id,
                    logs: channel.history.clone(),
                    status: channel.status,
                });

                let (tx, rx) = mpsc::channel(self.options.subscriber_capacity);
                channel.subscribers.push(tx);
                return Ok(LogStream {
                    queued,
                    live: Some(rx),
                });
            }
        }

        // No live channel; fall back to the persisted record
        let deployment = self.store.get_deployment(deployment_id).await?;
        queued.push_back(HubMessage::History {
            deployment_id,
            logs: deployment.logs,
            status: deployment.status,
        });
        Ok(LogStream { queued, live: None })
    }
}

/// Ordered stream of hub messages for one subscriber
pub struct LogStream {
    queued: VecDeque<HubMessage>,
    live: Option<mpsc::Receiver<HubMessage>>,
}

impl LogStream {
    /// Next message, or None once the channel has closed and drained
    pub async fn next(&mut self) -> Option<HubMessage> {
        if let Some(message) = self.queued.pop_front() {
            return Some(message);
        }
        match &mut self.live {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}
