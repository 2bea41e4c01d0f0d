//! Log hub integration tests

use std::sync::Arc;

use slipway::hub::{HubMessage, HubOptions, LogHub};
use slipway::models::deployment::{Deployment, DeploymentStatus, LogEntry};
use slipway::store::{DeploymentStore, MemoryStore};
use uuid::Uuid;

fn create_hub(options: HubOptions) -> (Arc<MemoryStore>, LogHub) {
    let store = Arc::new(MemoryStore::new());
    let hub = LogHub::new(store.clone(), options);
    (store, hub)
}

async fn seed_deployment(store: &MemoryStore) -> Uuid {
    let deployment = Deployment::new(Uuid::new_v4(), "abc123de4567", "main");
    let id = deployment.id;
    store.insert_deployment(deployment).await.unwrap();
    id
}

#[tokio::test]
async fn test_subscribe_replays_history_then_streams_live() {
    let (store, hub) = create_hub(HubOptions::default());
    let id = seed_deployment(&store).await;

    hub.open(id).await;
    hub.publish(id, &LogEntry::info("first")).await;

    let mut stream = hub.subscribe(id).await.unwrap();

    match stream.next().await {
        Some(HubMessage::Welcome { deployment_id }) => assert_eq!(deployment_id, id),
        other => panic!("expected welcome, got {:?}", other),
    }
    match stream.next().await {
        Some(HubMessage::History { logs, status, .. }) => {
            assert!(logs.contains("first"));
            assert!(!logs.contains("second"));
            assert_eq!(status, DeploymentStatus::Pending);
        }
        other => panic!("expected history, got {:?}", other),
    }

    // Lines published after the subscription arrive live, exactly once
    hub.publish(id, &LogEntry::info("second")).await;
    match stream.next().await {
        Some(HubMessage::Log { message, .. }) => assert_eq!(message, "second"),
        other => panic!("expected log, got {:?}", other),
    }

    hub.close(id).await;
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_live_lines_arrive_in_emission_order() {
    let (store, hub) = create_hub(HubOptions::default());
    let id = seed_deployment(&store).await;

    hub.open(id).await;
    let mut stream = hub.subscribe(id).await.unwrap();

    // Skip welcome and history
    stream.next().await.unwrap();
    stream.next().await.unwrap();

    for i in 0..20 {
        hub.publish(id, &LogEntry::info(format!("line {}", i))).await;
    }
    hub.close(id).await;

    let mut received = Vec::new();
    while let Some(message) = stream.next().await {
        if let HubMessage::Log { message, .. } = message {
            received.push(message);
        }
    }

    let expected: Vec<String> = (0..20).map(|i| format!("line {}", i)).collect();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn test_subscribe_without_live_channel_replays_record() {
    let (store, hub) = create_hub(HubOptions::default());
    let id = seed_deployment(&store).await;

    store.append_log(id, "[old] [INFO] archived line").await.unwrap();

    let mut stream = hub.subscribe(id).await.unwrap();

    assert!(matches!(stream.next().await, Some(HubMessage::Welcome { .. })));
    match stream.next().await {
        Some(HubMessage::History { logs, .. }) => assert!(logs.contains("archived line")),
        other => panic!("expected history, got {:?}", other),
    }

    // No live channel, so the stream ends after the snapshot
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_subscribe_unknown_deployment_fails() {
    let (_store, hub) = create_hub(HubOptions::default());
    assert!(hub.subscribe(Uuid::new_v4()).await.is_err());
}

#[tokio::test]
async fn test_slow_subscriber_is_dropped_without_blocking_history() {
    let (store, hub) = create_hub(HubOptions {
        subscriber_capacity: 1,
    });
    let id = seed_deployment(&store).await;

    hub.open(id).await;
    let mut slow = hub.subscribe(id).await.unwrap();

    // Never read the live end; the second publish overflows the buffer
    // and evicts the subscriber
    hub.publish(id, &LogEntry::info("one")).await;
    hub.publish(id, &LogEntry::info("two")).await;
    hub.publish(id, &LogEntry::info("three")).await;

    // History kept accumulating after the eviction
    let mut fresh = hub.subscribe(id).await.unwrap();
    fresh.next().await.unwrap();
    match fresh.next().await {
        Some(HubMessage::History { logs, .. }) => {
            assert!(logs.contains("one"));
            assert!(logs.contains("two"));
            assert!(logs.contains("three"));
        }
        other => panic!("expected history, got {:?}", other),
    }

    // The evicted stream drains its queued messages and the one buffered
    // line, then ends
    slow.next().await.unwrap();
    slow.next().await.unwrap();
    assert!(matches!(slow.next().await, Some(HubMessage::Log { .. })));
    assert!(slow.next().await.is_none());
}

#[tokio::test]
async fn test_history_snapshot_reports_current_status() {
    let (store, hub) = create_hub(HubOptions::default());
    let id = seed_deployment(&store).await;

    hub.open(id).await;
    hub.set_status(id, DeploymentStatus::Running).await;

    let mut stream = hub.subscribe(id).await.unwrap();
    stream.next().await.unwrap();
    match stream.next().await {
        Some(HubMessage::History { status, .. }) => {
            assert_eq!(status, DeploymentStatus::Running)
        }
        other => panic!("expected history, got {:?}", other),
    }
}
