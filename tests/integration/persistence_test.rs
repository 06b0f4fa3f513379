//! Durability of the queue across process restarts

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{named, open_store, temp_database, test_config, Harness, ScriptedExecutor};
use crate::{assert_err, assert_ok};
use zaptap_sync::offline::{MemoryStore, OperationQueue};
use zaptap_sync::sync::NetInfoState;
use zaptap_sync::{ExecutionError, OperationState, SyncError};

#[tokio::test]
async fn test_queue_survives_reopen_in_order() {
    let (_dir, path) = temp_database();

    let ids = {
        let queue = assert_ok!(OperationQueue::open(open_store(&path).await, 5).await);
        let mut ids = Vec::new();
        for n in 0..3 {
            ids.push(assert_ok!(queue.enqueue("save-automation", json!({ "n": n })).await));
        }
        ids
    };

    let queue = assert_ok!(OperationQueue::open(open_store(&path).await, 5).await);
    let reloaded: Vec<_> = queue.operations().await.into_iter().map(|op| op.id).collect();
    assert_eq!(reloaded, ids);
    assert_eq!(queue.get_stats().await.pending, 3);

    // New operations continue after the persisted tail
    let later = assert_ok!(queue.enqueue("save-automation", json!({ "n": 3 })).await);
    let claimed = assert_ok!(queue.dequeue_next_pending().await).unwrap();
    assert_eq!(claimed.id, ids[0]);
    assert!(queue.get(&later).await.unwrap().seq > claimed.seq);
}

#[tokio::test]
async fn test_interrupted_operation_recovered_as_pending() {
    let (_dir, path) = temp_database();

    let id = {
        let queue = assert_ok!(OperationQueue::open(open_store(&path).await, 5).await);
        let id = assert_ok!(queue.enqueue("share-automation", json!({})).await);
        let claimed = assert_ok!(queue.dequeue_next_pending().await).unwrap();
        assert_eq!(claimed.state, OperationState::InFlight);
        id
    };

    let queue = assert_ok!(OperationQueue::open(open_store(&path).await, 5).await);
    let op = queue.get(&id).await.unwrap();
    assert_eq!(op.state, OperationState::Pending);
    assert_eq!(op.attempts, 0);
}

#[tokio::test]
async fn test_dead_letter_and_sync_time_survive_restart() {
    let (_dir, path) = temp_database();
    let executor = ScriptedExecutor::new();
    executor.always("X", Err(ExecutionError::other("payload rejected")));

    let x = {
        let h = Harness::start_with(
            test_config(1),
            executor,
            NetInfoState::wifi(),
            open_store(&path).await,
        )
        .await;
        let x = h.enqueue("X").await;
        assert_ok!(h.network.force_sync().await);
        h.network.shutdown();
        x
    };

    let store = open_store(&path).await;
    let queue = assert_ok!(OperationQueue::open(store, 1).await);
    let dead = queue.get_dead_letter_queue().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, x);
    assert_eq!(dead[0].payload, named("X"));
    assert_eq!(dead[0].last_error.as_deref(), Some("payload rejected"));
    assert!(assert_ok!(queue.last_sync_time().await).is_some());
}

#[tokio::test]
async fn test_unavailable_store_rejects_mutations() {
    let store = Arc::new(MemoryStore::new());
    let queue = assert_ok!(OperationQueue::open(store.clone(), 5).await);
    let kept = assert_ok!(queue.enqueue("save-automation", json!({})).await);

    store.set_available(false);
    assert_err!(queue.enqueue("save-automation", json!({})).await, SyncError::Storage { .. });
    assert_err!(queue.dequeue_next_pending().await, SyncError::Storage { .. });

    let stats = queue.get_stats().await;
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(queue.get(&kept).await.unwrap().state, OperationState::Pending);
}
