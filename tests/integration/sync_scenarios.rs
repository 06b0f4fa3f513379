//! End-to-end drain scenarios through the facade

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::common::{named, test_config, test_config_with_backoff, Harness, ScriptedExecutor};
use crate::{assert_err, assert_eventually, assert_ok};
use zaptap_sync::offline::{BackoffStrategy, MemoryStore};
use zaptap_sync::shared::{EventKind, SyncEvent};
use zaptap_sync::sync::NetInfoState;
use zaptap_sync::{ExecutionError, OperationState, SyncError, SyncProgress};

#[tokio::test]
async fn test_concurrent_force_sync_runs_one_cycle() {
    let executor = ScriptedExecutor::with_delay(Duration::from_millis(50));
    let h = Harness::start(test_config(5), executor).await;
    h.enqueue("A").await;
    h.enqueue("B").await;

    let (first, second) = tokio::join!(h.network.force_sync(), h.network.force_sync());
    let first = assert_ok!(first);
    let second = assert_ok!(second);

    assert_eq!(first, second);
    assert_eq!(first.completed, 2);
    assert_eq!(h.executor.calls(), vec!["A", "B"]);
    assert_eq!(h.recorder.count(EventKind::SyncStarted), 1);
    assert_eq!(h.recorder.count(EventKind::SyncCompleted), 1);
}

#[tokio::test]
async fn test_transient_failure_retried_in_same_cycle() {
    let executor = ScriptedExecutor::new();
    executor.script("B", [Err(ExecutionError::other("503 upstream")), Ok(())]);
    let h = Harness::start(test_config(5), executor).await;

    let a = h.enqueue("A").await;
    let b = h.enqueue("B").await;
    let c = h.enqueue("C").await;

    let progress = assert_ok!(h.network.force_sync().await);
    assert_eq!(
        progress,
        SyncProgress {
            total: 3,
            completed: 3,
            failed: 0,
            in_progress: false
        }
    );
    assert_eq!(h.executor.calls(), vec!["A", "B", "B", "C"]);

    let queue = h.network.queue();
    for id in [a, b, c] {
        assert_eq!(queue.get(&id).await.unwrap().state, OperationState::Completed);
    }
    assert_eq!(queue.get(&b).await.unwrap().attempts, 1);

    let snapshot = h.network.snapshot().await;
    assert_eq!(snapshot.sync_progress, SyncProgress::default());
    assert_eq!(snapshot.pending_operations, 0);
}

#[tokio::test]
async fn test_progress_event_per_settled_attempt() {
    let executor = ScriptedExecutor::new();
    executor.script("B", [Err(ExecutionError::other("flaky"))]);
    let h = Harness::start(test_config(5), executor).await;
    h.enqueue("A").await;
    h.enqueue("B").await;

    assert_ok!(h.network.force_sync().await);

    let progress: Vec<SyncProgress> = h
        .recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::SyncProgress { progress } => Some(progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 3);
    assert_eq!((progress[1].total, progress[1].failed), (2, 1));
    assert_eq!((progress[2].total, progress[2].completed), (2, 2));
    assert!(progress.iter().all(|p| p.in_progress));
}

#[tokio::test]
async fn test_exhausted_operation_dead_letters_and_retries() {
    let executor = ScriptedExecutor::new();
    executor.always("X", Err(ExecutionError::other("validation failed")));
    let config = test_config_with_backoff(
        2,
        BackoffStrategy::Fixed {
            interval: Duration::from_millis(30),
        },
    );
    let h = Harness::start(config, executor).await;
    let x = h.enqueue("X").await;
    let queue = h.network.queue().clone();

    // First cycle: one failure, then X waits out its backoff
    let first = assert_ok!(h.network.force_sync().await);
    assert_eq!((first.total, first.failed), (1, 1));
    assert_eq!(queue.get(&x).await.unwrap().state, OperationState::Failed);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_ok!(h.network.force_sync().await);

    let dead = queue.get_dead_letter_queue().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, x);
    assert_eq!(dead[0].attempts, 2);
    assert_eq!(queue.dequeue_next_pending().await.unwrap(), None);
    assert_eq!(h.network.snapshot().await.failed_operations, 1);

    h.executor.always("X", Ok(()));
    let started = h.recorder.count(EventKind::SyncStarted);
    assert_eq!(assert_ok!(h.network.retry_failed_operations().await), 1);

    assert_eq!(h.recorder.count(EventKind::SyncStarted), started + 1);
    let op = queue.get(&x).await.unwrap();
    assert_eq!(op.state, OperationState::Completed);
    assert_eq!(op.attempts, 0);
    assert_eq!(h.executor.call_count("X"), 3);
}

#[tokio::test]
async fn test_connection_lost_mid_drain() {
    let executor = ScriptedExecutor::new();
    executor.script("B", [Err(ExecutionError::network("connection reset by peer"))]);
    let h = Harness::start(test_config(5), executor).await;

    let a = h.enqueue("A").await;
    let b = h.enqueue("B").await;
    let c = h.enqueue("C").await;

    assert_err!(h.network.force_sync().await, SyncError::ConnectionLost { .. });
    assert_eq!(h.executor.calls(), vec!["A", "B"]);

    let queue = h.network.queue().clone();
    assert_eq!(queue.get(&a).await.unwrap().state, OperationState::Completed);
    let failed = queue.get(&b).await.unwrap();
    assert_eq!(failed.state, OperationState::Failed);
    assert_eq!(failed.attempts, 1);
    assert_eq!(queue.get(&c).await.unwrap().state, OperationState::Pending);

    let partial = h.recorder.events().into_iter().find_map(|e| match e {
        SyncEvent::SyncFailed { progress, .. } => Some(progress),
        _ => None,
    });
    assert_eq!(
        partial,
        Some(SyncProgress {
            total: 2,
            completed: 1,
            failed: 1,
            in_progress: false
        })
    );
    assert!(h.network.engine().is_awaiting_reconnect());

    // Platform reports the drop, then the reconnect
    let mut snapshots = h.network.watch_snapshot();
    h.source.set(NetInfoState::disconnected());
    assert_ok!(snapshots.wait_for(|s| !s.is_online).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.source.set(NetInfoState::wifi());

    assert_eventually!(queue.get(&c).await.unwrap().state == OperationState::Completed);
    assert_eq!(queue.get(&b).await.unwrap().state, OperationState::Completed);
    assert_eq!(h.executor.calls(), vec!["A", "B", "B", "C"]);
}

#[tokio::test]
async fn test_force_sync_offline() {
    let executor = ScriptedExecutor::new();
    let h = Harness::start_with(
        test_config(5),
        executor,
        NetInfoState::disconnected(),
        Arc::new(MemoryStore::new()),
    )
    .await;
    h.enqueue("A").await;

    assert_err!(h.network.force_sync().await, SyncError::Offline);
    assert!(h.executor.calls().is_empty());
    assert_eq!(h.recorder.count(EventKind::SyncFailed), 1);
    assert_eq!(h.recorder.count(EventKind::SyncStarted), 0);

    let snapshot = h.network.snapshot().await;
    assert!(!snapshot.is_online);
    assert_eq!(snapshot.pending_operations, 1);
}

#[tokio::test]
async fn test_reachability_loss_counts_as_offline() {
    let h = Harness::start(test_config(5), ScriptedExecutor::new()).await;
    h.source.set(NetInfoState::wifi().with_reachable(Some(false)));

    assert_err!(h.network.force_sync().await, SyncError::Offline);
}

#[tokio::test]
async fn test_reconnect_drains_queue_enqueued_offline() {
    let executor = ScriptedExecutor::new();
    let h = Harness::start_with(
        test_config(5),
        executor,
        NetInfoState::disconnected(),
        Arc::new(MemoryStore::new()),
    )
    .await;
    h.enqueue("A").await;
    h.enqueue("B").await;
    assert!(h.executor.calls().is_empty());

    h.source.set(NetInfoState::cellular(None));

    let queue = h.network.queue().clone();
    assert_eventually!(queue.get_stats().await.completed == 2);
    assert_eq!(h.executor.calls(), vec!["A", "B"]);
    assert!(h.network.snapshot().await.last_sync_time.is_some());
}

#[tokio::test]
async fn test_network_changed_not_repeated_for_identical_state() {
    let h = Harness::start(test_config(5), ScriptedExecutor::new()).await;
    let mut snapshots = h.network.watch_snapshot();

    h.source.set(NetInfoState::wifi());
    h.source.set(NetInfoState::cellular(None));
    assert_ok!(
        snapshots
            .wait_for(|s| s.connection_type == zaptap_sync::sync::ConnectionType::Cellular)
            .await
    );
    h.source.set(NetInfoState::cellular(None));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.recorder.count(EventKind::NetworkChanged), 1);
}

#[tokio::test]
async fn test_clear_completed_keeps_failures() {
    let executor = ScriptedExecutor::new();
    executor.always("bad", Err(ExecutionError::other("rejected")));
    let h = Harness::start(test_config(1), executor).await;
    for name in ["ok-1", "ok-2", "bad"] {
        h.enqueue(name).await;
    }
    assert_ok!(h.network.force_sync().await);

    assert_eq!(assert_ok!(h.network.clear_completed_operations().await), 2);
    let stats = h.network.queue().get_stats().await;
    assert_eq!(stats.total(), 1);
    assert_eq!(stats.dead_letter, 1);
    assert_eq!(named("bad"), h.network.queue().operations().await[0].payload);
}
