//! Property-based tests for queue ordering and the attempt budget

use proptest::prelude::*;
use serde_json::json;
use tokio_test::block_on;
use zaptap_sync::offline::{OperationQueue, OperationState};

proptest! {
    #[test]
    fn test_claims_follow_enqueue_order(total in 1usize..40, claims in 0usize..40) {
        let claims = claims.min(total);
        block_on(async {
            let queue = OperationQueue::in_memory(5);
            let mut ids = Vec::new();
            for n in 0..total {
                ids.push(queue.enqueue("save", json!({ "n": n })).await.unwrap());
            }

            let mut claimed = Vec::new();
            for _ in 0..claims {
                claimed.push(queue.dequeue_next_pending().await.unwrap().unwrap().id);
            }

            let stats = queue.get_stats().await;
            prop_assert_eq!(stats.pending, total - claims);
            prop_assert_eq!(stats.in_flight, claims);
            prop_assert_eq!(&claimed[..], &ids[..claims]);
            Ok(())
        })?;
    }

    #[test]
    fn test_exhausted_budget_dead_letters(max_attempts in 1u32..8) {
        block_on(async {
            let queue = OperationQueue::in_memory(max_attempts);
            let id = queue.enqueue("save", json!({})).await.unwrap();

            for attempt in 1..=max_attempts {
                let op = queue.dequeue_next_pending().await.unwrap().unwrap();
                prop_assert_eq!(op.id, id);
                let state = queue.mark_failed(&id, "boom").await.unwrap();
                let expected = if attempt == max_attempts {
                    OperationState::DeadLetter
                } else {
                    OperationState::Failed
                };
                prop_assert_eq!(state, expected);
            }

            prop_assert!(queue.dequeue_next_pending().await.unwrap().is_none());
            prop_assert_eq!(queue.get(&id).await.unwrap().attempts, max_attempts);
            Ok(())
        })?;
    }

    #[test]
    fn test_requeue_ignores_live_operations(total in 1usize..10, pick in 0usize..10) {
        block_on(async {
            let queue = OperationQueue::in_memory(3);
            let mut ids = Vec::new();
            for _ in 0..total {
                ids.push(queue.enqueue("save", json!({})).await.unwrap());
            }
            let before = queue.operations().await;

            prop_assert!(!queue.requeue_from_dead_letter(&ids[pick % total]).await.unwrap());
            prop_assert_eq!(queue.operations().await, before);
            Ok(())
        })?;
    }
}
