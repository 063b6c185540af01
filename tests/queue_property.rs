//! Property tests for the pending-queue coalescing invariant.

use ledgersync::model::{Entity, OperationKind, PendingOperation};
use ledgersync::offline::{BackoffPolicy, PendingQueue};
use ledgersync::store::LocalStore;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

fn kind_strategy() -> impl Strategy<Value = OperationKind> {
    prop_oneof![
        Just(OperationKind::Create),
        Just(OperationKind::Update),
        Just(OperationKind::Delete),
    ]
}

/// Replay a step sequence against a real queue and against the coalescing
/// rules as a map, returning both end states.
fn replay(
    steps: Vec<(u8, OperationKind, i64)>,
) -> (
    Vec<PendingOperation>,
    HashMap<String, (OperationKind, i64)>,
) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        let store = Arc::new(LocalStore::open_in_memory().await.unwrap());
        let queue = PendingQueue::new(Arc::clone(&store), BackoffPolicy::default(), 10, 10_000);

        let mut expected: HashMap<String, (OperationKind, i64)> = HashMap::new();

        for (entity_n, kind, amount) in steps {
            let entity_id = format!("e{}", entity_n);
            let entity = Entity::new(&entity_id, serde_json::json!({ "amount": amount }));
            queue
                .enqueue(PendingOperation::new("expenses", kind, entity))
                .await
                .unwrap();

            match kind {
                OperationKind::Delete => match expected.get(&entity_id) {
                    // delete cancels an unsynced create entirely
                    Some((OperationKind::Create, _)) => {
                        expected.remove(&entity_id);
                    }
                    _ => {
                        expected.insert(entity_id, (OperationKind::Delete, amount));
                    }
                },
                incoming => {
                    let kept_kind = match expected.get(&entity_id) {
                        None => incoming,
                        // recreate after a queued delete
                        Some((OperationKind::Delete, _)) => OperationKind::Create,
                        // a queued create/update keeps its kind, takes the payload
                        Some((existing, _)) => *existing,
                    };
                    expected.insert(entity_id, (kept_kind, amount));
                }
            }
        }

        let queued = queue.peek_batch(usize::MAX, chrono::Utc::now()).await.unwrap();
        (queued, expected)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn at_most_one_live_operation_per_entity(
        steps in proptest::collection::vec((0u8..3, kind_strategy(), 0i64..1000), 1..40)
    ) {
        let (queued, expected) = replay(steps);

        let mut seen = HashSet::new();
        for op in &queued {
            prop_assert!(
                seen.insert(op.entity_id().to_string()),
                "duplicate live operation for entity {}",
                op.entity_id()
            );
        }

        // the queue holds exactly the entities the model predicts
        let queued_ids: HashSet<_> = queued.iter().map(|op| op.entity_id().to_string()).collect();
        let expected_ids: HashSet<_> = expected.keys().cloned().collect();
        prop_assert_eq!(queued_ids, expected_ids);

        for op in &queued {
            let (kind, amount) = &expected[op.entity_id()];
            prop_assert_eq!(op.kind, *kind);
            if op.kind != OperationKind::Delete {
                prop_assert_eq!(
                    &op.entity.payload,
                    &serde_json::json!({ "amount": amount })
                );
            }
        }
    }
}
