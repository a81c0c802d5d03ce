//! Property-Based Tests for the cache, merge and queue
//!
//! Uses proptest to check invariants over arbitrary operation sequences.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{shared, CacheStore, GetOptions, MemoryStorage, SetOptions};
use crate::clock::ManualClock;
use crate::models::{Record, SchemaRegistry};
use crate::queue::{MutationQueue, Operation};
use crate::remote::{InMemoryRemote, RemoteCall};
use crate::sync::merge::merge_records;

// == Test Configuration ==
const TEST_DEFAULT_TTL: Duration = Duration::from_secs(300);

fn manual_store() -> (CacheStore, ManualClock) {
    let clock = ManualClock::new(1_700_000_000_000);
    let store = CacheStore::new(
        Box::new(MemoryStorage::new()),
        Arc::new(clock.clone()),
        "aurora_",
        TEST_DEFAULT_TTL,
    );
    (store, clock)
}

// == Strategies ==
/// Generates cache keys from a small alphabet so sequences revisit keys
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-e]{1,2}".prop_map(|s| s)
}

/// Generates JSON values of the shapes the daemon stores
fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,32}".prop_map(|s| json!(s)),
        any::<bool>().prop_map(|b| json!(b)),
        prop::collection::vec(any::<u16>(), 0..5).prop_map(|v| json!(v)),
        ("[a-z]{1,8}", any::<i32>()).prop_map(|(k, v)| json!({ k: v })),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: Value },
    Get { key: String },
    Remove { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Remove { key }),
    ]
}

fn record_strategy() -> impl Strategy<Value = Record> {
    ("[a-f]", any::<u8>()).prop_map(|(id, v)| {
        Record::from_value(json!({"id": id, "v": v})).unwrap_or_default()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Any sequence of operations behaves like a plain map, and the stats
    // count exactly the reads that hit or missed.
    #[test]
    fn prop_store_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let (mut store, _) = manual_store();
        let mut model: HashMap<String, Value> = HashMap::new();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.set_value(&key, value.clone(), SetOptions::default()).unwrap();
                    model.insert(key, value);
                }
                CacheOp::Get { key } => {
                    let got = store.get_value(&key, GetOptions::default()).unwrap();
                    prop_assert_eq!(got.as_ref(), model.get(&key));
                    if got.is_some() {
                        expected_hits += 1;
                    } else {
                        expected_misses += 1;
                    }
                }
                CacheOp::Remove { key } => {
                    store.remove(&key).unwrap();
                    model.remove(&key);
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(store.len(), model.len(), "Entry count mismatch");
    }

    // A value is readable while its age is within the TTL and gone after.
    #[test]
    fn prop_ttl_boundary(ttl_ms in 1u64..100_000, elapsed_ms in 0u64..200_000, value in value_strategy()) {
        let (mut store, clock) = manual_store();
        store.set_value("k", value.clone(), SetOptions::ttl(Duration::from_millis(ttl_ms))).unwrap();

        clock.advance_ms(elapsed_ms as i64);
        let got = store.get_value("k", GetOptions::default()).unwrap();

        if elapsed_ms <= ttl_ms {
            prop_assert_eq!(got, Some(value));
        } else {
            prop_assert_eq!(got, None);
            prop_assert_eq!(store.stats().expirations, 1);
            prop_assert!(store.is_empty(), "Expired entry must be evicted on read");
        }
    }

    // Overwriting restarts the TTL from the second write.
    #[test]
    fn prop_overwrite_restarts_ttl(gap_ms in 1u64..250_000) {
        let (mut store, clock) = manual_store();
        store.set_value("k", json!(1), SetOptions::default()).unwrap();
        clock.advance_ms(gap_ms as i64);
        store.set_value("k", json!(2), SetOptions::default()).unwrap();
        clock.advance_ms(TEST_DEFAULT_TTL.as_millis() as i64);

        prop_assert_eq!(store.get_value("k", GetOptions::default()).unwrap(), Some(json!(2)));
    }

    // Clearing removes exactly the keys written through this store.
    #[test]
    fn prop_clear_removes_namespace(keys in prop::collection::hash_set(key_strategy(), 0..10)) {
        let (mut store, _) = manual_store();
        for key in &keys {
            store.set_value(key, json!(true), SetOptions::persistent()).unwrap();
        }

        prop_assert_eq!(store.clear().unwrap(), keys.len());
        prop_assert!(store.keys().is_empty());
    }

    // force_refresh always misses and leaves nothing behind.
    #[test]
    fn prop_force_refresh_always_misses(key in key_strategy(), value in value_strategy()) {
        let (mut store, _) = manual_store();
        store.set_value(&key, value, SetOptions::persistent()).unwrap();

        prop_assert_eq!(store.get_value(&key, GetOptions::force_refresh()).unwrap(), None);
        prop_assert_eq!(store.get_value(&key, GetOptions::default()).unwrap(), None);
    }

    // Merging the same batch twice gives the same collection as merging once,
    // and no id ever appears twice.
    #[test]
    fn prop_merge_is_idempotent(
        existing in prop::collection::vec(record_strategy(), 0..8),
        batch in prop::collection::vec(record_strategy(), 0..8),
    ) {
        let mut base = Vec::new();
        merge_records(&mut base, existing);

        let mut once = base.clone();
        merge_records(&mut once, batch.clone());
        let mut twice = once.clone();
        merge_records(&mut twice, batch);

        prop_assert_eq!(&once, &twice);

        let mut ids: Vec<&str> = once.iter().filter_map(Record::id).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), total, "Duplicate ids after merge");
    }

    // Mutations on a single table reach the remote in enqueue order.
    #[test]
    fn prop_drain_preserves_fifo(amounts in prop::collection::vec(0u32..1000, 1..12)) {
        tokio_test::block_on(async {
            let queue = MutationQueue::new(shared(CacheStore::in_memory()), SchemaRegistry::empty());
            let remote = InMemoryRemote::default();
            remote.seed("expenses", Record::from_value(json!({"id": "e1"})).unwrap()).await;
            remote.clear_calls().await;

            for amount in &amounts {
                queue
                    .enqueue("expenses", Operation::Update, json!({"id": "e1", "amount": amount}))
                    .await
                    .unwrap();
            }

            let report = queue.drain(&remote).await.unwrap();
            assert_eq!(report.acknowledged.len(), amounts.len());
            assert!(queue.is_empty().await.unwrap());

            let sent: Vec<Value> = remote
                .calls()
                .await
                .into_iter()
                .filter_map(|call| match call {
                    RemoteCall::Update { patch, .. } => patch.get("amount").cloned(),
                    _ => None,
                })
                .collect();
            let expected: Vec<Value> = amounts.iter().map(|a| json!(a)).collect();
            assert_eq!(sent, expected);
        });
    }
}
