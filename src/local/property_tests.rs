//! Property-Based Tests for the Local Tier
//!
//! Uses proptest to check round-trip, cost-bound and expiry behavior.

use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use crate::local::LocalCache;

// == Test Configuration ==
const TEST_NUM_COUNTERS: u64 = 1000;
const TEST_MAX_COST: u64 = 10_000;

// == Strategies ==
/// Generates cache keys
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,64}".prop_map(|s| s)
}

/// Generates payloads
fn valid_value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..256)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, cost: u64 },
    Get { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (valid_key_strategy(), 1u64..50).prop_map(|(key, cost)| CacheOp::Set { key, cost }),
        valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Storing a pair and reading it back before expiry, with no cost pressure,
    // returns exactly the stored bytes.
    #[test]
    fn prop_roundtrip_storage(key in valid_key_strategy(), value in valid_value_strategy()) {
        let cache = LocalCache::new(TEST_NUM_COUNTERS, TEST_MAX_COST).unwrap();

        cache.set(&key, value.clone(), value.len() as u64, Duration::ZERO).unwrap();

        let retrieved = cache.get(&key).unwrap();
        prop_assert_eq!(&*retrieved, value.as_slice(), "Round-trip value mismatch");
    }

    // Writing V1 then V2 under the same key reads back V2 with one resident entry.
    #[test]
    fn prop_overwrite_semantics(
        key in valid_key_strategy(),
        value1 in valid_value_strategy(),
        value2 in valid_value_strategy()
    ) {
        let cache = LocalCache::new(TEST_NUM_COUNTERS, TEST_MAX_COST).unwrap();

        cache.set(&key, value1, 10, Duration::ZERO).unwrap();
        cache.set(&key, value2.clone(), 20, Duration::ZERO).unwrap();

        let retrieved = cache.get(&key).unwrap();
        prop_assert_eq!(&*retrieved, value2.as_slice(), "Overwrite should return new value");
        prop_assert_eq!(cache.len(), 1u64);
        prop_assert_eq!(cache.used_cost(), 20u64);
    }

    // However many writes arrive, settled occupancy stays within the budget
    // and matches the resident entries.
    #[test]
    fn prop_cost_bound(
        entries in prop::collection::vec((valid_key_strategy(), 1u64..60), 1..200),
        max_cost in 50u64..300
    ) {
        let cache = LocalCache::new(TEST_NUM_COUNTERS, max_cost).unwrap();

        for (key, cost) in entries {
            cache.set(&key, b"v".to_vec(), cost, Duration::ZERO).unwrap();
            let used = cache.used_cost();
            prop_assert!(used <= max_cost, "Occupied cost {} exceeds max {}", used, max_cost);
        }
    }

    // Hit and miss counters match what the caller observed.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let cache = LocalCache::new(TEST_NUM_COUNTERS, 200).unwrap();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;
        let mut expected_inserts: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, cost } => {
                    cache.set(&key, b"v".to_vec(), cost, Duration::ZERO).unwrap();
                    expected_inserts += 1;
                }
                CacheOp::Get { key } => match cache.get(&key) {
                    Some(_) => expected_hits += 1,
                    None => expected_misses += 1,
                },
            }
        }

        let stats = cache.stats().unwrap();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.inserts, expected_inserts, "Inserts mismatch");
        prop_assert_eq!(stats.rejections, 0, "Nothing exceeds the budget on its own");
        prop_assert_eq!(stats.total_entries, cache.len(), "Total entries mismatch");
    }
}

// Separate proptest block with fewer cases for time-sensitive TTL tests
proptest! {
    #![proptest_config(ProptestConfig::with_cases(5))]

    // An entry stored with a TTL is gone once the TTL has elapsed.
    #[test]
    fn prop_ttl_expiration_behavior(
        key in valid_key_strategy(),
        value in valid_value_strategy()
    ) {
        let cache = LocalCache::new(TEST_NUM_COUNTERS, TEST_MAX_COST).unwrap();

        cache.set(&key, value.clone(), 1, Duration::from_secs(1)).unwrap();

        let before = cache.get(&key);
        prop_assert!(before.is_some(), "Entry should exist before TTL expires");

        sleep(Duration::from_millis(1100));

        prop_assert!(cache.get(&key).is_none(), "Entry should not be found after TTL expires");
    }
}

// == Scenario: ten cost-20 entries into a budget of 100 ==
#[test]
fn scenario_budget_of_five_entries() {
    let dropped = Arc::new(Mutex::new(Vec::<String>::new()));
    let log = Arc::clone(&dropped);
    let cache = LocalCache::new(TEST_NUM_COUNTERS, 100)
        .unwrap()
        .with_rejection_listener(Arc::new(move |key: &str, _cost: u64| {
            log.lock().push(key.to_string());
        }));

    let keys: Vec<String> = (0..10).map(|i| format!("entry-{i}")).collect();
    for key in &keys {
        cache.set(key, key.as_bytes().to_vec(), 20, Duration::ZERO).unwrap();
        assert!(cache.used_cost() <= 100);
    }

    let stats = cache.stats().unwrap();
    let dropped = dropped.lock().clone();
    assert!(!dropped.is_empty(), "some inserts should be dropped");
    assert_eq!(stats.evictions, dropped.len() as u64);
    assert!(stats.used_cost > 0 && stats.used_cost <= 100);
    assert_eq!(stats.used_cost, stats.total_entries * 20);

    for key in keys.iter().filter(|k| !dropped.contains(k)) {
        let value = cache.get(key).expect("retained entry should be retrievable");
        assert_eq!(&*value, key.as_bytes());
    }
}
