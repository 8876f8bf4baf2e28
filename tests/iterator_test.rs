use std::collections::HashMap;
use std::sync::Arc;

use ringcache::{Cache, CacheBuilder, MockTimer};

#[test]
fn iterator_yields_exactly_the_inserted_entries() {
    let cache = Cache::new(4 * 1024 * 1024);

    let mut expected = HashMap::new();
    for i in 0..100u32 {
        let key = format!("key_{i}");
        let value = format!("value_{i}");
        cache.set(key.as_bytes(), value.as_bytes(), 0).unwrap();
        expected.insert(key.into_bytes(), value.into_bytes());
    }

    let mut seen = HashMap::new();
    for entry in cache.iter() {
        assert!(
            seen.insert(entry.key, entry.value).is_none(),
            "iterator must not repeat a key"
        );
    }
    assert_eq!(seen, expected);
}

#[test]
fn entry_count_matches_iteration_after_churn() {
    let cache = Cache::new(4 * 1024 * 1024);

    for i in 0..300u32 {
        let key = format!("key_{i}");
        cache.set(key.as_bytes(), b"v", 0).unwrap();
    }
    for i in (0..300u32).step_by(3) {
        let key = format!("key_{i}");
        assert!(cache.del(key.as_bytes()));
    }

    let iterated = cache.iter().count() as u64;
    assert_eq!(iterated, cache.entry_count());
    assert_eq!(iterated, 200);
}

#[test]
fn every_iterated_entry_is_retrievable() {
    let cache = Cache::new(4 * 1024 * 1024);
    for i in 0..200u32 {
        let key = format!("key_{i}");
        let value = format!("value_{i}");
        cache.set(key.as_bytes(), value.as_bytes(), 0).unwrap();
    }

    for entry in &cache {
        assert_eq!(cache.get(&entry.key).unwrap(), entry.value);
    }
}

#[test]
fn iterator_skips_expired_entries() {
    let timer = Arc::new(MockTimer::new(100));
    let cache = CacheBuilder::new()
        .capacity(4 * 1024 * 1024)
        .timer(timer.clone())
        .build();

    cache.set(b"mayfly", b"1", 5).unwrap();
    cache.set(b"tortoise", b"2", 0).unwrap();

    timer.set(200);
    let entries: Vec<_> = cache.iter().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, b"tortoise");

    // skipping is passive: the expired entry is still accounted until a
    // get or eviction reclaims it
    assert_eq!(cache.entry_count(), 2);
}

#[test]
fn empty_cache_iterates_nothing() {
    let cache = Cache::new(1024 * 1024);
    assert_eq!(cache.iter().count(), 0);
}
