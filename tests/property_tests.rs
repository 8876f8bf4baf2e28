use std::collections::HashMap;

use proptest::prelude::*;

use ringcache::{Cache, Error};

/// Operations the model-based test replays against both the cache and a
/// plain HashMap.
#[derive(Debug, Clone)]
enum Op {
    Set(u8, Vec<u8>),
    Del(u8),
    Get(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<u8>(), prop::collection::vec(any::<u8>(), 0..256)).prop_map(|(k, v)| Op::Set(k, v)),
        any::<u8>().prop_map(Op::Del),
        any::<u8>().prop_map(Op::Get),
    ]
}

fn key_bytes(id: u8) -> Vec<u8> {
    format!("key_{id}").into_bytes()
}

proptest! {
    // Set then immediate Get returns the exact bytes (or the set itself
    // reported NoSpace; never NotFound, never stale bytes).
    #[test]
    fn set_then_get_roundtrips(
        key in prop::collection::vec(any::<u8>(), 1..64),
        value in prop::collection::vec(any::<u8>(), 0..2048),
    ) {
        let cache = Cache::new(4 * 1024 * 1024);
        match cache.set(&key, &value, 0) {
            Ok(()) => prop_assert_eq!(cache.get(&key).unwrap(), value),
            Err(Error::NoSpace) => {}
            Err(e) => prop_assert!(false, "unexpected set error: {e}"),
        }
    }

    // A successful delete makes the key unobservable.
    #[test]
    fn del_then_get_is_not_found(
        key in prop::collection::vec(any::<u8>(), 1..64),
        value in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let cache = Cache::new(1024 * 1024);
        cache.set(&key, &value, 0).unwrap();
        prop_assert!(cache.del(&key));
        prop_assert_eq!(cache.get(&key), Err(Error::NotFound));
        prop_assert!(!cache.del(&key));
    }

    // Replay a random op sequence against a HashMap model. With a cache
    // far larger than the working set nothing is ever evicted, so the two
    // must agree exactly: every model entry is retrievable byte-for-byte,
    // the entry count matches, and the iterator yields the model's keys.
    #[test]
    fn agrees_with_a_map_model(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let cache = Cache::new(16 * 1024 * 1024);
        let mut model: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();

        for op in ops {
            match op {
                Op::Set(id, value) => {
                    cache.set(&key_bytes(id), &value, 0).unwrap();
                    model.insert(key_bytes(id), value);
                }
                Op::Del(id) => {
                    let existed = cache.del(&key_bytes(id));
                    prop_assert_eq!(existed, model.remove(&key_bytes(id)).is_some());
                }
                Op::Get(id) => match model.get(&key_bytes(id)) {
                    Some(value) => prop_assert_eq!(&cache.get(&key_bytes(id)).unwrap(), value),
                    None => prop_assert_eq!(cache.get(&key_bytes(id)), Err(Error::NotFound)),
                },
            }
        }

        prop_assert_eq!(cache.entry_count() as usize, model.len());
        let mut iterated: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
        for entry in cache.iter() {
            iterated.insert(entry.key, entry.value);
        }
        prop_assert_eq!(iterated, model);
    }

    // Overwrites of the same key always surface the latest value.
    #[test]
    fn last_write_wins(values in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 1..20)) {
        let cache = Cache::new(4 * 1024 * 1024);
        for value in &values {
            cache.set(b"contended", value, 0).unwrap();
        }
        prop_assert_eq!(&cache.get(b"contended").unwrap(), values.last().unwrap());
        prop_assert_eq!(cache.entry_count(), 1);
    }
}
