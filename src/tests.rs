//! Whole-store tests.
//!
//! Leaf components carry their own unit tests; this module exercises the assembled store:
//! argument rejection at the façade, per-key semantics, collision behavior, lifecycle resets,
//! and the multi-threaded spam scenarios the store was built for.

use std::sync::Arc;
use std::thread;

use crate::hash;
use crate::{Config, Error, Stats, Store};

/// A store with a pinned seed, so bucket placement is reproducible.
fn store(buckets: u32, pre_allocation: f64, concurrent: bool) -> Store {
    let mut config = Config::new(buckets);
    config.pre_allocation = pre_allocation;
    config.concurrent = concurrent;
    config.seed = Some(0x5eed_cafe);

    Store::new(config).unwrap()
}

#[test]
fn set_get_delete_roundtrip() {
    let store = store(8, 0.5, false);

    store.set(b"hello", b"world").unwrap();
    assert_eq!(store.get(b"hello").unwrap(), b"world");

    store.delete(b"hello").unwrap();
    assert_eq!(store.get(b"hello").unwrap_err(), Error::NotFound);
}

#[test]
fn missing_keys_after_init() {
    // Nothing was ever inserted, so every lookup must miss, in both init modes.
    for concurrent in [false, true] {
        let store = store(16, 0.5, concurrent);

        for key in [b"a" as &[u8], b"missing", b"0", b"\x00\x01"] {
            assert_eq!(store.get(key).unwrap_err(), Error::NotFound);
            assert_eq!(store.delete(key).unwrap_err(), Error::NotFound);
            assert!(!store.contains_key(key));
        }

        assert!(store.is_empty());
    }
}

#[test]
fn last_writer_wins() {
    let store = store(8, 0.5, false);

    store.set(b"k", b"v1").unwrap();
    store.set(b"k", b"v2").unwrap();

    assert_eq!(store.get(b"k").unwrap(), b"v2");
    assert_eq!(store.len(), 1);
}

#[test]
fn overwrite_with_different_sizes() {
    let store = store(8, 0.5, false);

    store.set(b"k", b"short").unwrap();
    store.set(b"k", b"muchlongerdata").unwrap();
    assert_eq!(store.get(b"k").unwrap(), b"muchlongerdata");

    store.set(b"k", b"s").unwrap();
    assert_eq!(store.get(b"k").unwrap(), b"s");

    // Same-size overwrite (the in-place path) is externally indistinguishable.
    store.set(b"k", b"x").unwrap();
    assert_eq!(store.get(b"k").unwrap(), b"x");
}

#[test]
fn binary_values_survive() {
    let store = store(8, 0.5, false);
    let payload = [0x00, 0xff, 0x7e, 0x42, 0x00, 0x10];

    store.set(b"bin", &payload).unwrap();
    assert_eq!(store.get(b"bin").unwrap(), payload);
}

#[test]
fn binary_keys_survive() {
    let store = store(8, 0.5, false);

    // Keys are byte strings; interior and trailing oddities are just bytes.
    store.set(&[0x01, 0x00, 0x02], b"a").unwrap();
    store.set(&[0x01, 0x00, 0x03], b"b").unwrap();

    assert_eq!(store.get(&[0x01, 0x00, 0x02]).unwrap(), b"a");
    assert_eq!(store.get(&[0x01, 0x00, 0x03]).unwrap(), b"b");
}

#[test]
fn collisions_by_construction() {
    // With two buckets, sixteen keys guarantee a bucket with at least two of them.
    let store = store(2, 0.5, false);

    let mut by_index: [Vec<String>; 2] = [Vec::new(), Vec::new()];
    for n in 0..16 {
        let key = format!("key{}", n);
        let index = hash::bucket_index(hash::hash(key.as_bytes(), store.seed()), 2);
        by_index[index].push(key);
    }

    let colliding = by_index.iter().find(|keys| keys.len() >= 2).unwrap();
    let (first, second) = (colliding[0].as_bytes(), colliding[1].as_bytes());

    store.set(first, b"first").unwrap();
    store.set(second, b"second").unwrap();

    // Both live in one chain; both are retrievable.
    assert_eq!(store.get(first).unwrap(), b"first");
    assert_eq!(store.get(second).unwrap(), b"second");

    // Removing one leaves the other.
    store.delete(first).unwrap();
    assert_eq!(store.get(first).unwrap_err(), Error::NotFound);
    assert_eq!(store.get(second).unwrap(), b"second");
}

#[test]
fn single_bucket_store() {
    // Everything collides structurally; the chain carries the whole store.
    let store = store(1, 1.0, false);

    for n in 0u32..64 {
        store
            .set(format!("key{}", n).as_bytes(), &n.to_le_bytes())
            .unwrap();
    }
    assert_eq!(store.len(), 64);

    for n in 0u32..64 {
        assert_eq!(
            store.get(format!("key{}", n).as_bytes()).unwrap(),
            n.to_le_bytes()
        );
    }

    for n in (0u32..64).step_by(2) {
        store.delete(format!("key{}", n).as_bytes()).unwrap();
    }
    assert_eq!(store.len(), 32);
    assert_eq!(store.get(b"key1").unwrap(), 1u32.to_le_bytes());
    assert_eq!(store.get(b"key2").unwrap_err(), Error::NotFound);
}

#[test]
fn rejects_bad_configurations() {
    assert_eq!(
        Store::new(Config::new(0)).unwrap_err().code(),
        Error::InvalidArgument("").code()
    );
    assert!(matches!(
        Store::new(Config::new(0)).unwrap_err(),
        Error::InvalidArgument(..)
    ));

    // Not a power of two is a config error, distinct from a plain bad argument.
    assert!(matches!(
        Store::new(Config::new(3)).unwrap_err(),
        Error::InvalidConfig(..)
    ));
    assert!(matches!(
        Store::new(Config::new(1000)).unwrap_err(),
        Error::InvalidConfig(..)
    ));

    let mut config = Config::new(8);
    config.pre_allocation = 1.5;
    assert!(matches!(
        Store::new(config).unwrap_err(),
        Error::InvalidArgument(..)
    ));

    let mut config = Config::new(8);
    config.pre_allocation = -0.1;
    assert!(matches!(
        Store::new(config).unwrap_err(),
        Error::InvalidArgument(..)
    ));

    let mut config = Config::new(8);
    config.pre_allocation = f64::NAN;
    assert!(matches!(
        Store::new(config).unwrap_err(),
        Error::InvalidArgument(..)
    ));
}

#[test]
fn rejects_bad_arguments() {
    let store = store(8, 0.5, false);

    assert!(matches!(
        store.set(b"", b"value").unwrap_err(),
        Error::InvalidArgument(..)
    ));
    assert!(matches!(
        store.set(b"key", b"").unwrap_err(),
        Error::InvalidArgument(..)
    ));
    assert!(matches!(
        store.get(b"").unwrap_err(),
        Error::InvalidArgument(..)
    ));
    assert!(matches!(
        store.delete(b"").unwrap_err(),
        Error::InvalidArgument(..)
    ));

    // Nothing slipped in through the rejected calls.
    assert!(store.is_empty());
}

#[test]
fn pre_allocation_extremes() {
    // Factor 0: no slab at all, every node from the general allocator. Factor 1: one block
    // per bucket. Behavior must be identical either way.
    for factor in [0.0, 1.0] {
        let store = store(8, factor, false);

        for n in 0u32..32 {
            store
                .set(format!("k{}", n).as_bytes(), format!("v{}", n).as_bytes())
                .unwrap();
        }
        for n in 0u32..32 {
            assert_eq!(
                store.get(format!("k{}", n).as_bytes()).unwrap(),
                format!("v{}", n).as_bytes()
            );
        }
        for n in 0u32..32 {
            store.delete(format!("k{}", n).as_bytes()).unwrap();
        }

        assert!(store.is_empty());
    }
}

#[test]
fn pool_churn_reuses_blocks() {
    // Repeated insert/delete cycles against a small slab: the free list and the fallback path
    // both get exercised, and nothing is lost.
    let store = store(4, 1.0, false);

    for round in 0..16 {
        for n in 0u32..10 {
            store
                .set(format!("r{}k{}", round, n).as_bytes(), b"payload")
                .unwrap();
        }
        for n in 0u32..10 {
            store.delete(format!("r{}k{}", round, n).as_bytes()).unwrap();
        }
    }

    assert!(store.is_empty());
}

#[test]
fn lifecycle_resets_state() {
    let first = store(8, 0.5, true);
    first.set(b"k", b"v").unwrap();
    assert_eq!(first.get(b"k").unwrap(), b"v");
    first.delete(b"k").unwrap();
    first.set(b"other", b"data").unwrap();
    drop(first);

    // A fresh store shares nothing with the dead one.
    let second = store(8, 0.5, true);
    assert_eq!(second.get(b"k").unwrap_err(), Error::NotFound);
    assert_eq!(second.get(b"other").unwrap_err(), Error::NotFound);
    assert!(second.is_empty());
}

#[test]
fn clear_empties_in_place() {
    let store = store(8, 0.5, true);

    for n in 0u32..20 {
        store.set(format!("k{}", n).as_bytes(), b"v").unwrap();
    }
    assert_eq!(store.len(), 20);

    store.clear();
    assert!(store.is_empty());
    assert_eq!(store.get(b"k0").unwrap_err(), Error::NotFound);

    // Clearing twice is fine, and the store remains usable.
    store.clear();
    store.set(b"k0", b"again").unwrap();
    assert_eq!(store.get(b"k0").unwrap(), b"again");
}

#[test]
fn introspection() {
    let store = store(16, 0.5, true);

    assert_eq!(store.buckets(), 16);
    assert_eq!(store.seed(), 0x5eed_cafe);
    assert!(store.is_concurrent());
    assert!(!self::store(16, 0.5, false).is_concurrent());

    store.set(b"k", b"v").unwrap();
    assert!(store.contains_key(b"k"));
    assert!(!store.contains_key(b"nope"));
    assert!(!store.contains_key(b""));
    assert_eq!(store.len(), 1);
}

#[test]
fn sampled_seeds_still_work() {
    // No pinned seed: the store samples one. Semantics are seed-independent.
    let store = Store::new(Config::new(8)).unwrap();

    store.set(b"hello", b"world").unwrap();
    assert_eq!(store.get(b"hello").unwrap(), b"world");
    store.delete(b"hello").unwrap();
    assert_eq!(store.get(b"hello").unwrap_err(), Error::NotFound);
}

#[test]
fn stats_accounting() {
    let stats = Arc::new(Stats::new());

    let mut config = Config::new(8);
    config.seed = Some(1);
    config.stats = Some(stats.clone());
    let store = Store::new(config).unwrap();

    store.set(b"k", b"v").unwrap();
    store.set(b"k", b"v2").unwrap();
    store.set(b"", b"v").unwrap_err();
    store.get(b"k").unwrap();
    store.get(b"missing").unwrap_err();
    store.delete(b"k").unwrap();
    store.delete(b"k").unwrap_err();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.set.total, 3);
    assert_eq!(snapshot.set.failed, 1);
    assert_eq!(snapshot.get.total, 2);
    assert_eq!(snapshot.get.failed, 1);
    assert_eq!(snapshot.delete.total, 2);
    assert_eq!(snapshot.delete.failed, 1);

    assert_eq!(stats.failures_of(&Error::NotFound), 2);
    assert_eq!(stats.failures_of(&Error::InvalidArgument("")), 1);
    assert_eq!(stats.failures_of(&Error::AllocFailure), 0);
}

#[test]
fn spam_set_then_get() {
    // Disjoint per-thread key spaces: every thread must observe its own writes, and after the
    // join the main thread must observe all of them.
    const THREADS: u32 = 16;
    const PAIRS: u32 = 500;

    let store = Arc::new(store(1024, 1.0, true));
    let mut joins = Vec::new();

    for t in 0..THREADS {
        let store = store.clone();
        joins.push(thread::spawn(move || {
            for n in t * PAIRS..(t + 1) * PAIRS {
                let key = format!("K{}", n);
                store.set(key.as_bytes(), &n.to_le_bytes()).unwrap();
                assert_eq!(store.get(key.as_bytes()).unwrap(), n.to_le_bytes());
            }
        }));
    }

    for join in joins {
        join.join().unwrap();
    }

    for n in 0..THREADS * PAIRS {
        assert_eq!(
            store.get(format!("K{}", n).as_bytes()).unwrap(),
            n.to_le_bytes()
        );
    }
    assert_eq!(store.len(), (THREADS * PAIRS) as usize);
}

#[test]
fn spam_mixed_churn() {
    // Each thread cycles its own keys through set/get/delete; the store must end empty.
    const THREADS: u32 = 8;
    const KEYS: u32 = 200;

    let store = Arc::new(store(64, 0.5, true));
    let mut joins = Vec::new();

    for t in 0..THREADS {
        let store = store.clone();
        joins.push(thread::spawn(move || {
            for round in 0..4u32 {
                for n in 0..KEYS {
                    let key = format!("T{}R{}K{}", t, round, n);
                    store.set(key.as_bytes(), b"payload").unwrap();
                }
                for n in 0..KEYS {
                    let key = format!("T{}R{}K{}", t, round, n);
                    assert_eq!(store.get(key.as_bytes()).unwrap(), b"payload");
                    store.delete(key.as_bytes()).unwrap();
                }
            }
        }));
    }

    for join in joins {
        join.join().unwrap();
    }

    assert!(store.is_empty());
}

#[test]
fn spam_compete_on_one_key() {
    // All threads hammer the same key. Updates serialize on the entry; the final value must be
    // one of the written values, never a torn mixture (lengths differ to make tearing visible).
    const THREADS: usize = 8;

    let store = Arc::new(store(8, 0.5, true));
    store.set(b"contended", b"initial").unwrap();

    let mut joins = Vec::new();
    for t in 0..THREADS {
        let store = store.clone();
        joins.push(thread::spawn(move || {
            let value = vec![t as u8; t + 1];
            for _ in 0..200 {
                store.set(b"contended", &value).unwrap();
                let read = store.get(b"contended").unwrap();

                // Whatever we read is some writer's complete value (or the seed value), never
                // a torn mixture.
                if read != b"initial" {
                    assert_eq!(read.len(), read[0] as usize + 1);
                    assert!(read.iter().all(|&byte| byte == read[0]));
                }
            }
        }));
    }

    for join in joins {
        join.join().unwrap();
    }

    let last = store.get(b"contended").unwrap();
    assert!(!last.is_empty());
}

#[test]
fn spam_readers_and_writers() {
    // Writers churn their own key ranges while readers sweep everything; readers must only
    // ever see complete values or clean misses.
    const WRITERS: u32 = 4;
    const READERS: u32 = 4;
    const KEYS: u32 = 100;

    let store = Arc::new(store(256, 0.5, true));
    let mut joins = Vec::new();

    for t in 0..WRITERS {
        let store = store.clone();
        joins.push(thread::spawn(move || {
            for round in 0..20u32 {
                for n in t * KEYS..(t + 1) * KEYS {
                    let key = format!("K{}", n);
                    let value = format!("value-{}-{}", n, round);
                    store.set(key.as_bytes(), value.as_bytes()).unwrap();
                }
            }
        }));
    }

    for _ in 0..READERS {
        let store = store.clone();
        joins.push(thread::spawn(move || {
            for _ in 0..20 {
                for n in 0..WRITERS * KEYS {
                    match store.get(format!("K{}", n).as_bytes()) {
                        Ok(value) => {
                            // A complete value from some round.
                            let text = String::from_utf8(value).unwrap();
                            assert!(text.starts_with(&format!("value-{}-", n)));
                        }
                        Err(Error::NotFound) => {}
                        Err(err) => panic!("unexpected error: {}", err),
                    }
                }
            }
        }));
    }

    for join in joins {
        join.join().unwrap();
    }

    // Every key ends at its final round.
    for n in 0..WRITERS * KEYS {
        let value = store.get(format!("K{}", n).as_bytes()).unwrap();
        assert_eq!(value, format!("value-{}-19", n).as_bytes());
    }
}

#[test]
#[ignore = "full-scale stress; run explicitly"]
fn stress_thousand_threads() {
    // The sizing scenario: a thousand threads, a thousand set-then-get pairs each, disjoint
    // key spaces, not one miss.
    const THREADS: u32 = 1000;
    const PAIRS: u32 = 1000;

    let store = Arc::new(store(1024, 1.0, true));
    let mut joins = Vec::new();

    for t in 0..THREADS {
        let store = store.clone();
        joins.push(thread::spawn(move || {
            for n in t * PAIRS..(t + 1) * PAIRS {
                let key = format!("K{}", n);
                store.set(key.as_bytes(), &n.to_le_bytes()).unwrap();
                assert_eq!(store.get(key.as_bytes()).unwrap(), n.to_le_bytes());
            }
        }));
    }

    for join in joins {
        join.join().unwrap();
    }

    for n in 0..THREADS * PAIRS {
        assert_eq!(
            store.get(format!("K{}", n).as_bytes()).unwrap(),
            n.to_le_bytes()
        );
    }
    assert_eq!(store.len(), (THREADS * PAIRS) as usize);
}
