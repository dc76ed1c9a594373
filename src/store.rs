//! The store façade.
//!
//! A [`Store`] owns the fixed bucket array, the hash seed, and the block pools, and exposes the
//! three point operations. It is an explicitly constructed value, not process-wide state: a
//! host embeds as many independent stores as it likes, hands out `Arc<Store>` (or plain
//! references) to its worker threads, and tears a store down by dropping it.
//!
//! Every operation is one hash, one mask, and one excursion into a single bucket. The façade
//! itself holds no locks and keeps no mutable state; all synchronization lives in the buckets,
//! the entries, and the pools. That is also why no operation here can deadlock another: the
//! façade never touches two buckets in one call.

use std::sync::Arc;

use slog::{Discard, Logger};

use crate::bucket::{Bucket, Upsert};
use crate::chain::Node;
use crate::error::Error;
use crate::hash;
use crate::pool::BlockPool;
use crate::stats::{OpKind, Stats};

/// The default number of buckets.
const DEFAULT_BUCKETS: u32 = 1024;
/// The default pre-allocation factor.
const DEFAULT_PRE_ALLOCATION: f64 = 0.5;

/// Store configuration.
///
/// Plain data; construct one, adjust the fields you care about, and hand it to
/// [`Store::new`].
#[derive(Clone)]
pub struct Config {
    /// The number of buckets. A power of two, at least one. Fixed for the store's lifetime;
    /// there is no resizing.
    pub buckets: u32,
    /// The fraction of buckets to back with pre-allocated chain-node blocks, in `[0, 1]`.
    ///
    /// `0.0` disables the slab entirely (every node comes from the general allocator); `1.0`
    /// reserves one node block per bucket.
    pub pre_allocation: f64,
    /// Will the store be shared across threads?
    ///
    /// Concurrent stores ready every bucket during init, eliminating the first-touch race;
    /// single-threaded stores ready buckets lazily on first write. Fixed at init.
    pub concurrent: bool,
    /// The hash seed. `None` samples one; pin it for reproducible bucket placement in tests.
    pub seed: Option<u32>,
    /// The telemetry sink, if any. Absent means zero statistics work on the hot path.
    pub stats: Option<Arc<Stats>>,
    /// The logger. `None` discards.
    pub logger: Option<Logger>,
}

impl Config {
    /// A configuration with `buckets` buckets and the defaults everywhere else: half
    /// pre-allocation, concurrent, sampled seed, no statistics, discarded logs.
    pub fn new(buckets: u32) -> Config {
        Config {
            buckets,
            pre_allocation: DEFAULT_PRE_ALLOCATION,
            concurrent: true,
            seed: None,
            stats: None,
            logger: None,
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new(DEFAULT_BUCKETS)
    }
}

/// An embedded, concurrent, bucket-locked key-value store.
///
/// Keys are non-empty byte strings; values are arbitrary non-empty binary blobs (a value may
/// transiently become empty through an in-place zero-length update at the entry layer, but
/// `set` itself rejects empty values). Point operations are linearizable per key; operations
/// on distinct keys order only through their lock acquisitions, and there are no cross-key
/// transactions.
#[derive(Debug)]
pub struct Store {
    /// The bucket array. Fixed size, never reallocated.
    buckets: Box<[Bucket]>,
    /// The seed every key digest is computed under.
    seed: u32,
    /// Whether the buckets were readied eagerly at init.
    concurrent: bool,
    /// The pool backing chain nodes.
    node_pool: BlockPool,
    /// Reserved for the ordered-tree container variant; carried at zero capacity.
    tree_pool: BlockPool,
    /// The telemetry sink, if any.
    stats: Option<Arc<Stats>>,
    /// The logger.
    log: Logger,
}

impl Store {
    /// Create a store from `config`.
    ///
    /// Validates the configuration, allocates the pools and the bucket array, readies every
    /// bucket if the store is concurrent, and samples the hash seed if none was pinned.
    pub fn new(config: Config) -> Result<Store, Error> {
        if config.buckets == 0 {
            return Err(Error::InvalidArgument("the bucket count is zero"));
        }
        if !config.buckets.is_power_of_two() {
            return Err(Error::InvalidConfig("the bucket count is not a power of two"));
        }
        // NaN fails every comparison, so test the complement.
        if !(config.pre_allocation >= 0.0 && config.pre_allocation <= 1.0) {
            return Err(Error::InvalidArgument(
                "the pre-allocation factor is outside [0, 1]",
            ));
        }

        let log = config.logger.unwrap_or_else(|| Logger::root(Discard, o!()));

        // The seed need not be unpredictable (the store is not exposed to adversarial keys);
        // it only decorrelates bucket placement across store instances.
        let seed = config.seed.unwrap_or_else(rand::random);

        // One node block per `pre_allocation` buckets, rounded up.
        let capacity = (f64::from(config.buckets) * config.pre_allocation).ceil() as usize;
        let node_pool = BlockPool::new(Node::layout(), capacity)?;
        // The tree container is reserved; its pool exists so teardown and accounting already
        // treat the two container kinds uniformly, but it never holds a slab.
        let tree_pool = BlockPool::disabled(Node::layout());

        let mut buckets = Vec::with_capacity(config.buckets as usize);
        for _ in 0..config.buckets {
            buckets.push(Bucket::new());
        }

        let store = Store {
            buckets: buckets.into_boxed_slice(),
            seed,
            concurrent: config.concurrent,
            node_pool,
            tree_pool,
            stats: config.stats,
            log,
        };

        if store.concurrent {
            // Ready every bucket up front. Lazy init under load would make the first touch of
            // each bucket a race; paying the initialization at a point where no other thread
            // can hold the store removes the hazard outright.
            for bucket in store.buckets.iter() {
                bucket.init();
            }
        }

        debug!(store.log, "store initialized";
               "buckets" => config.buckets,
               "node pool capacity" => store.node_pool.capacity(),
               "tree pool capacity" => store.tree_pool.capacity(),
               "concurrent" => store.concurrent);

        Ok(store)
    }

    /// Insert or update the value of `key`.
    ///
    /// Upsert semantics: creates the entry if absent, replaces its value in place if present.
    /// Empty keys and empty values are rejected.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let res = self.set_inner(key, value);
        self.record(OpKind::Set, res)
    }

    fn set_inner(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        check_key(key)?;
        if value.is_empty() {
            return Err(Error::InvalidArgument("the value is empty"));
        }

        let (hash, bucket) = self.locate(key);
        let outcome = match bucket.upsert(hash, key, value, &self.node_pool)? {
            Upsert::Inserted => "inserted",
            Upsert::Updated => "updated",
        };

        trace!(self.log, "set";
               "hash" => hash,
               "value length" => value.len(),
               "outcome" => outcome);

        Ok(())
    }

    /// Copy out the value of `key`.
    ///
    /// The returned buffer is freshly allocated and owned by the caller. An absent key is
    /// [`Error::NotFound`].
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, Error> {
        let res = self.get_inner(key);
        self.record(OpKind::Get, res)
    }

    fn get_inner(&self, key: &[u8]) -> Result<Vec<u8>, Error> {
        check_key(key)?;

        let (hash, bucket) = self.locate(key);
        let value = bucket.find_copy(hash, key)?;

        trace!(self.log, "get"; "hash" => hash, "value length" => value.len());

        Ok(value)
    }

    /// Remove the entry of `key`.
    ///
    /// An absent key is [`Error::NotFound`].
    pub fn delete(&self, key: &[u8]) -> Result<(), Error> {
        let res = self.delete_inner(key);
        self.record(OpKind::Delete, res)
    }

    fn delete_inner(&self, key: &[u8]) -> Result<(), Error> {
        check_key(key)?;

        let (hash, bucket) = self.locate(key);
        bucket.remove(hash, key, &self.node_pool)?;

        trace!(self.log, "delete"; "hash" => hash);

        Ok(())
    }

    /// Is `key` present?
    ///
    /// Cheaper than [`get`](`Store::get`): the value bytes are never copied and the entry
    /// mutex is never taken. An empty key is simply absent.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        if key.is_empty() {
            return false;
        }

        let (hash, bucket) = self.locate(key);
        bucket.contains(hash, key)
    }

    /// The number of live entries.
    ///
    /// Sums the per-bucket counts, taking one bucket lock at a time; the result is a snapshot,
    /// exact only while no writer runs.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    /// Is the store empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of buckets.
    pub fn buckets(&self) -> usize {
        self.buckets.len()
    }

    /// The seed key digests are computed under.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Was the store configured for concurrent use?
    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    /// Remove every entry, returning all chain-node blocks to the pool.
    ///
    /// Buckets revert to uninitialized; a concurrent store re-readies them lazily on the next
    /// write, under their write locks. Idempotent.
    pub fn clear(&self) {
        for bucket in self.buckets.iter() {
            bucket.clear(&self.node_pool);
        }

        debug!(self.log, "store cleared");
    }

    /// Hash `key` and resolve its bucket.
    fn locate(&self, key: &[u8]) -> (u32, &Bucket) {
        let hash = hash::hash(key, self.seed);
        let index = hash::bucket_index(hash, self.buckets.len() as u32);

        (hash, &self.buckets[index])
    }

    /// Pass an outcome to the telemetry sink, if one is attached.
    fn record<T>(&self, op: OpKind, res: Result<T, Error>) -> Result<T, Error> {
        if let Some(ref stats) = self.stats {
            stats.record(op, res.as_ref().err());
        }

        res
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Buckets die first: clearing them destroys every entry and returns every node block
        // (pooled or fallback) through the pool, so the pools can then free their slabs with
        // nothing live inside. Ownership makes a second teardown unrepresentable.
        self.clear();

        debug!(self.log, "store torn down");
    }
}

/// Validate a key at the façade edge.
///
/// The hasher is total, so this is the only place key shape is checked; nothing downstream
/// re-validates.
fn check_key(key: &[u8]) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("the key is empty"));
    }

    Ok(())
}
