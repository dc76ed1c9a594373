//! Buckets: one slot of the index, one reader-writer lock, one collision container.
//!
//! The bucket's rwlock protects chain _structure_: the head, the links, the live count. The
//! value _payload_ of an entry is protected one level down by the entry's own mutex. The split
//! is what buys concurrency: readers of distinct entries in the same bucket share the rwlock
//! and each take only their own entry's mutex, while structural writers (insert, remove) take
//! the rwlock exclusively but never need an entry mutex, since a node being inserted is not
//! yet visible and a node being removed is unlinked before its entry dies.
//!
//! The locking discipline, total and never reversed:
//!
//! 1. bucket rwlock (write for upsert/remove, read for lookup);
//! 2. entry mutex, only inside a bucket critical section, only around payload bytes;
//! 3. pool mutex, only inside a bucket write section, from node allocation or return.
//!
//! No operation holds one bucket's lock while touching another bucket, so cross-bucket
//! deadlock cannot arise.
//!
//! A bucket starts uninitialized. Concurrent stores ready every bucket at init, which removes
//! the first-touch race by fiat; single-threaded stores ready a bucket on its first write,
//! under the write lock. Reads of an uninitialized bucket report the key as absent, which is
//! the truth: nothing was ever written there.

use parking_lot::RwLock;

use crate::chain::Chain;
use crate::entry::Entry;
use crate::error::Error;
use crate::pool::BlockPool;

/// The collision container of an initialized bucket.
///
/// A tagged sum with a single active variant. An ordered-tree variant for degenerate chains is
/// reserved (its node pool already exists, at capacity zero), and so is
/// [`Error::UnsupportedContainer`] for the day a second variant makes non-exhaustive matches
/// possible; today the compiler discharges both.
#[derive(Debug)]
pub enum Container {
    /// A singly-linked collision chain.
    Chain(Chain),
}

/// The slot behind a bucket's rwlock.
#[derive(Debug)]
enum Slot {
    /// Never touched. Holds no keys.
    Uninit,
    /// Live.
    Ready {
        /// The collision container.
        container: Container,
        /// The number of live entries.
        len: usize,
    },
}

impl Slot {
    /// A fresh, empty, live slot.
    fn ready() -> Slot {
        Slot::Ready {
            container: Container::Chain(Chain::new()),
            len: 0,
        }
    }
}

/// The outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// No entry for the key existed; one was created.
    Inserted,
    /// An entry existed; its value was replaced.
    Updated,
}

/// One slot of the bucket array.
#[derive(Debug)]
pub struct Bucket {
    /// The slot, behind the structural lock.
    slot: RwLock<Slot>,
}

impl Bucket {
    /// Create an uninitialized bucket.
    pub fn new() -> Bucket {
        Bucket {
            slot: RwLock::new(Slot::Uninit),
        }
    }

    /// Eagerly ready the bucket.
    ///
    /// Concurrent stores call this for every bucket during init. Idempotent; never downgrades
    /// a live slot.
    pub fn init(&self) {
        let mut slot = self.slot.write();

        if let Slot::Uninit = *slot {
            *slot = Slot::ready();
        }
    }

    /// Insert or update the entry of `key`.
    ///
    /// Holds the write lock throughout. If an entry exists, its value is replaced under the
    /// entry mutex; otherwise a new entry and a new pool node are created and prepended. On
    /// pool failure the fresh entry is unwound and the bucket is left exactly as it was.
    pub fn upsert(
        &self,
        hash: u32,
        key: &[u8],
        value: &[u8],
        pool: &BlockPool,
    ) -> Result<Upsert, Error> {
        let mut slot = self.slot.write();

        // Lazily ready the bucket; we already hold exclusive access, so there is no race to
        // worry about in either mode.
        if let Slot::Uninit = *slot {
            *slot = Slot::ready();
        }

        match *slot {
            Slot::Ready {
                ref mut container,
                ref mut len,
            } => match *container {
                Container::Chain(ref mut chain) => {
                    if let Some(entry) = chain.find(hash, key) {
                        // The entry mutex is taken (and released) inside `update`, strictly
                        // within this write section.
                        entry.update(value);
                        Ok(Upsert::Updated)
                    } else {
                        let entry = Box::new(Entry::new(key, hash, value));
                        chain.insert(pool, hash, entry)?;
                        *len += 1;
                        Ok(Upsert::Inserted)
                    }
                }
            },
            // Readied above; if this fires, the slot was torn down under our write lock.
            Slot::Uninit => Err(Error::BucketUninitialized),
        }
    }

    /// Copy out the value of `key`.
    ///
    /// Holds the read lock throughout; takes the entry mutex only around the byte copy.
    pub fn find_copy(&self, hash: u32, key: &[u8]) -> Result<Vec<u8>, Error> {
        let slot = self.slot.read();

        match *slot {
            // Never written, so the key cannot be here.
            Slot::Uninit => Err(Error::NotFound),
            Slot::Ready { ref container, .. } => match *container {
                Container::Chain(ref chain) => match chain.find(hash, key) {
                    Some(entry) => Ok(entry.read()),
                    None => Err(Error::NotFound),
                },
            },
        }
    }

    /// Is `key` present?
    ///
    /// Like [`find_copy`](`Bucket::find_copy`), but without copying the payload out; the
    /// entry mutex is never taken, since identity fields suffice.
    pub fn contains(&self, hash: u32, key: &[u8]) -> bool {
        let slot = self.slot.read();

        match *slot {
            Slot::Uninit => false,
            Slot::Ready { ref container, .. } => match *container {
                Container::Chain(ref chain) => chain.find(hash, key).is_some(),
            },
        }
    }

    /// Remove the entry of `key`.
    ///
    /// Holds the write lock throughout. The entry is destroyed only after its node left the
    /// chain, and the node's block goes back to the pool before the count drops.
    pub fn remove(&self, hash: u32, key: &[u8], pool: &BlockPool) -> Result<(), Error> {
        let mut slot = self.slot.write();

        match *slot {
            // A bucket that was never initialized holds no keys: absent, not an error in the
            // bucket itself.
            Slot::Uninit => Err(Error::NotFound),
            Slot::Ready {
                ref mut container,
                ref mut len,
            } => match *container {
                Container::Chain(ref mut chain) => match chain.remove(hash, key, pool) {
                    Some(entry) => {
                        *len -= 1;
                        // The unlinked entry (value buffer and mutex included) dies here.
                        drop(entry);
                        Ok(())
                    }
                    None => Err(Error::NotFound),
                },
            },
        }
    }

    /// The number of live entries.
    pub fn len(&self) -> usize {
        match *self.slot.read() {
            Slot::Uninit => 0,
            Slot::Ready { len, .. } => len,
        }
    }

    /// Tear the bucket down: destroy every entry, return every node block to `pool`, and leave
    /// the bucket uninitialized.
    ///
    /// This is both the store-teardown path and the reset path; calling it twice is harmless.
    pub fn clear(&self, pool: &BlockPool) {
        let mut slot = self.slot.write();

        if let Slot::Ready {
            ref mut container, ..
        } = *slot
        {
            match *container {
                Container::Chain(ref mut chain) => {
                    chain.clear(pool);
                    debug_assert!(chain.is_empty());
                }
            }
        }

        *slot = Slot::Uninit;
    }
}
