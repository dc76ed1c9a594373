//! An embedded, concurrent, bucket-locked key-value store for binary blobs.
//!
//! This crate implements an in-process store mapping non-empty byte-string keys to arbitrary
//! binary values, built for the workload of thousands of OS threads issuing independent point
//! operations on largely disjoint key sets. It is a library and nothing else: no wire
//! protocol, no persistence, no iteration. A host constructs a [`Store`], calls
//! [`set`](`Store::set`), [`get`](`Store::get`), and [`delete`](`Store::delete`), and drops it.
//!
//! # Architecture
//!
//! The index is a fixed array of buckets (a power of two, so bucket selection is a mask over a
//! keyed MurmurHash3 digest), each bucket holding a singly-linked collision chain under its own
//! reader-writer lock. Locking is two-level: the bucket rwlock protects chain structure, and a
//! per-entry mutex protects the value payload, so readers of distinct keys in the same bucket
//! proceed in parallel while writers serialize only within their bucket. Chain nodes live in a
//! fixed-capacity slab pool with LIFO reuse and a general-allocator fallback, keeping node
//! churn off the global heap.
//!
//! There is deliberately no resizing and no cross-key atomicity; the bucket array is sized
//! once, at construction, and every guarantee the store makes is per key.
//!
//! # Example
//!
//! ```
//! use chstore::{Config, Store};
//!
//! let store = Store::new(Config::new(8)).unwrap();
//!
//! store.set(b"hello", b"world").unwrap();
//! assert_eq!(store.get(b"hello").unwrap(), b"world");
//!
//! store.delete(b"hello").unwrap();
//! assert!(store.get(b"hello").is_err());
//! ```

#[macro_use]
extern crate slog;
#[macro_use]
extern crate quick_error;

mod bucket;
mod chain;
mod entry;
mod error;
mod pool;
mod stats;
mod store;

pub mod hash;

#[cfg(test)]
mod tests;

pub use error::Error;
pub use stats::{OpSnapshot, Snapshot, Stats};
pub use store::{Config, Store};
