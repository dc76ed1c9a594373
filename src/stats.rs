//! Operation statistics.
//!
//! An optional telemetry sink. Attached at init via `Arc`, it counts every public operation
//! (total and failed, per kind) and histograms failures by error kind. When no sink is
//! attached, the hot path does no statistics work at all; when one is, the cost is a couple of
//! relaxed atomic increments.
//!
//! The counters are a testable byproduct, not a load-bearing subsystem: nothing in the store
//! reads them back, and they deliberately have no consistency relationship with each other
//! beyond monotonicity.

use std::sync::atomic::{self, AtomicU64};

use crate::error::{self, Error};

/// The atomic ordering used for the counters.
///
/// They are independent monotone counters; nothing orders against them.
const ORDERING: atomic::Ordering = atomic::Ordering::Relaxed;

/// The kind of a public operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// An upsert.
    Set,
    /// A lookup.
    Get,
    /// A removal.
    Delete,
}

/// The counters of one operation kind.
#[derive(Default, Debug)]
struct OpCounters {
    /// Operations issued.
    total: AtomicU64,
    /// Operations that returned an error (`NotFound` included).
    failed: AtomicU64,
}

impl OpCounters {
    fn snapshot(&self) -> OpSnapshot {
        OpSnapshot {
            total: self.total.load(ORDERING),
            failed: self.failed.load(ORDERING),
        }
    }
}

/// A telemetry sink for store operations.
#[derive(Default, Debug)]
pub struct Stats {
    set: OpCounters,
    get: OpCounters,
    delete: OpCounters,
    /// Failure histogram, one slot per error kind.
    errors: [AtomicU64; error::KIND_COUNT],
}

impl Stats {
    /// Create a sink with all counters at zero.
    pub fn new() -> Stats {
        Stats::default()
    }

    /// Record the outcome of one operation.
    pub(crate) fn record(&self, op: OpKind, err: Option<&Error>) {
        let counters = match op {
            OpKind::Set => &self.set,
            OpKind::Get => &self.get,
            OpKind::Delete => &self.delete,
        };

        counters.total.fetch_add(1, ORDERING);

        if let Some(err) = err {
            counters.failed.fetch_add(1, ORDERING);
            self.errors[err.kind_index()].fetch_add(1, ORDERING);
        }
    }

    /// How often has `err`'s kind been observed?
    ///
    /// The payload of `err` is ignored; only the kind selects the histogram slot.
    pub fn failures_of(&self, err: &Error) -> u64 {
        self.errors[err.kind_index()].load(ORDERING)
    }

    /// A point-in-time copy of the per-operation counters.
    ///
    /// The copy is not atomic across counters; concurrent operations may straddle it. Each
    /// individual counter is exact.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            set: self.set.snapshot(),
            get: self.get.snapshot(),
            delete: self.delete.snapshot(),
        }
    }
}

/// A point-in-time copy of the counters of one operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSnapshot {
    /// Operations issued.
    pub total: u64,
    /// Operations that returned an error.
    pub failed: u64,
}

/// A point-in-time copy of the per-operation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Upserts.
    pub set: OpSnapshot,
    /// Lookups.
    pub get: OpSnapshot,
    /// Removals.
    pub delete: OpSnapshot,
}
