//! The owning record of a single key.
//!
//! An entry couples the immutable identity of a key (its bytes and the digest stored at
//! insertion) with its mutable value payload. The split matters for concurrency: chain
//! traversal compares identity only, which is immutable and therefore safe to read under the
//! bucket lock in either mode, while the payload is guarded by the entry's own mutex so that
//! readers of _distinct_ entries in one bucket never serialize against each other.
//!
//! The value mutex is the second level of the store's two-level locking: it is acquired only
//! inside a bucket critical section, and released before the bucket lock is. It exists because
//! same-size updates overwrite the buffer in place and because a read must observe a consistent
//! length-and-bytes pair; holding it for the duration of the byte copy rules out torn reads by
//! construction.

use parking_lot::Mutex;

/// The value payload of an entry.
#[derive(Debug)]
struct Value {
    /// The current buffer.
    ///
    /// `None` after a zero-length update. The distinction between "no buffer" and "absent key"
    /// is deliberate: a nulled value still occupies its entry, and reading it yields the empty
    /// buffer with success, not a missing-key report.
    buf: Option<Box<[u8]>>,
}

/// The owning record of one key.
///
/// Exactly one chain node owns any given entry; the entry dies when that node is unlinked. The
/// key bytes and the stored digest never change after construction (this is what permits
/// comparing them during traversal without taking the value mutex).
#[derive(Debug)]
pub struct Entry {
    /// The key bytes. Immutable.
    key: Box<[u8]>,
    /// The digest of the key, as computed at insertion. Immutable.
    hash: u32,
    /// The guarded value payload.
    value: Mutex<Value>,
}

impl Entry {
    /// Create an entry owning copies of `key` and `value`.
    pub fn new(key: &[u8], hash: u32, value: &[u8]) -> Entry {
        Entry {
            key: Box::from(key),
            hash,
            value: Mutex::new(Value {
                buf: Some(Box::from(value)),
            }),
        }
    }

    /// The key bytes.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The digest stored at insertion.
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Replace the value bytes.
    ///
    /// Three cases, in decreasing order of luck:
    ///
    /// 1. `new` is empty: the buffer is dropped and the value becomes the null payload.
    /// 2. `new` has the current length: the buffer is overwritten in place, no allocation.
    /// 3. otherwise: the buffer is reallocated to the new length.
    ///
    /// Must only be called inside the owning bucket's critical section.
    pub fn update(&self, new: &[u8]) {
        let mut value = self.value.lock();

        if new.is_empty() {
            value.buf = None;
            return;
        }

        match value.buf {
            // Same length: overwrite in place.
            Some(ref mut buf) if buf.len() == new.len() => buf.copy_from_slice(new),
            // Different length (or nulled): reallocate.
            _ => value.buf = Some(Box::from(new)),
        }
    }

    /// Copy the current value bytes out.
    ///
    /// The returned buffer is fresh and owned by the caller. A nulled payload reads as the
    /// empty buffer.
    ///
    /// Must only be called inside the owning bucket's critical section.
    pub fn read(&self) -> Vec<u8> {
        let value = self.value.lock();

        match value.buf {
            Some(ref buf) => buf.to_vec(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let entry = Entry::new(b"key", 0xfeed, b"value");

        assert_eq!(entry.key(), b"key");
        assert_eq!(entry.hash(), 0xfeed);
        assert_eq!(entry.read(), b"value");
    }

    #[test]
    fn same_size_update_overwrites() {
        let entry = Entry::new(b"k", 1, b"aaaa");

        entry.update(b"bbbb");
        assert_eq!(entry.read(), b"bbbb");
    }

    #[test]
    fn resizing_update_reallocates() {
        let entry = Entry::new(b"k", 1, b"short");

        entry.update(b"muchlongerdata");
        assert_eq!(entry.read(), b"muchlongerdata");

        entry.update(b"s");
        assert_eq!(entry.read(), b"s");
    }

    #[test]
    fn zero_length_update_nulls_the_buffer() {
        let entry = Entry::new(b"k", 1, b"data");

        entry.update(b"");
        // Reading the nulled payload succeeds and yields the empty buffer.
        assert_eq!(entry.read(), Vec::<u8>::new());

        // A later update revives the payload.
        entry.update(b"revived");
        assert_eq!(entry.read(), b"revived");
    }

    #[test]
    fn identity_survives_updates() {
        let entry = Entry::new(b"stable", 42, b"v1");

        entry.update(b"v2");
        entry.update(b"");
        assert_eq!(entry.key(), b"stable");
        assert_eq!(entry.hash(), 42);
    }

    #[test]
    fn binary_values() {
        let payload = [0x00, 0xff, 0x7e, 0x42, 0x00, 0x10];
        let entry = Entry::new(b"bin", 9, &payload);

        assert_eq!(entry.read(), payload);
    }
}
