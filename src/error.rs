//! The error taxonomy of the store.
//!
//! Every public operation reports failure through [`Error`]. The variants are deliberately
//! fine-grained: callers (and the statistics sink) care about the _distinction_ between, say, a
//! rejected argument and a missing key, not about the precise wording. The numeric mapping in
//! [`Error::code`] exists for parity with embedders that speak negative integer codes.
//!
//! A few variants cannot currently be produced: the locking primitives this crate uses do not
//! fail, and the hasher is total. They stay in the taxonomy so that swapping in a fallible lock
//! or hasher implementation does not change the public surface.

/// The number of error kinds.
///
/// This is the length of the per-kind histogram kept by the statistics sink.
pub(crate) const KIND_COUNT: usize = 10;

quick_error! {
    /// A store operation error.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Error {
        /// An argument was rejected before it reached the index.
        ///
        /// Empty keys, empty values on `set`, a zero bucket count, and out-of-range
        /// pre-allocation factors all land here.
        InvalidArgument(what: &'static str) {
            display("Invalid argument: {}.", what)
        }
        /// The configuration is structurally invalid.
        ///
        /// The only current producer is a bucket count which is not a power of two.
        InvalidConfig(what: &'static str) {
            display("Invalid configuration: {}.", what)
        }
        /// The general allocator returned nothing.
        AllocFailure {
            display("The general allocator returned nothing.")
        }
        /// A synchronization primitive could not be created.
        LockInit {
            display("Failed to initialize a lock.")
        }
        /// A synchronization primitive could not be acquired.
        LockAcquire {
            display("Failed to acquire a lock.")
        }
        /// A synchronization primitive could not be released.
        LockRelease {
            display("Failed to release a lock.")
        }
        /// A bucket index is valid, but its bucket has not been (and cannot be) initialized.
        BucketUninitialized {
            display("The addressed bucket is not initialized.")
        }
        /// The key is not present in the store.
        NotFound {
            display("The key is not present in the store.")
        }
        /// A bucket's container discriminant names no known container variant.
        UnsupportedContainer {
            display("The bucket holds an unsupported container variant.")
        }
        /// The hasher failed to produce a digest.
        ///
        /// Reserved for non-pure hasher implementations.
        HashFailure {
            display("The hasher failed to produce a digest.")
        }
    }
}

impl Error {
    /// The negative integer code of this error kind.
    ///
    /// The mapping is stable and mirrors the codes embedders of the original interface expect.
    pub fn code(&self) -> i32 {
        match *self {
            Error::AllocFailure => -10,
            Error::LockInit => -11,
            Error::InvalidArgument(..) => -20,
            Error::InvalidConfig(..) => -21,
            Error::LockAcquire => -30,
            Error::LockRelease => -31,
            Error::BucketUninitialized => -40,
            Error::NotFound => -41,
            Error::UnsupportedContainer => -50,
            Error::HashFailure => -70,
        }
    }

    /// The histogram slot of this error kind.
    ///
    /// Two errors share a slot iff they are the same kind, regardless of payload.
    pub(crate) fn kind_index(&self) -> usize {
        match *self {
            Error::InvalidArgument(..) => 0,
            Error::InvalidConfig(..) => 1,
            Error::AllocFailure => 2,
            Error::LockInit => 3,
            Error::LockAcquire => 4,
            Error::LockRelease => 5,
            Error::BucketUninitialized => 6,
            Error::NotFound => 7,
            Error::UnsupportedContainer => 8,
            Error::HashFailure => 9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_per_kind() {
        let kinds = [
            Error::InvalidArgument("x"),
            Error::InvalidConfig("x"),
            Error::AllocFailure,
            Error::LockInit,
            Error::LockAcquire,
            Error::LockRelease,
            Error::BucketUninitialized,
            Error::NotFound,
            Error::UnsupportedContainer,
            Error::HashFailure,
        ];

        for (n, a) in kinds.iter().enumerate() {
            // The histogram slots enumerate the kinds in order.
            assert_eq!(a.kind_index(), n);
            assert!(a.kind_index() < KIND_COUNT);

            for b in &kinds[n + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn representative_codes() {
        assert_eq!(Error::AllocFailure.code(), -10);
        assert_eq!(Error::InvalidArgument("the key is empty").code(), -20);
        assert_eq!(Error::InvalidConfig("not a power of two").code(), -21);
        assert_eq!(Error::NotFound.code(), -41);
    }
}
