//! Singly-linked collision chains of pool-backed nodes.
//!
//! Every bucket resolves collisions through one of these chains. A node carries the digest
//! stored at insertion, owns exactly one [`Entry`], and links to the next node. New nodes are
//! prepended (recently inserted keys are the likeliest to be touched again), and lookups walk
//! the list linearly, comparing the cheap stored digest before the key bytes so that most
//! non-matching nodes are skipped without a byte comparison.
//!
//! Node memory comes from a [`BlockPool`] rather than from `Box`, which is the point of the
//! exercise: chains churn, and the pool keeps that churn away from the general allocator. The
//! price is that the list is wired with raw pointers and that every structural operation has to
//! say which pool it works against. The ownership rules stay strict regardless: a chain owns
//! its nodes, a node owns its entry, and both die together in [`Chain::remove`] or
//! [`Chain::clear`]. There is no shared ownership anywhere in the structure.

use std::ptr::{self, NonNull};
use std::alloc::Layout;

use crate::entry::Entry;
use crate::error::Error;
use crate::pool::BlockPool;

/// A chain node.
///
/// Lives in a block from the chain-node pool; never on the stack and never behind a `Box`.
#[derive(Debug)]
pub struct Node {
    /// The digest of the entry's key, as stored at insertion.
    ///
    /// A copy of `entry.hash()`, kept inline so traversal does not chase the entry pointer for
    /// non-matching nodes.
    hash: u32,
    /// The entry owned by this node.
    entry: Box<Entry>,
    /// The next node, or null at the end of the chain.
    next: *mut Node,
}

impl Node {
    /// The block layout chain nodes are allocated with.
    ///
    /// The chain-node pool must be constructed with exactly this layout.
    pub fn layout() -> Layout {
        Layout::new::<Node>()
    }

    /// Write a fresh node into a block from `pool`.
    ///
    /// On pool failure the entry is dropped and the error propagates; no state changes.
    fn allocate(pool: &BlockPool, hash: u32, entry: Box<Entry>) -> Result<NonNull<Node>, Error> {
        debug_assert_eq!(
            pool.block_size(),
            Node::layout().size(),
            "the pool's block layout must match the node layout"
        );
        debug_assert_eq!(
            entry.hash(),
            hash,
            "the node must cache the digest its entry stores"
        );

        let block = pool.alloc()?.cast::<Node>();

        // SAFETY: the block is fresh, properly sized and aligned for a `Node` (the pool was
        // constructed with `Node::layout`), and not aliased.
        unsafe {
            block.as_ptr().write(Node {
                hash,
                entry,
                next: ptr::null_mut(),
            });
        }

        Ok(block)
    }

    /// Tear a node down, returning its block to `pool` and its entry to the caller.
    ///
    /// The node must be unlinked and must have been produced by [`Node::allocate`] on a pool
    /// with the same block layout.
    fn release(node: NonNull<Node>, pool: &BlockPool) -> Box<Entry> {
        // SAFETY: the node was initialized by `allocate` and, being unlinked, has no remaining
        // referents; reading it out transfers ownership of the entry and leaves the block
        // uninitialized, which is exactly what the pool expects back.
        let Node { entry, .. } = unsafe { node.as_ptr().read() };

        pool.free(node.cast());
        entry
    }
}

/// A singly-linked collision chain.
///
/// The empty chain is a null head. Dropping a non-empty chain is a logic error (the nodes
/// cannot be returned without their pool); the owning bucket always calls [`Chain::clear`]
/// first.
#[derive(Debug)]
pub struct Chain {
    /// The first node, or null.
    head: *mut Node,
}

// SAFETY: Structural mutation (insert, remove, clear) requires `&mut Chain`, so shared
// references can only traverse and read the immutable identity fields of nodes; the mutable
// value payload behind those references is synchronized by each entry's own mutex.
unsafe impl Send for Chain {}
unsafe impl Sync for Chain {}

impl Chain {
    /// Create an empty chain.
    pub const fn new() -> Chain {
        Chain {
            head: ptr::null_mut(),
        }
    }

    /// Is the chain empty?
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Insert a new entry at the head of the chain.
    ///
    /// The caller guarantees that no entry with the same key exists in the chain (the bucket
    /// searches before inserting, under its write lock). On pool failure, the entry is dropped
    /// and the chain is untouched.
    pub fn insert(&mut self, pool: &BlockPool, hash: u32, entry: Box<Entry>) -> Result<(), Error> {
        let mut node = Node::allocate(pool, hash, entry)?;

        // Prepend: the new node takes over the head.
        //
        // SAFETY: `node` came initialized out of `allocate` and is exclusively ours until it is
        // linked in below.
        unsafe {
            node.as_mut().next = self.head;
        }
        self.head = node.as_ptr();

        Ok(())
    }

    /// Find the entry of `key`, if present.
    ///
    /// Digest first, key bytes only on digest match.
    pub fn find(&self, hash: u32, key: &[u8]) -> Option<&Entry> {
        let mut cursor = self.head;

        while !cursor.is_null() {
            // SAFETY: every reachable node is live; unlinking requires `&mut self`, which
            // cannot coexist with the `&self` we hold.
            let node = unsafe { &*cursor };

            if node.hash == hash && node.entry.key() == key {
                return Some(&node.entry);
            }

            cursor = node.next;
        }

        None
    }

    /// Unlink the entry of `key` and return it, if present.
    ///
    /// The node's block goes back to `pool`; the caller decides when the entry dies.
    pub fn remove(&mut self, hash: u32, key: &[u8], pool: &BlockPool) -> Option<Box<Entry>> {
        // Walk a pointer to the incoming link rather than a node cursor, so unlinking the match
        // is one store, with no special case for the head.
        let mut link: *mut *mut Node = &mut self.head;

        // SAFETY: `link` always points at a live link field (first the head, then `next` fields
        // of live nodes), and we hold `&mut self`, so no other reference observes the chain.
        unsafe {
            while !(*link).is_null() {
                let node = *link;

                if (*node).hash == hash && (*node).entry.key() == key {
                    *link = (*node).next;
                    return Some(Node::release(NonNull::new_unchecked(node), pool));
                }

                link = &mut (*node).next;
            }
        }

        None
    }

    /// Destroy every entry and return every node block to `pool`.
    ///
    /// Leaves the chain empty.
    pub fn clear(&mut self, pool: &BlockPool) {
        let mut cursor = self.head;
        self.head = ptr::null_mut();

        while let Some(node) = NonNull::new(cursor) {
            // SAFETY: the node is live and, with the head already nulled and `&mut self` held,
            // unreachable by anyone else.
            cursor = unsafe { node.as_ref().next };

            // Entry destruction happens here, after the node left the chain.
            drop(Node::release(node, pool));
        }
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        // Nodes cannot be freed without their pool; the owning bucket clears before dropping.
        debug_assert!(
            self.head.is_null(),
            "a chain was dropped while still holding nodes"
        );
    }
}
