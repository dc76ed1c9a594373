//! Fixed-capacity pools of equally sized blocks.
//!
//! Chain nodes are small, hot, and churn heavily under delete-heavy workloads. Sending every
//! node through the general allocator would pay the full allocator cost per point operation and
//! scatter the nodes across the heap; a slab keeps them in one contiguous region instead. Each
//! pool carves its slab into `capacity` blocks of one fixed size and hands them out in O(1):
//! first from a LIFO free list of returned blocks, then from a bump cursor into the virgin part
//! of the slab, and only once both are exhausted from the general allocator.
//!
//! The pool is an allocator in the small: callers get a block from [`BlockPool::alloc`] and give
//! it back through [`BlockPool::free`], which dispatches on origin (an address-range plus
//! alignment test, constant time). Chain code is thereby oblivious to whether a given node is
//! pooled or heap-allocated.
//!
//! Pool state is mutated only inside bucket critical sections, so contention on the internal
//! mutex is bounded by bucket contention; the pool still carries its own lock so that its
//! correctness does not depend on that usage pattern. The lock order is strictly
//! {bucket rwlock → entry mutex → pool mutex}, and nothing is locked while a pool mutex is held.

use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::Error;

/// The backing slab of a pool.
#[derive(Debug)]
struct Slab {
    /// The first byte of the slab.
    ptr: NonNull<u8>,
    /// The layout the slab was allocated with.
    layout: Layout,
}

/// The mutable part of a pool.
#[derive(Debug)]
struct State {
    /// The number of blocks handed out through the bump cursor.
    ///
    /// This only ever advances. Returned blocks go on the free list and are reused before the
    /// cursor moves again.
    bump: usize,
    /// Returned slab blocks, reused LIFO.
    free: Vec<NonNull<u8>>,
}

/// A fixed-capacity pool of equally sized blocks.
///
/// Allocation order is: free list (LIFO), then bump cursor, then general allocator. Returned
/// blocks go back on the free list iff they were carved from the slab; anything else is handed
/// to the general allocator.
///
/// The pool never resizes. A pool of capacity 0 holds no slab and degrades to a plain wrapper
/// around the general allocator, which is also the behavior the store relies on when
/// pre-allocation is disabled.
#[derive(Debug)]
pub struct BlockPool {
    /// The layout of a single block.
    layout: Layout,
    /// The number of blocks the slab is carved into.
    capacity: usize,
    /// The slab, absent iff `capacity == 0`.
    slab: Option<Slab>,
    /// The bump cursor and the free list.
    state: Mutex<State>,
}

// SAFETY: The slab pointer is owned by the pool alone and all mutable state is behind the
// internal mutex. Blocks handed out by `alloc` are referenced by exactly one owner until they
// come back through `free`, so shared references to the pool never alias block memory.
unsafe impl Send for BlockPool {}
unsafe impl Sync for BlockPool {}

impl BlockPool {
    /// Create a pool of `capacity` blocks of layout `layout`.
    ///
    /// The slab is allocated eagerly. If the general allocator refuses it, `AllocFailure` is
    /// returned and no pool exists; the caller decides whether to abort initialization or to
    /// continue with a [disabled](`BlockPool::disabled`) pool.
    pub fn new(layout: Layout, capacity: usize) -> Result<BlockPool, Error> {
        debug_assert!(layout.size() != 0, "blocks must have a nonzero size");

        if capacity == 0 {
            // Pre-allocation is disabled; every allocation will fall back.
            return Ok(BlockPool::disabled(layout));
        }

        // The whole slab shares the block alignment, and block size is a multiple of block
        // alignment, so every carved block is properly aligned.
        let size = layout
            .size()
            .checked_mul(capacity)
            .ok_or(Error::AllocFailure)?;
        let slab_layout =
            Layout::from_size_align(size, layout.align()).map_err(|_| Error::AllocFailure)?;

        // SAFETY: `slab_layout` has nonzero size.
        let ptr = unsafe { alloc::alloc(slab_layout) };
        let ptr = NonNull::new(ptr).ok_or(Error::AllocFailure)?;

        Ok(BlockPool {
            layout,
            capacity,
            slab: Some(Slab {
                ptr,
                layout: slab_layout,
            }),
            state: Mutex::new(State {
                bump: 0,
                free: Vec::with_capacity(capacity),
            }),
        })
    }

    /// Create a pool without a slab.
    ///
    /// Every allocation falls back to the general allocator, and `free` hands every block
    /// straight back to it. This is the degenerate form used when pre-allocation is disabled
    /// and for the reserved tree-node pool.
    pub fn disabled(layout: Layout) -> BlockPool {
        BlockPool {
            layout,
            capacity: 0,
            slab: None,
            state: Mutex::new(State {
                bump: 0,
                free: Vec::new(),
            }),
        }
    }

    /// The size of one block, in bytes.
    pub fn block_size(&self) -> usize {
        self.layout.size()
    }

    /// The number of blocks the slab can provide.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take a block from the pool.
    ///
    /// Returned blocks are reused LIFO before the bump cursor advances; once the slab is
    /// exhausted, the block comes from the general allocator. The only failure is the general
    /// allocator itself returning nothing.
    pub fn alloc(&self) -> Result<NonNull<u8>, Error> {
        if let Some(ref slab) = self.slab {
            let mut state = self.state.lock();

            // Most recently returned block first.
            if let Some(block) = state.free.pop() {
                return Ok(block);
            }

            // No returned blocks; advance the bump cursor if the slab still has virgin blocks.
            if state.bump < self.capacity {
                let offset = state.bump * self.layout.size();
                state.bump += 1;

                // SAFETY: `state.bump <= capacity` keeps `offset` strictly inside the slab
                // allocation, so the sum neither overflows nor leaves the object; the result is
                // therefore non-null.
                return Ok(unsafe { NonNull::new_unchecked(slab.ptr.as_ptr().add(offset)) });
            }
        }

        // The slab is exhausted (or absent); fall back to the general allocator.
        //
        // SAFETY: `self.layout` has nonzero size.
        let ptr = unsafe { alloc::alloc(self.layout) };
        NonNull::new(ptr).ok_or(Error::AllocFailure)
    }

    /// Return a block.
    ///
    /// The block must originate from a prior [`alloc`](`BlockPool::alloc`) on this pool and
    /// must not be used afterwards. Slab blocks go on the free list; fallback blocks are handed
    /// back to the general allocator.
    pub fn free(&self, block: NonNull<u8>) {
        if self.is_pooled(block) {
            let mut state = self.state.lock();

            // At most `capacity` distinct blocks are ever carved from the slab, so a full free
            // list cannot receive another one; a failed push here would mean a double free.
            debug_assert!(
                state.free.len() < self.capacity,
                "a slab block was returned to a saturated free list"
            );
            if state.free.len() < self.capacity {
                state.free.push(block);
            }

            return;
        }

        // SAFETY: per the contract, a non-slab block came from the fallback path of `alloc`,
        // which used `self.layout`.
        unsafe { alloc::dealloc(block.as_ptr(), self.layout) }
    }

    /// Was the block carved from the slab?
    ///
    /// True iff the address lies within the slab and its offset from the slab start is a
    /// multiple of the block size.
    fn is_pooled(&self, block: NonNull<u8>) -> bool {
        let slab = match self.slab {
            Some(ref slab) => slab,
            None => return false,
        };

        let start = slab.ptr.as_ptr() as usize;
        let addr = block.as_ptr() as usize;
        let size = self.layout.size();

        addr >= start && addr < start + size * self.capacity && (addr - start) % size == 0
    }

    /// The current length of the free list. Test introspection only.
    #[cfg(test)]
    fn free_len(&self) -> usize {
        self.state.lock().free.len()
    }

    /// The current bump cursor. Test introspection only.
    #[cfg(test)]
    fn bump(&self) -> usize {
        self.state.lock().bump
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        // Only the slab itself is freed here. The store empties every bucket before the pools
        // die, so no pooled block is live at this point, and blocks from the fallback path were
        // already returned through `free`.
        if let Some(ref slab) = self.slab {
            // SAFETY: the slab was allocated in `new` with exactly this layout.
            unsafe { alloc::dealloc(slab.ptr.as_ptr(), slab.layout) }
        }
    }
}
