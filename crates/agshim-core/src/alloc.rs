//! Block allocation for records handed across the ABI boundary
//!
//! Every buffer the shim exposes to a caller (device arrays, display arrays,
//! property arrays) is a [`Block`] obtained from an [`Allocator`]. Blocks are
//! 8-byte aligned so any record layout can be viewed in place, and their
//! address stays fixed for the life of the block.

use std::cell::Cell;
use tracing::{trace, warn};

use crate::error::AllocError;

/// A zero-initialised, 8-byte aligned byte buffer with a stable address
#[derive(Debug)]
pub struct Block {
    words: Box<[u64]>,
    len: usize,
}

impl Block {
    /// Address of the first byte, as published to callers
    pub fn addr(&self) -> usize {
        self.words.as_ptr() as usize
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.words.as_ptr().cast()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr().cast()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.len]
    }
}

/// Source of caller-visible blocks
pub trait Allocator {
    /// Allocate `len` zeroed bytes
    fn allocate(&self, len: usize) -> Result<Block, AllocError>;

    /// Return a block obtained from [`Allocator::allocate`]
    fn release(&self, block: Block);

    /// Replace `block` with a larger copy of itself.
    ///
    /// On failure `block` is left exactly as it was.
    fn grow(&self, block: &mut Block, new_len: usize) -> Result<(), AllocError> {
        let mut grown = self.allocate(new_len)?;
        let keep = block.len().min(new_len);
        grown.as_bytes_mut()[..keep].copy_from_slice(&block.as_bytes()[..keep]);
        let old = std::mem::replace(block, grown);
        self.release(old);
        Ok(())
    }
}

/// Heap-backed allocator that reports exhaustion instead of aborting
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, len: usize) -> Result<Block, AllocError> {
        let words = len.div_ceil(8);
        let mut storage: Vec<u64> = Vec::new();
        if let Err(e) = storage.try_reserve_exact(words) {
            warn!(requested = len, error = %e, "Block allocation failed");
            return Err(AllocError { requested: len });
        }
        storage.resize(words, 0);
        Ok(Block {
            words: storage.into_boxed_slice(),
            len,
        })
    }

    fn release(&self, block: Block) {
        drop(block);
    }
}

/// Allocator that counts live blocks and can be told to fail.
///
/// Used to prove that teardown releases everything init allocated and that
/// failure paths unwind partial allocations.
#[derive(Debug, Default)]
pub struct TrackingAllocator {
    inner: SystemAllocator,
    live_blocks: Cell<usize>,
    live_bytes: Cell<usize>,
    total_allocations: Cell<usize>,
    remaining_successes: Cell<Option<usize>>,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the next `successes` allocations through, then fail every one after
    pub fn fail_after(&self, successes: usize) {
        self.remaining_successes.set(Some(successes));
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        self.remaining_successes.set(None);
    }

    pub fn live_blocks(&self) -> usize {
        self.live_blocks.get()
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.get()
    }

    pub fn total_allocations(&self) -> usize {
        self.total_allocations.get()
    }
}

impl Allocator for TrackingAllocator {
    fn allocate(&self, len: usize) -> Result<Block, AllocError> {
        if let Some(remaining) = self.remaining_successes.get() {
            if remaining == 0 {
                trace!(requested = len, "Injected allocation failure");
                return Err(AllocError { requested: len });
            }
            self.remaining_successes.set(Some(remaining - 1));
        }

        let block = self.inner.allocate(len)?;
        self.live_blocks.set(self.live_blocks.get() + 1);
        self.live_bytes.set(self.live_bytes.get() + len);
        self.total_allocations.set(self.total_allocations.get() + 1);
        Ok(block)
    }

    fn release(&self, block: Block) {
        self.live_blocks.set(self.live_blocks.get().saturating_sub(1));
        self.live_bytes.set(self.live_bytes.get().saturating_sub(block.len()));
        self.inner.release(block);
    }
}
