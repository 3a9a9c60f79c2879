//! Fixed-size block pooling.
//!
//! Provides fixed-size block allocation without per-receive malloc overhead.
//! A `BlockAllocator` is a cheap handle over a shared free list, so many
//! connections negotiating the same MTU draw from one pool. Blocks are
//! returned by dropping the `Block` handle; a block cannot be freed twice.

use crate::error::{NetError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

struct AllocatorInner {
    /// Stack of idle blocks (LIFO for cache locality).
    free_list: Mutex<Vec<Box<[u8]>>>,
    /// Size of each block.
    block_size: usize,
    /// Upper bound on blocks alive at once (idle + handed out).
    max_blocks: Option<usize>,
    /// Blocks ever created and not yet discarded.
    created: AtomicUsize,
    /// Blocks currently handed out.
    outstanding: AtomicUsize,
}

/// Thread-safe pool of equally-sized byte blocks.
#[derive(Clone)]
pub struct BlockAllocator {
    inner: Arc<AllocatorInner>,
}

impl BlockAllocator {
    /// Create an unbounded allocator that grows on demand.
    pub fn new(block_size: usize) -> Self {
        Self::with_limit(block_size, None)
    }

    /// Create an allocator that refuses to hold more than `max_blocks` blocks.
    pub fn with_limit(block_size: usize, max_blocks: Option<usize>) -> Self {
        Self {
            inner: Arc::new(AllocatorInner {
                free_list: Mutex::new(Vec::new()),
                block_size,
                max_blocks,
                created: AtomicUsize::new(0),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Create an allocator with `count` blocks ready on the free list.
    ///
    /// `count` also becomes the block cap.
    pub fn preallocated(count: usize, block_size: usize) -> Result<Self> {
        let allocator = Self::with_limit(block_size, Some(count));
        {
            let mut free_list = allocator.inner.free_list.lock();
            for _ in 0..count {
                free_list.push(zeroed_block(block_size)?);
            }
        }
        allocator.inner.created.store(count, Ordering::Relaxed);
        Ok(allocator)
    }

    /// Hand out a block of exactly `block_size` bytes.
    ///
    /// Returns `OutOfResources` if the pool is at its cap or the backing
    /// allocation fails.
    pub fn allocate(&self) -> Result<Block> {
        let reused = self.inner.free_list.lock().pop();
        let data = match reused {
            Some(data) => data,
            None => self.grow()?,
        };
        self.inner.outstanding.fetch_add(1, Ordering::Relaxed);
        Ok(Block {
            data,
            origin: self.clone(),
        })
    }

    fn grow(&self) -> Result<Box<[u8]>> {
        let inner = &self.inner;
        let reserved = inner
            .created
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |created| {
                match inner.max_blocks {
                    Some(max) if created >= max => None,
                    _ => Some(created + 1),
                }
            });
        if reserved.is_err() {
            return Err(NetError::OutOfResources(format!(
                "block pool of {} byte blocks exhausted",
                inner.block_size
            )));
        }
        match zeroed_block(inner.block_size) {
            Ok(data) => {
                trace!(block_size = inner.block_size, "grew block pool");
                Ok(data)
            }
            Err(e) => {
                inner.created.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    fn release(&self, data: Box<[u8]>) {
        debug_assert_eq!(data.len(), self.inner.block_size, "foreign block returned");
        self.inner.outstanding.fetch_sub(1, Ordering::Relaxed);
        self.inner.free_list.lock().push(data);
    }

    /// Get the size of each block.
    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    /// Get the number of idle blocks on the free list.
    pub fn available(&self) -> usize {
        self.inner.free_list.lock().len()
    }

    /// Get the number of blocks currently handed out.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Relaxed)
    }

    /// Get the block cap, if any.
    pub fn max_blocks(&self) -> Option<usize> {
        self.inner.max_blocks
    }

    /// True if both handles share one pool.
    pub fn same_pool(&self, other: &BlockAllocator) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for BlockAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockAllocator")
            .field("block_size", &self.inner.block_size)
            .field("max_blocks", &self.inner.max_blocks)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

fn zeroed_block(size: usize) -> Result<Box<[u8]>> {
    let mut data = Vec::new();
    data.try_reserve_exact(size).map_err(|e| {
        NetError::OutOfResources(format!("cannot allocate {size} byte block: {e}"))
    })?;
    data.resize(size, 0);
    Ok(data.into_boxed_slice())
}

/// A block checked out of a `BlockAllocator`.
///
/// Dropping the block returns it to its pool.
pub struct Block {
    data: Box<[u8]>,
    origin: BlockAllocator,
}

impl Block {
    /// The allocator this block goes back to.
    pub fn origin(&self) -> &BlockAllocator {
        &self.origin
    }
}

impl Deref for Block {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for Block {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.origin.release(data);
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block").field("len", &self.data.len()).finish()
    }
}

/// Registry of block allocators keyed by block size.
///
/// Passed explicitly to every factory that pools; factories negotiating the
/// same MTU end up sharing one allocator.
#[derive(Clone, Default)]
pub struct BlockPools {
    pools: Arc<Mutex<HashMap<usize, BlockAllocator>>>,
    max_blocks: Option<usize>,
}

impl BlockPools {
    /// Create an empty registry whose allocators grow without bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry whose allocators each cap at `max_blocks`.
    pub fn with_limit(max_blocks: Option<usize>) -> Self {
        Self {
            pools: Arc::default(),
            max_blocks,
        }
    }

    /// Get the allocator for `block_size`, creating it on first use.
    pub fn allocator_for(&self, block_size: usize) -> BlockAllocator {
        let mut pools = self.pools.lock();
        pools
            .entry(block_size)
            .or_insert_with(|| {
                debug!(block_size, max_blocks = ?self.max_blocks, "creating block allocator");
                BlockAllocator::with_limit(block_size, self.max_blocks)
            })
            .clone()
    }

    /// Number of distinct block sizes in use.
    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    /// Check if no allocator has been created yet.
    pub fn is_empty(&self) -> bool {
        self.pools.lock().is_empty()
    }
}

impl std::fmt::Debug for BlockPools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sizes: Vec<usize> = self.pools.lock().keys().copied().collect();
        f.debug_struct("BlockPools")
            .field("block_sizes", &sizes)
            .field("max_blocks", &self.max_blocks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_allocator_basic() {
        let pool = BlockAllocator::preallocated(4, 1024).unwrap();

        assert_eq!(pool.max_blocks(), Some(4));
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.block_size(), 1024);

        // Allocate all blocks
        let b0 = pool.allocate().unwrap();
        let b1 = pool.allocate().unwrap();
        let b2 = pool.allocate().unwrap();
        let b3 = pool.allocate().unwrap();

        assert_eq!(pool.available(), 0);
        assert_eq!(pool.outstanding(), 4);
        assert!(matches!(pool.allocate(), Err(NetError::OutOfResources(_))));

        // Free and reallocate
        let ptr = b1.as_ptr();
        drop(b1);
        assert_eq!(pool.available(), 1);

        let b4 = pool.allocate().unwrap();
        assert_eq!(b4.as_ptr(), ptr); // LIFO reuse

        drop((b0, b2, b3, b4));
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_blocks_have_configured_size() {
        let pool = BlockAllocator::new(96);
        let mut block = pool.allocate().unwrap();
        assert_eq!(block.len(), 96);
        block[95] = 7;
        drop(block);

        let block = pool.allocate().unwrap();
        assert_eq!(block.len(), 96);
        assert!(block.origin().same_pool(&pool));
    }

    #[test]
    fn test_limit_counts_outstanding_blocks() {
        let pool = BlockAllocator::with_limit(16, Some(2));
        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();
        assert!(pool.allocate().is_err());

        drop(a);
        assert!(pool.allocate().is_ok());
    }

    #[test]
    fn test_concurrent_allocate_free() {
        let pool = BlockAllocator::with_limit(64, Some(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let mut block = pool.allocate().unwrap();
                        block[0] = i as u8;
                        assert_eq!(block[0], i as u8);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.outstanding(), 0);
        assert!(pool.available() <= 8);
    }

    #[test]
    fn test_pools_share_by_size() {
        let pools = BlockPools::new();
        assert!(pools.is_empty());

        let a = pools.allocator_for(1500);
        let b = pools.allocator_for(1500);
        let c = pools.allocator_for(9000);

        assert!(a.same_pool(&b));
        assert!(!a.same_pool(&c));
        assert_eq!(pools.len(), 2);
    }
}
