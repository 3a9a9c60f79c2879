//! Buffer construction policy.
//!
//! The factory decides, per physical receive, whether a buffer comes from a
//! block pool (MTU negotiated) or is an exact-size independent allocation
//! (MTU of zero). The construction itself is delegated to a
//! `BufferStrategy` so drivers with special memory needs can override it.

use crate::error::{NetError, Result};
use crate::input::allocator::{BlockAllocator, BlockPools};
use crate::input::buffer::{OwnedBuffer, ReceiveBuffer};
use std::sync::Arc;
use tracing::debug;

/// How a buffer of `total` valid bytes is built.
pub trait BufferStrategy: Send + Sync {
    /// Build a buffer, drawing from `allocator` when one is given.
    fn create(&self, total: usize, allocator: Option<&BlockAllocator>) -> Result<OwnedBuffer>;
}

/// Pool-backed when an allocator is present, exact-size heap otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultStrategy;

impl BufferStrategy for DefaultStrategy {
    fn create(&self, total: usize, allocator: Option<&BlockAllocator>) -> Result<OwnedBuffer> {
        match allocator {
            Some(allocator) => {
                if total > allocator.block_size() {
                    return Err(NetError::invalid(format!(
                        "buffer of {total} bytes exceeds {} byte pool blocks",
                        allocator.block_size()
                    )));
                }
                ReceiveBuffer::pooled(allocator.allocate()?, total)
            }
            None => Ok(ReceiveBuffer::heap(total)),
        }
    }
}

/// Produces receive buffers and tracks the negotiated MTU.
pub struct BufferFactory {
    /// Effective MTU; 0 means exact-size allocation without pooling.
    mtu: usize,
    /// Allocator for `mtu` sized blocks, present once `mtu` is nonzero.
    allocator: Option<BlockAllocator>,
    pools: BlockPools,
    strategy: Arc<dyn BufferStrategy>,
}

impl BufferFactory {
    /// Create a factory with no MTU, drawing pools from `pools` once one is set.
    pub fn new(pools: BlockPools) -> Self {
        Self::with_strategy(pools, Arc::new(DefaultStrategy))
    }

    /// Create a factory with a custom construction strategy.
    pub fn with_strategy(pools: BlockPools, strategy: Arc<dyn BufferStrategy>) -> Self {
        Self {
            mtu: 0,
            allocator: None,
            pools,
            strategy,
        }
    }

    /// The effective MTU.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// The block allocator in use, if pooling is engaged.
    pub fn allocator(&self) -> Option<&BlockAllocator> {
        self.allocator.as_ref()
    }

    /// Create a buffer holding `reserved + length` valid bytes.
    ///
    /// With a nonzero MTU the buffer is pool-backed and the total must fit in
    /// one MTU; callers segment larger requests first.
    pub fn create_buffer(&self, length: usize, reserved: usize) -> Result<OwnedBuffer> {
        let total = reserved
            .checked_add(length)
            .ok_or_else(|| NetError::invalid("buffer length overflow"))?;
        if self.mtu != 0 && total > self.mtu {
            return Err(NetError::invalid(format!(
                "buffer of {total} bytes exceeds mtu {}",
                self.mtu
            )));
        }
        self.strategy.create(total, self.allocator.as_ref())
    }

    /// Widen the MTU to `max(current, mtu)`.
    ///
    /// The block allocator is only swapped when the block size changes.
    pub fn reconfigure(&mut self, mtu: usize) {
        let widened = self.mtu.max(mtu);
        if widened == self.mtu {
            return;
        }
        debug!(from = self.mtu, to = widened, "widening buffer factory mtu");
        self.mtu = widened;
        self.allocator = Some(self.pools.allocator_for(widened));
    }
}

impl std::fmt::Debug for BufferFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferFactory")
            .field("mtu", &self.mtu)
            .field("allocator", &self.allocator)
            .finish()
    }
}
