//! Receive buffers.
//!
//! A `ReceiveBuffer` is a byte region plus a declared valid length. The
//! region is either a pooled `Block`, an independent heap allocation, or a
//! view borrowed from caller memory (zero-copy reception). Freeing is
//! dropping: pooled regions go back to their allocator, heap regions are
//! deallocated, views release the borrow and touch nothing else.

use crate::error::{NetError, Result};
use crate::input::allocator::{Block, BlockAllocator};

enum Region<'a> {
    Pooled(Block),
    Heap(Box<[u8]>),
    View(&'a mut [u8]),
}

impl Region<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Region::Pooled(block) => &block[..],
            Region::Heap(data) => &data[..],
            Region::View(view) => &view[..],
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Region::Pooled(block) => &mut block[..],
            Region::Heap(data) => &mut data[..],
            Region::View(view) => &mut view[..],
        }
    }
}

/// A byte region with a declared valid length and an optional owning pool.
pub struct ReceiveBuffer<'a> {
    region: Region<'a>,
    len: usize,
}

/// A receive buffer that owns its memory.
pub type OwnedBuffer = ReceiveBuffer<'static>;

impl ReceiveBuffer<'static> {
    /// Wrap a pooled block, marking the first `len` bytes valid.
    pub fn pooled(block: Block, len: usize) -> Result<Self> {
        check_len(len, block.len())?;
        Ok(Self {
            region: Region::Pooled(block),
            len,
        })
    }

    /// Allocate an independent zeroed region of exactly `len` bytes.
    pub fn heap(len: usize) -> Self {
        Self {
            region: Region::Heap(vec![0u8; len].into_boxed_slice()),
            len,
        }
    }

    /// Take ownership of existing bytes; all of them are valid.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            region: Region::Heap(data.into_boxed_slice()),
            len,
        }
    }
}

impl<'a> ReceiveBuffer<'a> {
    /// Borrow caller memory; the whole slice is the valid length.
    pub fn view(data: &'a mut [u8]) -> Self {
        let len = data.len();
        Self {
            region: Region::View(data),
            len,
        }
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no bytes are valid.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the underlying region.
    pub fn capacity(&self) -> usize {
        self.region.bytes().len()
    }

    /// The valid bytes.
    pub fn data(&self) -> &[u8] {
        &self.region.bytes()[..self.len]
    }

    /// The valid bytes, mutably (for drivers filling in place).
    pub fn data_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.region.bytes_mut()[..len]
    }

    /// Change the valid length, e.g. after a driver delivered a short chunk.
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        check_len(len, self.capacity())?;
        self.len = len;
        Ok(())
    }

    /// The allocator that reclaims this region, `None` for heap and view buffers.
    pub fn origin(&self) -> Option<&BlockAllocator> {
        match &self.region {
            Region::Pooled(block) => Some(block.origin()),
            Region::Heap(_) | Region::View(_) => None,
        }
    }

    /// True if the region is borrowed caller memory.
    pub fn is_view(&self) -> bool {
        matches!(self.region, Region::View(_))
    }

    /// Release the region to its origin.
    pub fn free(self) {}
}

fn check_len(len: usize, capacity: usize) -> Result<()> {
    if len > capacity {
        return Err(NetError::invalid(format!(
            "valid length {len} exceeds region capacity {capacity}"
        )));
    }
    Ok(())
}

impl std::fmt::Debug for ReceiveBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.region {
            Region::Pooled(_) => "pooled",
            Region::Heap(_) => "heap",
            Region::View(_) => "view",
        };
        f.debug_struct("ReceiveBuffer")
            .field("kind", &kind)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}
