//! In-memory driver.
//!
//! Delivers a fixed byte sequence in physical chunks of a fixed size, the
//! way a segmenting transport would. Implements both receive forms, so the
//! same data can be read through either bridging path.

use super::pull_size;
use crate::error::{NetError, Result};
use crate::input::{BufferFactory, FillInPlace, OwnedBuffer, PullNew};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Driver over an in-memory byte sequence.
#[derive(Debug, Clone)]
pub struct ChunkDriver {
    /// Bytes not yet delivered.
    data: Bytes,
    /// Physical chunk size (0 = deliver as much as asked).
    chunk: usize,
    /// Physical receives performed, shared with the creator.
    receives: Arc<AtomicUsize>,
}

impl ChunkDriver {
    /// Deliver `data` in chunks of at most `chunk` bytes.
    pub fn new(data: impl Into<Bytes>, chunk: usize) -> Self {
        Self {
            data: data.into(),
            chunk,
            receives: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build the stream a sender produces when it splits `payload` into
    /// `segment` byte chunks, each starting with `header`.
    pub fn segmented(payload: &[u8], segment: usize, header: &[u8]) -> Self {
        let room = segment.saturating_sub(header.len()).max(1);
        let pieces = payload.len().div_ceil(room);
        let mut data = BytesMut::with_capacity(payload.len() + pieces * header.len());
        for piece in payload.chunks(room) {
            data.put_slice(header);
            data.put_slice(piece);
        }
        Self::new(data.freeze(), header.len() + room)
    }

    /// Counter of physical receives, readable after the driver is boxed.
    pub fn receive_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.receives)
    }

    /// Bytes not yet delivered.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    fn step(&self, wanted: usize) -> usize {
        let n = wanted.min(self.data.len());
        if self.chunk == 0 {
            n
        } else {
            n.min(self.chunk)
        }
    }
}

impl PullNew for ChunkDriver {
    fn pull(&mut self, factory: &BufferFactory, limit: usize) -> Result<OwnedBuffer> {
        if self.data.is_empty() {
            return Err(NetError::ConnectionClosed);
        }
        let n = self.step(pull_size(factory, limit));
        let piece = self.data.split_to(n);
        let mut buffer = factory.create_buffer(n, 0)?;
        buffer.data_mut().copy_from_slice(&piece);
        self.receives.fetch_add(1, Ordering::Relaxed);
        Ok(buffer)
    }
}

impl FillInPlace for ChunkDriver {
    fn fill(&mut self, region: &mut [u8]) -> Result<usize> {
        if self.data.is_empty() && !region.is_empty() {
            return Err(NetError::ConnectionClosed);
        }
        let mut filled = 0;
        while filled < region.len() && !self.data.is_empty() {
            let n = self.step(region.len() - filled);
            let piece = self.data.split_to(n);
            region[filled..filled + n].copy_from_slice(&piece);
            filled += n;
            self.receives.fetch_add(1, Ordering::Relaxed);
        }
        Ok(filled)
    }
}
