//! Driver over a blocking byte stream.
//!
//! Fill-in-place loops on `read` until the region is full; pull-new performs
//! a single `read` and hands back whatever arrived as one physical chunk.

use super::pull_size;
use crate::error::{NetError, Result};
use crate::input::{BufferFactory, FillInPlace, OwnedBuffer, PullNew};
use std::io::{ErrorKind, Read};
use tracing::trace;

/// Driver reading from any `std::io::Read`.
#[derive(Debug)]
pub struct StreamDriver<R> {
    inner: R,
}

impl<R: Read> StreamDriver<R> {
    /// Wrap a byte stream.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_some(&mut self, region: &mut [u8]) -> Result<usize> {
        loop {
            match self.inner.read(region) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<R: Read + Send> FillInPlace for StreamDriver<R> {
    fn fill(&mut self, region: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < region.len() {
            let n = self.read_some(&mut region[filled..])?;
            if n == 0 {
                trace!(filled, wanted = region.len(), "stream ended during fill");
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

impl<R: Read + Send> PullNew for StreamDriver<R> {
    fn pull(&mut self, factory: &BufferFactory, limit: usize) -> Result<OwnedBuffer> {
        let mut buffer = factory.create_buffer(pull_size(factory, limit), 0)?;
        let n = self.read_some(buffer.data_mut())?;
        if n == 0 {
            return Err(NetError::ConnectionClosed);
        }
        buffer.set_len(n)?;
        Ok(buffer)
    }
}
