//! Buffered input: the per-connection read engine.
//!
//! Holds at most one physical receive buffer and a cursor into it, and turns
//! the driver's physical chunks into one logical byte stream. A buffer is
//! pumped from the driver only when none is held, and released the moment
//! its last byte is consumed.
//!
//! ## Zero-copy arrays
//!
//! When no header bytes are reserved and an array read is longer than the
//! configured threshold, the destination array itself is handed to the
//! driver (in MTU sized views when an MTU is set), so the payload never
//! passes through an intermediate buffer.

use crate::error::{NetError, Result};
use crate::input::allocator::BlockPools;
use crate::input::buffer::{OwnedBuffer, ReceiveBuffer};
use crate::input::driver::Driver;
use crate::input::factory::BufferFactory;
use tracing::{debug, trace};

/// Tunables that are fixed for the lifetime of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputConfig {
    /// Array reads longer than this take the zero-copy path (if no header is reserved).
    pub zero_copy_threshold: usize,
    /// Upper bound applied to negotiated MTUs (0 = no cap).
    pub max_mtu: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            zero_copy_threshold: 1024,
            max_mtu: 0,
        }
    }
}

/// Whether a receive buffer is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    /// No buffer held.
    Empty,
    /// A buffer is held; `cursor` is in `[payload_offset, len)`.
    Holding { cursor: usize, len: usize },
}

/// Counters for the receive path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputStats {
    /// Physical buffers obtained from the driver.
    pub pumps: u64,
    /// Buffers released after being fully consumed (or discarded by `finish`).
    pub frees: u64,
    /// Caller-array views handed to the driver.
    pub view_fills: u64,
    /// Bytes copied out of intermediate buffers into caller memory.
    pub copied_bytes: u64,
    /// Bytes written by the driver directly into caller memory.
    pub zero_copy_bytes: u64,
}

/// Buffered input over one transport driver.
///
/// One reader per instance; nothing here is locked. Dropping the input
/// releases any held buffer.
pub struct BufferedInput {
    driver: Driver,
    factory: BufferFactory,
    /// Current physical buffer.
    buffer: Option<OwnedBuffer>,
    /// Offset of the next unread byte in `buffer`.
    cursor: usize,
    /// Header bytes at the front of every physical buffer.
    payload_offset: usize,
    /// Negotiated MTU for this connection (0 = exact-size receives).
    mtu: usize,
    config: InputConfig,
    stats: InputStats,
}

impl BufferedInput {
    /// Create an input with its own factory drawing from `pools`.
    pub fn new(driver: Driver, pools: BlockPools, config: InputConfig) -> Self {
        Self::with_factory(driver, BufferFactory::new(pools), config)
    }

    /// Create an input around an existing factory.
    pub fn with_factory(driver: Driver, factory: BufferFactory, config: InputConfig) -> Self {
        Self {
            driver,
            factory,
            buffer: None,
            cursor: 0,
            payload_offset: 0,
            mtu: 0,
            config,
            stats: InputStats::default(),
        }
    }

    /// Configure MTU and header reservation for the next logical message.
    ///
    /// Must be called with no buffer held. The MTU is clamped to
    /// `max_mtu`; the factory only ever widens.
    pub fn init_receive(&mut self, mtu: usize, header_len: usize) -> Result<()> {
        if let Some(buffer) = &self.buffer {
            return Err(NetError::invalid(format!(
                "init_receive with {} unread bytes held",
                buffer.len() - self.cursor
            )));
        }
        let max = self.config.max_mtu;
        let mtu = if max != 0 && (mtu == 0 || mtu > max) {
            max
        } else {
            mtu
        };
        if mtu != 0 && header_len >= mtu {
            return Err(NetError::invalid(format!(
                "header of {header_len} bytes does not fit mtu {mtu}"
            )));
        }

        self.mtu = mtu;
        self.factory.reconfigure(mtu);
        self.payload_offset = header_len;
        debug!(
            mtu,
            header_len,
            factory_mtu = self.factory.mtu(),
            driver = self.driver.kind(),
            "receive initialised"
        );
        Ok(())
    }

    /// Release any held buffer at the end of a logical message.
    pub fn finish(&mut self) {
        self.free_buffer();
    }

    /// Read one byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        if self.buffer.is_none() {
            self.pump(1)?;
        }
        let value = match &self.buffer {
            Some(buffer) => buffer.data()[self.cursor],
            None => return Err(NetError::ConnectionClosed),
        };
        self.consume(1);
        Ok(value)
    }

    /// Copy up to `length` bytes into `dest[offset..]` from at most one
    /// physical buffer.
    ///
    /// Returns the number of bytes copied, or `None` at end of stream.
    pub fn read_buffered(
        &mut self,
        dest: &mut [u8],
        offset: usize,
        length: usize,
    ) -> Result<Option<usize>> {
        check_range(dest.len(), offset, length)?;
        if length == 0 {
            return Ok(Some(0));
        }
        if self.buffer.is_none() {
            match self.pump(length) {
                Ok(()) => {}
                Err(NetError::ConnectionClosed) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        Ok(Some(self.copy_out(&mut dest[offset..offset + length])))
    }

    /// Fill `dest[offset..offset + length]` completely.
    ///
    /// On `ConnectionClosed` the bytes received so far are left in place.
    pub fn read_array(&mut self, dest: &mut [u8], offset: usize, length: usize) -> Result<()> {
        check_range(dest.len(), offset, length)?;
        if length == 0 {
            return Ok(());
        }
        let dest = &mut dest[offset..offset + length];

        if self.payload_offset == 0 && length > self.config.zero_copy_threshold {
            self.read_array_direct(dest)
        } else {
            self.read_array_buffered(dest)
        }
    }

    fn read_array_buffered(&mut self, dest: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < dest.len() {
            if self.buffer.is_none() {
                self.pump(dest.len() - done)?;
            }
            done += self.copy_out(&mut dest[done..]);
        }
        Ok(())
    }

    fn read_array_direct(&mut self, dest: &mut [u8]) -> Result<()> {
        // Bytes already pumped belong in front of the array. A short copy
        // exhausts the held buffer, which releases it before any view fill.
        let mut done = 0;
        if self.buffer.is_some() {
            done = self.copy_out(dest);
            if done == dest.len() {
                return Ok(());
            }
        }
        debug_assert!(self.buffer.is_none(), "view fill while a buffer is held");
        trace!(length = dest.len() - done, mtu = self.mtu, "zero-copy array read");

        while done < dest.len() {
            let n = if self.mtu != 0 {
                self.mtu.min(dest.len() - done)
            } else {
                dest.len() - done
            };
            let mut view = ReceiveBuffer::view(&mut dest[done..done + n]);
            self.stats.view_fills += 1;
            let copied = self.driver.fill_buffer(&self.factory, &mut view)?;
            view.free();
            self.stats.copied_bytes += copied as u64;
            self.stats.zero_copy_bytes += (n - copied) as u64;
            done += n;
        }
        Ok(())
    }

    /// Receive one physical buffer straight from the driver, bypassing the cursor.
    ///
    /// The caller owns the result; dropping it frees it.
    pub fn read_byte_buffer(&mut self, expected_len: usize) -> Result<OwnedBuffer> {
        self.release_for_direct()?;
        let segment = self.segment();
        let buffer =
            self.driver
                .receive(&self.factory, self.payload_offset, expected_len, segment)?;
        self.stats.pumps += 1;
        Ok(buffer)
    }

    /// Fill every valid byte of a caller-provided buffer, bypassing the cursor.
    pub fn read_into(&mut self, target: &mut ReceiveBuffer<'_>) -> Result<()> {
        self.release_for_direct()?;
        let copied = self.driver.fill_buffer(&self.factory, target)?;
        self.stats.view_fills += 1;
        self.stats.copied_bytes += copied as u64;
        self.stats.zero_copy_bytes += (target.len() - copied) as u64;
        Ok(())
    }

    fn release_for_direct(&mut self) -> Result<()> {
        if self.buffer.is_some() {
            let unread = self.remaining();
            return Err(NetError::invalid(format!(
                "direct receive would discard {unread} unread bytes"
            )));
        }
        Ok(())
    }

    /// Current buffer state.
    pub fn state(&self) -> InputState {
        match &self.buffer {
            Some(buffer) => InputState::Holding {
                cursor: self.cursor,
                len: buffer.len(),
            },
            None => InputState::Empty,
        }
    }

    /// Unread bytes in the held buffer.
    pub fn remaining(&self) -> usize {
        self.buffer
            .as_ref()
            .map_or(0, |buffer| buffer.len() - self.cursor)
    }

    /// Header bytes of the held buffer.
    pub fn header(&self) -> Option<&[u8]> {
        self.buffer
            .as_ref()
            .map(|buffer| &buffer.data()[..self.payload_offset])
    }

    /// Negotiated MTU (0 = exact-size receives).
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Header bytes reserved per physical buffer.
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    /// Receive path counters.
    pub fn stats(&self) -> InputStats {
        self.stats
    }

    /// The buffer factory.
    pub fn factory(&self) -> &BufferFactory {
        &self.factory
    }

    /// Bound on one physical buffer handed to the driver.
    fn segment(&self) -> usize {
        if self.mtu != 0 {
            self.mtu
        } else {
            self.factory.mtu()
        }
    }

    /// Obtain a buffer carrying up to `length` payload bytes.
    fn pump(&mut self, length: usize) -> Result<()> {
        debug_assert!(self.buffer.is_none(), "pump while a buffer is held");
        let segment = self.segment();
        loop {
            let buffer =
                self.driver
                    .receive(&self.factory, self.payload_offset, length, segment)?;
            self.stats.pumps += 1;

            if buffer.len() < self.payload_offset {
                return Err(NetError::invalid(format!(
                    "physical buffer of {} bytes is shorter than the {} byte header",
                    buffer.len(),
                    self.payload_offset
                )));
            }
            if buffer.len() == self.payload_offset {
                trace!(len = buffer.len(), "header-only buffer released");
                self.stats.frees += 1;
                continue;
            }

            trace!(requested = length, len = buffer.len(), "pumped buffer");
            self.cursor = self.payload_offset;
            self.buffer = Some(buffer);
            return Ok(());
        }
    }

    /// Copy from the held buffer into `dest`, returning the count.
    fn copy_out(&mut self, dest: &mut [u8]) -> usize {
        let n = match &self.buffer {
            Some(buffer) => {
                let n = (buffer.len() - self.cursor).min(dest.len());
                dest[..n].copy_from_slice(&buffer.data()[self.cursor..self.cursor + n]);
                n
            }
            None => 0,
        };
        self.stats.copied_bytes += n as u64;
        self.consume(n);
        n
    }

    fn consume(&mut self, n: usize) {
        self.cursor += n;
        let exhausted = self
            .buffer
            .as_ref()
            .is_some_and(|buffer| self.cursor == buffer.len());
        if exhausted {
            self.free_buffer();
        }
    }

    fn free_buffer(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            trace!(len = buffer.len(), cursor = self.cursor, "freeing buffer");
            buffer.free();
            self.cursor = 0;
            self.stats.frees += 1;
        }
    }
}

impl std::io::Read for BufferedInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let len = buf.len();
        match self.read_buffered(buf, 0, len) {
            Ok(Some(n)) => Ok(n),
            Ok(None) => Ok(0),
            Err(NetError::Io(e)) => Err(e),
            Err(e) => Err(std::io::Error::other(e)),
        }
    }
}

impl std::fmt::Debug for BufferedInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedInput")
            .field("driver", &self.driver)
            .field("state", &self.state())
            .field("mtu", &self.mtu)
            .field("payload_offset", &self.payload_offset)
            .field("config", &self.config)
            .finish()
    }
}

fn check_range(dest_len: usize, offset: usize, length: usize) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= dest_len => Ok(()),
        _ => Err(NetError::invalid(format!(
            "range {offset}+{length} outside destination of {dest_len} bytes"
        ))),
    }
}
