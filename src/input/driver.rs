//! Driver-facing receive primitives.
//!
//! A transport driver supplies bytes in one of two forms:
//! - `FillInPlace`: write the next bytes straight into a region we own
//!   (or one the caller owns, for zero-copy reads).
//! - `PullNew`: hand back a freshly allocated buffer holding the next
//!   physical chunk.
//!
//! The form is fixed when the `Driver` is built, and the bridging from one
//! form to the other happens here by matching on the variant.

use crate::error::{NetError, Result};
use crate::input::buffer::{OwnedBuffer, ReceiveBuffer};
use crate::input::factory::BufferFactory;
use tracing::trace;

/// A driver that fills caller-provided regions.
pub trait FillInPlace: Send {
    /// Write the next bytes into `region`, returning how many were written.
    ///
    /// Anything short of `region.len()` means the stream ended after that
    /// many bytes; a later call may return 0 or fail with `ConnectionClosed`.
    fn fill(&mut self, region: &mut [u8]) -> Result<usize>;
}

/// A driver that produces its own buffers.
pub trait PullNew: Send {
    /// Return the next physical chunk, holding between 1 and `limit` bytes.
    ///
    /// `factory` supplies pool-backed buffers. Fails with `ConnectionClosed`
    /// at end of stream.
    fn pull(&mut self, factory: &BufferFactory, limit: usize) -> Result<OwnedBuffer>;
}

/// A transport driver together with the receive primitive it implements.
pub enum Driver {
    FillsInPlace(Box<dyn FillInPlace>),
    PullsNew(Box<dyn PullNew>),
}

impl Driver {
    /// Wrap a fill-in-place driver.
    pub fn fills(driver: impl FillInPlace + 'static) -> Self {
        Driver::FillsInPlace(Box::new(driver))
    }

    /// Wrap a pull-new driver.
    pub fn pulls(driver: impl PullNew + 'static) -> Self {
        Driver::PullsNew(Box::new(driver))
    }

    /// Build from whichever primitives a driver offers.
    ///
    /// Fill-in-place wins when both are present since the zero-copy path can
    /// use it without an intermediate buffer. Neither is a configuration
    /// error.
    pub fn from_capabilities(
        fill: Option<Box<dyn FillInPlace>>,
        pull: Option<Box<dyn PullNew>>,
    ) -> Result<Self> {
        match (fill, pull) {
            (Some(fill), _) => Ok(Driver::FillsInPlace(fill)),
            (None, Some(pull)) => Ok(Driver::PullsNew(pull)),
            (None, None) => Err(NetError::UnconfiguredDriver),
        }
    }

    /// Short name of the receive form, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Driver::FillsInPlace(_) => "fill",
            Driver::PullsNew(_) => "pull",
        }
    }

    /// Obtain the next physical buffer: `reserved` header bytes followed by
    /// up to `length` payload bytes.
    ///
    /// `segment` bounds one physical buffer (0 = unbounded).
    pub(crate) fn receive(
        &mut self,
        factory: &BufferFactory,
        reserved: usize,
        length: usize,
        segment: usize,
    ) -> Result<OwnedBuffer> {
        let wanted = reserved
            .checked_add(length)
            .ok_or_else(|| NetError::invalid("receive length overflow"))?;
        if segment != 0 && segment <= reserved {
            return Err(NetError::invalid(format!(
                "segment of {segment} bytes leaves no room after {reserved} header bytes"
            )));
        }
        match self {
            Driver::FillsInPlace(driver) => {
                let total = if segment != 0 {
                    wanted.min(segment)
                } else {
                    wanted
                };
                let mut buffer = factory.create_buffer(total - reserved, reserved)?;
                let n = driver.fill(buffer.data_mut())?;
                if n < total {
                    // Keep a short final chunk so its bytes still reach the reader.
                    if n <= reserved {
                        return Err(NetError::ConnectionClosed);
                    }
                    buffer.set_len(n)?;
                }
                Ok(buffer)
            }
            Driver::PullsNew(driver) => {
                let limit = if segment != 0 { segment } else { wanted };
                let buffer = driver.pull(factory, limit)?;
                if buffer.len() > limit {
                    return Err(NetError::invalid(format!(
                        "driver returned {} bytes for a {limit} byte pull",
                        buffer.len()
                    )));
                }
                Ok(buffer)
            }
        }
    }

    /// Fill every valid byte of `target`.
    ///
    /// Returns the number of bytes that went through an intermediate buffer
    /// (always 0 for fill-in-place drivers).
    pub(crate) fn fill_buffer(
        &mut self,
        factory: &BufferFactory,
        target: &mut ReceiveBuffer<'_>,
    ) -> Result<usize> {
        match self {
            Driver::FillsInPlace(driver) => {
                let region = target.data_mut();
                let n = driver.fill(region)?;
                if n < region.len() {
                    return Err(NetError::ConnectionClosed);
                }
                Ok(0)
            }
            Driver::PullsNew(driver) => {
                let region = target.data_mut();
                let mut filled = 0;
                while filled < region.len() {
                    let missing = region.len() - filled;
                    let chunk = driver.pull(factory, missing)?;
                    if chunk.is_empty() || chunk.len() > missing {
                        return Err(NetError::invalid(format!(
                            "driver returned {} bytes for a {missing} byte pull",
                            chunk.len()
                        )));
                    }
                    let n = missing.min(chunk.len());
                    region[filled..filled + n].copy_from_slice(&chunk.data()[..n]);
                    filled += n;
                    trace!(chunk = n, filled, "bridged pulled chunk into region");
                }
                Ok(filled)
            }
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Driver").field(&self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::allocator::BlockPools;

    struct Counter(u8);

    impl FillInPlace for Counter {
        fn fill(&mut self, region: &mut [u8]) -> Result<usize> {
            for b in region.iter_mut() {
                *b = self.0;
                self.0 = self.0.wrapping_add(1);
            }
            Ok(region.len())
        }
    }

    /// Pulls chunks of at most `chunk` bytes counting up from `next`.
    struct Chunks {
        next: u8,
        chunk: usize,
    }

    impl PullNew for Chunks {
        fn pull(&mut self, factory: &BufferFactory, limit: usize) -> Result<OwnedBuffer> {
            let n = self.chunk.min(limit);
            let mut buf = factory.create_buffer(n, 0)?;
            for b in buf.data_mut() {
                *b = self.next;
                self.next = self.next.wrapping_add(1);
            }
            Ok(buf)
        }
    }

    #[test]
    fn test_from_capabilities() {
        let err = Driver::from_capabilities(None, None).unwrap_err();
        assert!(matches!(err, NetError::UnconfiguredDriver));

        let fill: Box<dyn FillInPlace> = Box::new(Counter(0));
        let pull: Box<dyn PullNew> = Box::new(Chunks { next: 0, chunk: 4 });
        let both = Driver::from_capabilities(Some(fill), Some(pull)).unwrap();
        assert_eq!(both.kind(), "fill");

        let pull: Box<dyn PullNew> = Box::new(Chunks { next: 0, chunk: 4 });
        let pull_only = Driver::from_capabilities(None, Some(pull)).unwrap();
        assert_eq!(pull_only.kind(), "pull");
    }

    #[test]
    fn test_fill_receive_segments_by_mtu() {
        let factory = BufferFactory::new(BlockPools::new());
        let mut driver = Driver::fills(Counter(0));

        let buf = driver.receive(&factory, 2, 10, 8).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(buf.data(), &[0, 1, 2, 3, 4, 5, 6, 7]);

        let buf = driver.receive(&factory, 2, 3, 0).unwrap();
        assert_eq!(buf.data(), &[8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_pull_bridges_into_view() {
        let factory = BufferFactory::new(BlockPools::new());
        let mut driver = Driver::pulls(Chunks { next: 1, chunk: 3 });

        let mut dest = [0u8; 8];
        let copied = {
            let mut view = ReceiveBuffer::view(&mut dest[1..8]);
            driver.fill_buffer(&factory, &mut view).unwrap()
        };
        assert_eq!(copied, 7);
        assert_eq!(dest, [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_oversized_pull_rejected() {
        struct Greedy;

        impl PullNew for Greedy {
            fn pull(&mut self, _: &BufferFactory, limit: usize) -> Result<OwnedBuffer> {
                Ok(ReceiveBuffer::heap(limit + 1))
            }
        }

        let factory = BufferFactory::new(BlockPools::new());
        let mut driver = Driver::pulls(Greedy);
        let err = driver.receive(&factory, 0, 4, 0).unwrap_err();
        assert!(matches!(err, NetError::InvalidUse(_)));
    }
}
