//! Receive-side buffering for pluggable network drivers.
//!
//! Pieces, leaf first:
//! - `BlockAllocator` / `BlockPools`: shared fixed-size block pooling
//! - `ReceiveBuffer`: a pooled, heap or borrowed region with a valid length
//! - `BufferFactory`: pooled vs exact-size buffer policy, tracks the MTU
//! - `Driver`: the receive primitive a transport implements
//! - `BufferedInput`: cursor bookkeeping over one driver

mod allocator;
mod buffer;
mod buffered;
mod driver;
mod factory;
mod primitive;

pub use allocator::{Block, BlockAllocator, BlockPools};
pub use buffer::{OwnedBuffer, ReceiveBuffer};
pub use buffered::{BufferedInput, InputConfig, InputState, InputStats};
pub use driver::{Driver, FillInPlace, PullNew};
pub use factory::{BufferFactory, BufferStrategy, DefaultStrategy};
pub use primitive::{ByteInput, PrimitiveInput};
