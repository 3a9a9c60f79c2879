//! netbuf: receive-side buffering layer for a pluggable network stack.
//!
//! Transport drivers deliver bytes in driver-native chunks; `BufferedInput`
//! turns them into one logical stream of bytes, arrays and primitives.
//!
//! Features:
//! - Fixed-size block pooling shared across connections
//! - MTU driven segmentation with per-chunk header reservation
//! - Zero-copy array reads straight into caller memory
//! - In-memory and `std::io::Read` drivers

pub mod drivers;
pub mod error;
pub mod input;

pub use error::{NetError, Result};
pub use input::{
    BlockAllocator, BlockPools, BufferFactory, BufferedInput, ByteInput, Driver, FillInPlace,
    InputConfig, InputState, InputStats, OwnedBuffer, PrimitiveInput, PullNew, ReceiveBuffer,
};
