//! Concrete transport drivers.
//!
//! - `ChunkDriver`: in-memory bytes delivered in fixed-size physical chunks
//! - `StreamDriver`: any blocking `std::io::Read` (TCP sockets in practice)

mod memory;
mod stream;

pub use memory::ChunkDriver;
pub use stream::StreamDriver;

use crate::input::BufferFactory;

/// Largest buffer `factory` can produce for a pull bounded by `limit`.
fn pull_size(factory: &BufferFactory, limit: usize) -> usize {
    match factory.mtu() {
        0 => limit,
        mtu => limit.min(mtu),
    }
}
