//! TCP receiver for length-prefixed frames.
//!
//! Every accepted connection runs on its own thread with its own
//! `BufferedInput`; all connections draw receive buffers from one shared
//! `BlockPools`. A frame is a big-endian `u32` length followed by that many
//! payload bytes.

use crate::config::{Config, DriverMode};
use netbuf::drivers::StreamDriver;
use netbuf::{BlockPools, BufferedInput, Driver, InputConfig, InputStats, NetError};
use socket2::SockRef;
use std::io::{self, Read};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, trace, warn};

/// Bytes in the big-endian length prefix.
const PREFIX_LEN: usize = 4;

/// Largest payload accepted in one frame.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Receive settings copied into every connection thread.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub mtu: usize,
    pub driver: DriverMode,
    pub input: InputConfig,
}

impl From<&Config> for ConnectionSettings {
    fn from(config: &Config) -> Self {
        Self {
            mtu: config.mtu,
            driver: config.driver,
            input: config.input_config(),
        }
    }
}

/// What one connection delivered before it closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub frames: u64,
    pub bytes: u64,
    pub stats: InputStats,
}

/// Receiver instance
pub struct Receiver {
    config: Config,
    pools: BlockPools,
    active: Arc<AtomicUsize>,
}

impl Receiver {
    /// Create a receiver with a fresh set of block pools.
    pub fn new(config: Config) -> Self {
        let pools = BlockPools::with_limit(config.pool_blocks);
        Receiver {
            config,
            pools,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind and accept connections until the listener fails.
    pub fn run(&self) -> io::Result<()> {
        let listener = TcpListener::bind(&self.config.listen)?;
        info!(address = %self.config.listen, "Receiver listening");

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => self.accept(stream),
                Err(e) => error!(error = %e, "Failed to accept connection"),
            }
        }
        Ok(())
    }

    fn accept(&self, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let Some(slot) = ConnectionSlot::acquire(&self.active, self.config.max_connections)
        else {
            warn!(peer = %peer, limit = self.config.max_connections, "Connection limit reached");
            return;
        };

        if let Some(size) = self.config.recv_buffer_size {
            if let Err(e) = SockRef::from(&stream).set_recv_buffer_size(size) {
                warn!(peer = %peer, error = %e, "Failed to set receive buffer size");
            }
        }

        debug!(peer = %peer, active = self.active.load(Ordering::Relaxed), "New connection");
        let settings = ConnectionSettings::from(&self.config);
        let pools = self.pools.clone();

        let spawned = thread::Builder::new()
            .name(format!("conn-{peer}"))
            .spawn(move || {
                let _slot = slot;
                match receive_frames(stream, settings, pools) {
                    Ok(summary) => info!(
                        peer = %peer,
                        frames = summary.frames,
                        bytes = summary.bytes,
                        pumps = summary.stats.pumps,
                        zero_copy_bytes = summary.stats.zero_copy_bytes,
                        "Connection closed"
                    ),
                    Err(e) if e.is_closed() => warn!(peer = %peer, "Connection closed mid-frame"),
                    Err(e) => warn!(peer = %peer, error = %e, "Connection error"),
                }
            });
        if let Err(e) = spawned {
            error!(error = %e, "Failed to spawn connection thread");
        }
    }
}

/// One unit of the connection limit, returned on drop.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()
            .map(|_| ConnectionSlot(Arc::clone(active)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Read frames from `reader` until it ends at a frame boundary.
///
/// End of stream anywhere inside a frame surfaces as `ConnectionClosed`.
pub fn receive_frames<R>(
    reader: R,
    settings: ConnectionSettings,
    pools: BlockPools,
) -> netbuf::Result<ConnectionSummary>
where
    R: Read + Send + 'static,
{
    let driver = match settings.driver {
        DriverMode::Fill => Driver::fills(StreamDriver::new(reader)),
        DriverMode::Pull => Driver::pulls(StreamDriver::new(reader)),
    };
    let mut input = BufferedInput::new(driver, pools, settings.input);
    input.init_receive(settings.mtu, 0)?;

    let mut summary = ConnectionSummary::default();
    let mut payload = Vec::new();
    loop {
        let mut prefix = [0u8; PREFIX_LEN];
        let got = match input.read_buffered(&mut prefix, 0, PREFIX_LEN)? {
            Some(n) => n,
            None => break,
        };
        input.read_array(&mut prefix, got, PREFIX_LEN - got)?;

        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(NetError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds {MAX_FRAME_LEN}"),
            )));
        }
        payload.resize(len, 0);
        input.read_array(&mut payload, 0, len)?;

        summary.frames += 1;
        summary.bytes += len as u64;
        trace!(len, "frame received");
    }

    input.finish();
    summary.stats = input.stats();
    Ok(summary)
}
