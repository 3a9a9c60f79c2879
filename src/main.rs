//! netbuf: frame receiver built on the buffered input layer
//!
//! Accepts TCP connections and reads length-prefixed frames through one
//! `BufferedInput` per connection. Large payloads are received straight into
//! the frame buffer; everything else goes through pooled receive blocks.
//!
//! Configuration via CLI arguments or TOML file.

mod config;
mod receiver;

use config::Config;
use receiver::Receiver;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        mtu = config.mtu,
        max_mtu = config.max_mtu,
        driver = ?config.driver,
        zero_copy_threshold = config.zero_copy_threshold,
        max_connections = config.max_connections,
        "Starting netbuf receiver"
    );

    Receiver::new(config).run()?;
    Ok(())
}
