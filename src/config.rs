//! Configuration module for the netbuf receiver.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use netbuf::InputConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the receiver
#[derive(Parser, Debug)]
#[command(name = "netbuf")]
#[command(author = "netbuf authors")]
#[command(version = "0.1.0")]
#[command(about = "Receives length-prefixed frames through the buffered input layer", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:7700)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Negotiated MTU in bytes (0 = exact-size receives)
    #[arg(short = 'm', long)]
    pub mtu: Option<usize>,

    /// Array reads longer than this bypass the intermediate buffer
    #[arg(short = 'z', long)]
    pub zero_copy_threshold: Option<usize>,

    /// Receive primitive used by the socket driver
    #[arg(short = 'd', long, value_enum)]
    pub driver: Option<DriverMode>,

    /// Maximum number of concurrent connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Which receive primitive the socket driver is registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriverMode {
    /// Socket reads land directly in the target region.
    Fill,
    /// One socket read per physical chunk.
    Pull,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub input: InputSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// SO_RCVBUF for accepted sockets
    pub recv_buffer_size: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: default_max_connections(),
            recv_buffer_size: None,
        }
    }
}

/// Buffered input configuration
#[derive(Debug, Deserialize)]
pub struct InputSection {
    /// Negotiated MTU in bytes
    #[serde(default = "default_mtu")]
    pub mtu: usize,
    /// Cap applied to the negotiated MTU (0 = none)
    #[serde(default)]
    pub max_mtu: usize,
    /// Zero-copy array threshold in bytes
    #[serde(default = "default_zero_copy_threshold")]
    pub zero_copy_threshold: usize,
    /// Cap on blocks per pool
    pub pool_blocks: Option<usize>,
    /// Socket driver receive primitive
    #[serde(default = "default_driver")]
    pub driver: DriverMode,
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            mtu: default_mtu(),
            max_mtu: 0,
            zero_copy_threshold: default_zero_copy_threshold(),
            pool_blocks: None,
            driver: default_driver(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:7700".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_mtu() -> usize {
    64 * 1024 // 64 KB
}

fn default_zero_copy_threshold() -> usize {
    1024
}

fn default_driver() -> DriverMode {
    DriverMode::Fill
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub max_connections: usize,
    pub recv_buffer_size: Option<usize>,
    pub mtu: usize,
    pub max_mtu: usize,
    pub zero_copy_threshold: usize,
    pub pool_blocks: Option<usize>,
    pub driver: DriverMode,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let config = Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            recv_buffer_size: toml_config.server.recv_buffer_size,
            mtu: cli.mtu.unwrap_or(toml_config.input.mtu),
            max_mtu: toml_config.input.max_mtu,
            zero_copy_threshold: cli
                .zero_copy_threshold
                .unwrap_or(toml_config.input.zero_copy_threshold),
            pool_blocks: toml_config.input.pool_blocks,
            driver: cli.driver.unwrap_or(toml_config.input.driver),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_mtu != 0 && self.mtu > self.max_mtu {
            return Err(ConfigError::Invalid(format!(
                "mtu {} exceeds max_mtu {}",
                self.mtu, self.max_mtu
            )));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Library-side settings for each connection's buffered input.
    pub fn input_config(&self) -> InputConfig {
        InputConfig {
            zero_copy_threshold: self.zero_copy_threshold,
            max_mtu: self.max_mtu,
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
