//! Client configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```
//! use tickwire::config::ClientConfig;
//!
//! let config = ClientConfig::from_toml_str(r#"
//!     [transport]
//!     host = "game.example.net"
//!     port = 7777
//!
//!     [writer]
//!     max_pending_frames = 256
//! "#).unwrap();
//!
//! assert_eq!(config.transport.port, 7777);
//! assert_eq!(config.transport.read_buffer_size, 64 * 1024);
//! assert_eq!(config.writer.max_pending_frames, 256);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::MAX_MESSAGE_SIZE;

pub use crate::writer::WriterConfig;

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_PORT: u16 = 7000;

/// Default size of each socket read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted value of the length prefix, kind byte included.
    pub max_message_size: u32,
    /// Bytes requested per socket read.
    pub read_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_message_size: MAX_MESSAGE_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub writer: WriterConfig,
}

impl ClientConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
