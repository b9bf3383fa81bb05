//! Error types for tickwire.

use thiserror::Error;

/// Main error type for all tickwire operations.
#[derive(Debug, Error)]
pub enum NetError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Framing violation (invalid length, oversized payload). Fatal for the connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame carried a message kind this client does not understand.
    #[error("Unknown message kind: {0:#04x}")]
    UnknownKind(u8),

    /// Binary response envelope failed its length checks.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Outbound queue is full; the frame was not queued.
    #[error("Write queue full")]
    QueueFull,

    /// A command handler rejected its payload.
    #[error("Handler error: {0}")]
    Handler(String),
}

/// Result type alias using NetError.
pub type Result<T> = std::result::Result<T, NetError>;
