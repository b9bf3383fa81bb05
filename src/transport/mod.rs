//! Transport module - the TCP connection to the game server.
//!
//! Provides:
//! - [`Transport`] - owns the socket, the I/O runtime and the inbound queues
//! - [`FrameSender`] - thread-safe sending side, usable as a dispatch sink
//! - [`ConnectionEvent`] - connection state changes delivered by `pump`

mod tcp;

pub use tcp::{ConnectionEvent, FrameSender, Transport};
