//! # tickwire
//!
//! Client-side networking core for a tick-based multiplayer game.
//!
//! One TCP connection carries two kinds of length-prefixed frames: `|`
//! delimited text commands and binary commands with a 16-bit code. Inbound
//! frames are queued by a background I/O task and delivered on the game
//! thread once per tick, routed to one cached handler per command. Entity
//! traits run on the same tick and flush their state as binary requests.
//!
//! ## Architecture
//!
//! - **Framing** ([`protocol`]): `[len u32 BE][kind u8][payload]`, max 1 MiB
//! - **Commands** ([`command`]): routing keys, payloads, response envelopes
//! - **Dispatch** ([`dispatch`]): inbound and outbound dispatchers
//! - **Transport** ([`transport`]): socket, queues and the writer task
//! - **Sync** ([`sync`]): per-tick trait scheduler
//!
//! ## Example
//!
//! ```no_run
//! use tickwire::command::{BinaryCommand, RequestShape};
//! use tickwire::Client;
//!
//! let mut client = Client::builder().host("127.0.0.1").port(7000).build()?;
//! client.connect();
//!
//! client.request(
//!     BinaryCommand::MOVE_REQUEST,
//!     RequestShape::IdPosition { id: 1, x: 0.0, y: 2.0, z: 4.0 },
//! );
//!
//! loop {
//!     client.tick(1.0 / 30.0);
//!     # break;
//! }
//! # Ok::<(), tickwire::NetError>(())
//! ```

pub mod bus;
pub mod codec;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod sync;
pub mod transport;
pub mod writer;

mod client;

pub use client::{Client, ClientBuilder};
pub use error::{NetError, Result};
