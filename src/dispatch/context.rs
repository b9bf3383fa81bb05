//! Context passed to command handlers.
//!
//! Provides methods for reacting to a command:
//! - `raise` - queue a follow-up outbound command
//! - `send` - write a frame straight to the connection
//!
//! # Example
//!
//! ```ignore
//! fn on_connect_pass(_: &TextPayload, ctx: &mut HandlerContext<'_>) -> HandlerResult {
//!     ctx.raise(TextCommand::Login, TextPayload::from_fields(["alice", "pw"]));
//!     Ok(())
//! }
//! ```

use bytes::Bytes;

use crate::command::{Command, CommandMessage, CommandPayload};
use crate::protocol::MessageKind;

/// Destination for encoded outbound payloads.
///
/// Implemented by the transport. Implementations must not block and must
/// not report failures to the caller; they log and drop instead.
pub trait FrameSink: Send + Sync {
    /// Queue one frame for writing.
    fn send_frame(&self, kind: MessageKind, payload: Bytes);
}

/// Context passed to command handlers.
///
/// Without a sink (tests, offline tools) `send` is a no-op.
pub struct HandlerContext<'a> {
    /// Command being handled.
    command: Command,
    /// Where `send` writes.
    sink: Option<&'a dyn FrameSink>,
    /// Follow-up commands, published by the owner after the handler returns.
    raised: &'a mut Vec<CommandMessage>,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        command: Command,
        sink: Option<&'a dyn FrameSink>,
        raised: &'a mut Vec<CommandMessage>,
    ) -> Self {
        Self {
            command,
            sink,
            raised,
        }
    }

    /// Get the command being handled.
    #[inline]
    pub fn command(&self) -> Command {
        self.command
    }

    /// Whether `send` reaches a connection.
    #[inline]
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Queue a follow-up outbound command.
    pub fn raise(&mut self, command: impl Into<Command>, payload: impl Into<CommandPayload>) {
        self.raised.push((command.into(), payload.into()));
    }

    /// Write an encoded payload to the connection.
    pub fn send(&self, kind: MessageKind, payload: Bytes) {
        match self.sink {
            Some(sink) => sink.send_frame(kind, payload),
            None => {
                tracing::trace!(
                    "No sink for {}, discarding {} byte {:?} payload",
                    self.command,
                    payload.len(),
                    kind
                );
            }
        }
    }
}
