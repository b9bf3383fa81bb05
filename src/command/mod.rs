//! Command model - routing keys and payloads.
//!
//! A [`Command`] is either a named text command or a 16-bit binary command
//! code. It is only used as a routing key; the data travels separately as a
//! [`CommandPayload`].
//!
//! # Example
//!
//! ```
//! use tickwire::command::{Command, CommandPayload, TextCommand};
//! use bytes::Bytes;
//!
//! let (command, payload) =
//!     Command::from_text_frame(&Bytes::from_static(b"s_login_pass|42")).unwrap();
//!
//! assert_eq!(command, Command::Text(TextCommand::LoginPass));
//! assert_eq!(payload.as_text().unwrap().fields(), ["42"]);
//! ```

mod binary;
mod shape;
mod text;

use std::fmt;

use bytes::Bytes;
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

use crate::error::{NetError, Result};
use crate::protocol::MessageKind;

pub use binary::{build_envelope, BinaryEnvelope, BinaryPayload, ENVELOPE_HEADER_SIZE};
pub use shape::{RequestShape, ShapeKind};
pub use text::{TextPayload, FIELD_SEPARATOR};

/// Identifier of a game entity as it appears on the wire.
pub type EntityId = u32;

/// Closed set of text command names.
///
/// Names are matched case-insensitively; anything else maps to [`TextCommand::Unknown`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum TextCommand {
    #[strum(serialize = "C_CONNECT")]
    Connect,
    #[strum(serialize = "S_CONNECT_PASS")]
    ConnectPass,
    #[strum(serialize = "C_LOGIN")]
    Login,
    #[strum(serialize = "S_LOGIN_PASS")]
    LoginPass,
    #[strum(serialize = "S_LOGIN_FAIL")]
    LoginFail,
    #[strum(serialize = "C_LOGOUT")]
    Logout,
    #[strum(serialize = "S_KICK")]
    Kick,
    #[strum(serialize = "C_PING")]
    Ping,
    #[strum(serialize = "S_PONG")]
    Pong,
    #[strum(serialize = "C_CHAT")]
    Chat,
    #[strum(serialize = "S_CHAT")]
    ChatBroadcast,
    #[strum(serialize = "UNKNOWN")]
    Unknown,
}

impl TextCommand {
    /// Look up a command name, falling back to `Unknown`.
    pub fn parse(name: &str) -> Self {
        name.parse().unwrap_or(TextCommand::Unknown)
    }

    /// Wire name of the command.
    #[inline]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// 16-bit binary command code.
///
/// Codes are assigned by the server; the constants below are the ones this
/// client knows about. Any other code is still routable if a handler is
/// registered for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinaryCommand(pub u16);

impl BinaryCommand {
    /// Full world state (inbound, envelope).
    pub const WORLD_SNAPSHOT: BinaryCommand = BinaryCommand(0x0001);
    /// Entities currently in scope (inbound, envelope).
    pub const ENTITY_LIST: BinaryCommand = BinaryCommand(0x0002);
    /// Entity left scope (inbound, envelope).
    pub const ENTITY_DESPAWN: BinaryCommand = BinaryCommand(0x0003);

    /// Ask for a fresh world snapshot (outbound, no fields).
    pub const WORLD_REQUEST: BinaryCommand = BinaryCommand(0x0101);
    /// Move an entity (outbound, id + position).
    pub const MOVE_REQUEST: BinaryCommand = BinaryCommand(0x0102);
    /// Interact with an entity (outbound, id + value).
    pub const INTERACT_REQUEST: BinaryCommand = BinaryCommand(0x0103);
    /// Select an entity (outbound, id).
    pub const SELECT_REQUEST: BinaryCommand = BinaryCommand(0x0104);
    /// Serialized trait state (outbound, id + raw state).
    pub const TRAIT_SYNC: BinaryCommand = BinaryCommand(0x0105);

    /// Numeric code.
    #[inline]
    pub fn code(self) -> u16 {
        self.0
    }

    /// Request shape used by the known outbound codes.
    pub fn request_shape(self) -> Option<ShapeKind> {
        match self {
            Self::WORLD_REQUEST => Some(ShapeKind::Empty),
            Self::MOVE_REQUEST => Some(ShapeKind::IdPosition),
            Self::INTERACT_REQUEST => Some(ShapeKind::IdValue),
            Self::SELECT_REQUEST => Some(ShapeKind::Id),
            Self::TRAIT_SYNC => Some(ShapeKind::Raw),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Routing key: a text command or a binary command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Text(TextCommand),
    Binary(BinaryCommand),
}

impl Command {
    /// Message kind this command travels as.
    #[inline]
    pub fn kind(&self) -> MessageKind {
        match self {
            Command::Text(_) => MessageKind::Text,
            Command::Binary(_) => MessageKind::Binary,
        }
    }

    /// Parse a text frame payload (`NAME|arg|arg`) into command and arguments.
    ///
    /// Unrecognised names yield `TextCommand::Unknown`; only invalid UTF-8 is an error.
    pub fn from_text_frame(payload: &Bytes) -> Result<(Command, CommandPayload)> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| NetError::Protocol(format!("Text frame is not UTF-8: {}", e)))?;
        let (command, fields) = TextPayload::parse(text);
        Ok((Command::Text(command), CommandPayload::Text(fields)))
    }

    /// Read the command code of a binary frame payload.
    ///
    /// The returned payload still contains the code, since response
    /// envelopes are parsed from the start of the frame.
    pub fn from_binary_frame(payload: Bytes) -> Result<(Command, CommandPayload)> {
        if payload.len() < 2 {
            return Err(NetError::Protocol(format!(
                "Binary frame of {} bytes has no command code",
                payload.len()
            )));
        }
        let code = u16::from_be_bytes([payload[0], payload[1]]);
        Ok((
            Command::Binary(BinaryCommand(code)),
            CommandPayload::Binary(BinaryPayload::new(payload)),
        ))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Text(cmd) => write!(f, "text:{}", cmd),
            Command::Binary(cmd) => write!(f, "binary:{}", cmd),
        }
    }
}

impl From<TextCommand> for Command {
    fn from(cmd: TextCommand) -> Self {
        Command::Text(cmd)
    }
}

impl From<BinaryCommand> for Command {
    fn from(cmd: BinaryCommand) -> Self {
        Command::Binary(cmd)
    }
}

/// Data carried alongside a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPayload {
    Text(TextPayload),
    Binary(BinaryPayload),
}

impl CommandPayload {
    /// Empty text argument list.
    pub fn empty_text() -> Self {
        CommandPayload::Text(TextPayload::default())
    }

    pub fn as_text(&self) -> Option<&TextPayload> {
        match self {
            CommandPayload::Text(p) => Some(p),
            CommandPayload::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&BinaryPayload> {
        match self {
            CommandPayload::Binary(p) => Some(p),
            CommandPayload::Text(_) => None,
        }
    }
}

impl From<TextPayload> for CommandPayload {
    fn from(payload: TextPayload) -> Self {
        CommandPayload::Text(payload)
    }
}

impl From<BinaryPayload> for CommandPayload {
    fn from(payload: BinaryPayload) -> Self {
        CommandPayload::Binary(payload)
    }
}

impl From<RequestShape> for CommandPayload {
    fn from(shape: RequestShape) -> Self {
        CommandPayload::Binary(shape.to_payload())
    }
}

/// Inbound bus item.
pub type CommandMessage = (Command, CommandPayload);
