//! Built-in handlers.
//!
//! - [`TextRequest`] / [`BinaryRequest`] encode outbound requests and hand
//!   them to the sink. They keep their output buffer between messages.
//! - [`TextHandler`], [`BinaryHandler`], [`EnvelopeHandler`] and
//!   [`TypedEnvelopeHandler`] adapt closures for inbound responses.

use std::marker::PhantomData;

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;

use super::{CommandHandler, HandlerContext, HandlerResult};
use crate::command::{
    BinaryCommand, BinaryEnvelope, BinaryPayload, Command, CommandPayload, TextCommand,
    TextPayload,
};
use crate::error::NetError;
use crate::protocol::MessageKind;

fn expect_text_command(ctx: &HandlerContext<'_>) -> Result<TextCommand, NetError> {
    match ctx.command() {
        Command::Text(cmd) => Ok(cmd),
        other => Err(NetError::Handler(format!("{} is not a text command", other))),
    }
}

fn expect_binary_command(ctx: &HandlerContext<'_>) -> Result<BinaryCommand, NetError> {
    match ctx.command() {
        Command::Binary(cmd) => Ok(cmd),
        other => Err(NetError::Handler(format!("{} is not a binary command", other))),
    }
}

fn expect_text<'p>(
    payload: &'p CommandPayload,
    command: Command,
) -> Result<&'p TextPayload, NetError> {
    payload
        .as_text()
        .ok_or_else(|| NetError::Handler(format!("{} expects a text payload", command)))
}

fn expect_binary<'p>(
    payload: &'p CommandPayload,
    command: Command,
) -> Result<&'p BinaryPayload, NetError> {
    payload
        .as_binary()
        .ok_or_else(|| NetError::Handler(format!("{} expects a binary payload", command)))
}

/// Encodes `NAME|arg|arg` and sends it as a text frame.
#[derive(Debug, Default)]
pub struct TextRequest {
    line: String,
}

impl TextRequest {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommandHandler for TextRequest {
    fn handle(&mut self, payload: &CommandPayload, ctx: &mut HandlerContext<'_>) -> HandlerResult {
        let command = expect_text_command(ctx)?;
        let fields = expect_text(payload, ctx.command())?;

        self.line.clear();
        fields.write_to(command, &mut self.line);
        ctx.send(MessageKind::Text, Bytes::copy_from_slice(self.line.as_bytes()));
        Ok(())
    }
}

/// Encodes `[code u16 BE][body]` and sends it as a binary frame.
///
/// Bodies for codes with a known request shape are length-checked first.
#[derive(Debug, Default)]
pub struct BinaryRequest {
    buf: BytesMut,
}

impl BinaryRequest {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommandHandler for BinaryRequest {
    fn handle(&mut self, payload: &CommandPayload, ctx: &mut HandlerContext<'_>) -> HandlerResult {
        let command = expect_binary_command(ctx)?;
        let body = expect_binary(payload, ctx.command())?;

        if let Some(shape) = command.request_shape() {
            if !shape.accepts_len(body.len()) {
                return Err(NetError::Handler(format!(
                    "{} expects a {:?} body, got {} bytes",
                    command,
                    shape,
                    body.len()
                )));
            }
        }

        self.buf.reserve(2 + body.len());
        self.buf.put_u16(command.code());
        self.buf.put_slice(body.as_bytes());
        ctx.send(MessageKind::Binary, self.buf.split().freeze());
        Ok(())
    }
}

/// Closure over a text payload.
pub struct TextHandler<F> {
    f: F,
}

impl<F> TextHandler<F>
where
    F: FnMut(&TextPayload, &mut HandlerContext<'_>) -> HandlerResult + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> CommandHandler for TextHandler<F>
where
    F: FnMut(&TextPayload, &mut HandlerContext<'_>) -> HandlerResult + Send + 'static,
{
    fn handle(&mut self, payload: &CommandPayload, ctx: &mut HandlerContext<'_>) -> HandlerResult {
        let fields = expect_text(payload, ctx.command())?;
        (self.f)(fields, ctx)
    }
}

/// Closure over a raw binary payload.
pub struct BinaryHandler<F> {
    f: F,
}

impl<F> BinaryHandler<F>
where
    F: FnMut(&BinaryPayload, &mut HandlerContext<'_>) -> HandlerResult + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> CommandHandler for BinaryHandler<F>
where
    F: FnMut(&BinaryPayload, &mut HandlerContext<'_>) -> HandlerResult + Send + 'static,
{
    fn handle(&mut self, payload: &CommandPayload, ctx: &mut HandlerContext<'_>) -> HandlerResult {
        let body = expect_binary(payload, ctx.command())?;
        (self.f)(body, ctx)
    }
}

/// Closure over a validated response envelope.
///
/// Envelopes that fail their length checks never reach the closure.
pub struct EnvelopeHandler<F> {
    f: F,
}

impl<F> EnvelopeHandler<F>
where
    F: FnMut(&BinaryEnvelope, &mut HandlerContext<'_>) -> HandlerResult + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> CommandHandler for EnvelopeHandler<F>
where
    F: FnMut(&BinaryEnvelope, &mut HandlerContext<'_>) -> HandlerResult + Send + 'static,
{
    fn handle(&mut self, payload: &CommandPayload, ctx: &mut HandlerContext<'_>) -> HandlerResult {
        let body = expect_binary(payload, ctx.command())?;
        let envelope = BinaryEnvelope::parse(body)?;
        (self.f)(&envelope, ctx)
    }
}

/// Wrapper that decodes the envelope body with MsgPack before calling the closure.
pub struct TypedEnvelopeHandler<F, T> {
    f: F,
    _phantom: PhantomData<fn() -> T>,
}

impl<F, T> TypedEnvelopeHandler<F, T>
where
    F: FnMut(T, &mut HandlerContext<'_>) -> HandlerResult + Send + 'static,
    T: DeserializeOwned + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

impl<F, T> CommandHandler for TypedEnvelopeHandler<F, T>
where
    F: FnMut(T, &mut HandlerContext<'_>) -> HandlerResult + Send + 'static,
    T: DeserializeOwned + 'static,
{
    fn handle(&mut self, payload: &CommandPayload, ctx: &mut HandlerContext<'_>) -> HandlerResult {
        let body = expect_binary(payload, ctx.command())?;
        let value: T = BinaryEnvelope::parse(body)?.decode()?;
        (self.f)(value, ctx)
    }
}
