//! Client builder and per-tick driver.
//!
//! The [`ClientBuilder`] provides a fluent API for registering inbound
//! handlers and outbound request encoders. The built [`Client`] wires:
//!
//! ```text
//! Transport ─► raw buses ─► inbound bus ─► inbound Dispatcher ─┐ raised
//!     ▲                                                        ▼
//!     └──────── outbound Dispatcher ◄─ outbound bus ◄── request() / SyncScheduler
//! ```
//!
//! Everything except socket I/O runs on the thread calling [`Client::tick`].
//!
//! # Example
//!
//! ```no_run
//! use tickwire::command::{TextCommand, TextPayload};
//! use tickwire::dispatch::HandlerContext;
//! use tickwire::Client;
//!
//! let mut client = Client::builder()
//!     .host("127.0.0.1")
//!     .port(7000)
//!     .on_text(TextCommand::ConnectPass, |_: &TextPayload, ctx: &mut HandlerContext<'_>| {
//!         ctx.raise(TextCommand::Login, TextPayload::from_fields(["alice", "secret"]));
//!         Ok(())
//!     })
//!     .build()
//!     .unwrap();
//!
//! client.connect();
//! loop {
//!     client.tick(1.0 / 30.0);
//!     # break;
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;

use crate::bus::CommandBus;
use crate::command::{
    BinaryCommand, BinaryEnvelope, Command, CommandMessage, CommandPayload, TextCommand,
    TextPayload,
};
use crate::config::ClientConfig;
use crate::dispatch::{
    register_default_requests, BinaryRequest, CommandHandler, DispatchStats, Dispatcher,
    EnvelopeHandler, FrameSink, HandlerContext, HandlerResult, TextHandler, TextRequest,
    TypedEnvelopeHandler,
};
use crate::error::Result;
use crate::sync::SyncScheduler;
use crate::transport::{ConnectionEvent, Transport};

fn lock(dispatcher: &Mutex<Dispatcher>) -> MutexGuard<'_, Dispatcher> {
    dispatcher.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dispatch one message, then publish whatever its handler raised.
///
/// The dispatcher lock is released before publishing so raised commands
/// may be routed back through the same dispatcher.
fn dispatch_and_forward(
    dispatcher: &Mutex<Dispatcher>,
    message: &CommandMessage,
    forward: &CommandBus<CommandMessage>,
) {
    let raised: Vec<CommandMessage> = {
        let mut dispatcher = lock(dispatcher);
        dispatcher.dispatch_message(message);
        dispatcher.drain_raised().collect()
    };
    for message in &raised {
        forward.publish(message);
    }
}

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    runtime: Option<Handle>,
    inbound: Dispatcher,
    outbound: Dispatcher,
    default_requests: bool,
    connection_listeners: Vec<Box<dyn Fn(&ConnectionEvent) + Send + Sync>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            runtime: None,
            inbound: Dispatcher::new("inbound"),
            outbound: Dispatcher::new("outbound"),
            default_requests: true,
            connection_listeners: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.transport.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.transport.port = port;
        self
    }

    /// Largest accepted frame length, kind byte included.
    pub fn max_message_size(mut self, size: u32) -> Self {
        self.config.transport.max_message_size = size;
        self
    }

    /// Frames queued on the writer before sends start being dropped.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.writer.max_pending_frames = limit;
        self
    }

    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Run socket I/O on an existing runtime instead of a private one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Whether to register the built-in encoders for every known request.
    ///
    /// Default: true
    pub fn default_requests(mut self, enabled: bool) -> Self {
        self.default_requests = enabled;
        self
    }

    /// Handle an inbound text command with a closure.
    pub fn on_text<F>(mut self, command: TextCommand, f: F) -> Self
    where
        F: FnMut(&TextPayload, &mut HandlerContext<'_>) -> HandlerResult + Clone + Send + 'static,
    {
        self.inbound
            .register_text(command, move || TextHandler::new(f.clone()));
        self
    }

    /// Handle an inbound binary response envelope with a closure.
    pub fn on_binary<F>(mut self, command: BinaryCommand, f: F) -> Self
    where
        F: FnMut(&BinaryEnvelope, &mut HandlerContext<'_>) -> HandlerResult
            + Clone
            + Send
            + 'static,
    {
        self.inbound
            .register_binary(command, move || EnvelopeHandler::new(f.clone()));
        self
    }

    /// Handle an inbound binary response whose body decodes to `T`.
    pub fn on_message<T, F>(mut self, command: BinaryCommand, f: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: FnMut(T, &mut HandlerContext<'_>) -> HandlerResult + Clone + Send + 'static,
    {
        self.inbound
            .register_binary(command, move || TypedEnvelopeHandler::new(f.clone()));
        self
    }

    /// Register an inbound handler type.
    pub fn handler<F, H>(mut self, command: impl Into<Command>, factory: F) -> Self
    where
        F: Fn() -> H + Send + 'static,
        H: CommandHandler,
    {
        self.inbound.register(command, factory);
        self
    }

    /// Register an outbound request encoder.
    pub fn request_handler<F, H>(mut self, command: impl Into<Command>, factory: F) -> Self
    where
        F: Fn() -> H + Send + 'static,
        H: CommandHandler,
    {
        self.outbound.register(command, factory);
        self
    }

    /// Encode an extra text request with the built-in `NAME|arg` encoder.
    pub fn request_text(self, command: TextCommand) -> Self {
        self.request_handler(command, TextRequest::new)
    }

    /// Encode an extra binary request with the built-in code-prefix encoder.
    pub fn request_binary(self, command: BinaryCommand) -> Self {
        self.request_handler(command, BinaryRequest::new)
    }

    /// Observe connection state changes.
    pub fn on_connection<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.connection_listeners.push(Box::new(f));
        self
    }

    /// Build the client. Does not connect.
    ///
    /// # Errors
    ///
    /// Fails only if a private I/O runtime cannot be created.
    pub fn build(self) -> Result<Client> {
        let ClientBuilder {
            config,
            runtime,
            mut inbound,
            mut outbound,
            default_requests,
            connection_listeners,
        } = self;

        let transport = match runtime {
            Some(handle) => {
                Transport::with_handle(config.transport.clone(), config.writer.clone(), handle)
            }
            None => Transport::new(config.transport.clone(), config.writer.clone())?,
        };

        let sink: Arc<dyn FrameSink> = Arc::new(transport.sender());
        inbound.set_sink(sink.clone());
        outbound.set_sink(sink);
        if default_requests {
            register_default_requests(&mut outbound);
        }

        let inbound = Arc::new(Mutex::new(inbound));
        let outbound = Arc::new(Mutex::new(outbound));
        let inbound_bus: CommandBus<CommandMessage> = CommandBus::new();
        let outbound_bus: CommandBus<CommandMessage> = CommandBus::new();

        {
            let dispatcher = inbound.clone();
            let forward = outbound_bus.clone();
            inbound_bus.subscribe_fn(move |message: &CommandMessage| {
                dispatch_and_forward(&dispatcher, message, &forward)
            });
        }
        {
            let dispatcher = outbound.clone();
            let forward = outbound_bus.clone();
            outbound_bus.subscribe_fn(move |message: &CommandMessage| {
                dispatch_and_forward(&dispatcher, message, &forward)
            });
        }
        {
            let bus = inbound_bus.clone();
            transport
                .text_bus()
                .subscribe_fn(move |raw: &Bytes| match Command::from_text_frame(raw) {
                    Ok(message) => bus.publish(&message),
                    Err(e) => tracing::warn!("Dropping text frame: {}", e),
                });
        }
        {
            let bus = inbound_bus.clone();
            transport
                .binary_bus()
                .subscribe_fn(move |raw: &Bytes| match Command::from_binary_frame(raw.clone()) {
                    Ok(message) => bus.publish(&message),
                    Err(e) => tracing::warn!("Dropping binary frame: {}", e),
                });
        }
        for listener in connection_listeners {
            transport.connection_events().subscribe_fn(listener);
        }

        let scheduler = SyncScheduler::new(outbound_bus.clone());

        Ok(Client {
            transport,
            scheduler,
            inbound_bus,
            outbound_bus,
            inbound,
            outbound,
            config,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A game connection with its dispatchers and trait scheduler.
pub struct Client {
    transport: Transport,
    scheduler: SyncScheduler,
    inbound_bus: CommandBus<CommandMessage>,
    outbound_bus: CommandBus<CommandMessage>,
    inbound: Arc<Mutex<Dispatcher>>,
    outbound: Arc<Mutex<Dispatcher>>,
    config: ClientConfig,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Start connecting to the configured server in the background.
    pub fn connect(&self) {
        let transport = &self.config.transport;
        self.transport.connect(transport.host.clone(), transport.port);
    }

    /// Start connecting to a specific server in the background.
    pub fn connect_to(&self, host: impl Into<String>, port: u16) {
        self.transport.connect(host, port);
    }

    /// Connect to the configured server and wait for the outcome.
    pub async fn connect_async(&self) -> Result<()> {
        let transport = &self.config.transport;
        self.transport
            .connect_async(&transport.host, transport.port)
            .await
    }

    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Run one game tick: deliver inbound messages, then update traits and
    /// flush their syncs. Returns the number of inbound items delivered.
    pub fn tick(&mut self, delta: f32) -> usize {
        let delivered = self.transport.pump();
        self.scheduler.tick(delta);
        delivered
    }

    /// Send a request through the outbound dispatcher.
    pub fn request(&self, command: impl Into<Command>, payload: impl Into<CommandPayload>) {
        self.outbound_bus.publish(&(command.into(), payload.into()));
    }

    pub fn scheduler(&mut self) -> &mut SyncScheduler {
        &mut self.scheduler
    }

    /// Decoded inbound commands, before dispatch.
    pub fn inbound_bus(&self) -> &CommandBus<CommandMessage> {
        &self.inbound_bus
    }

    /// Outbound intents, before encoding.
    pub fn outbound_bus(&self) -> &CommandBus<CommandMessage> {
        &self.outbound_bus
    }

    pub fn connection_events(&self) -> &CommandBus<ConnectionEvent> {
        self.transport.connection_events()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn inbound_stats(&self) -> DispatchStats {
        lock(&self.inbound).stats()
    }

    pub fn outbound_stats(&self) -> DispatchStats {
        lock(&self.outbound).stats()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.transport.disconnect();
        // Listeners hold bus clones; clearing breaks the reference cycles.
        self.inbound_bus.clear();
        self.outbound_bus.clear();
        lock(&self.inbound).dispose();
        lock(&self.outbound).dispose();
    }
}
