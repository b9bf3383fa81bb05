//! Dispatcher - routes one command to its cached handler.
//!
//! A dispatcher owns two registries, one for text commands and one for
//! binary codes, so routing is a single hash lookup on the command's tag.
//! The client runs two of them: one for inbound responses and one for
//! outbound requests.
//!
//! Failures never escape `dispatch`. A missing handler, an `Err` from the
//! handler or a panic inside it is logged and the message is dropped; the
//! next message is dispatched normally. A factory that panics while
//! creating its handler is unregistered, so its command stays unroutable.

use std::any::Any;
use std::fmt::Display;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::{CommandHandler, CommandRegistry, FrameSink, HandlerContext, HandlerFactory};
use crate::command::{BinaryCommand, Command, CommandMessage, CommandPayload, TextCommand};

/// What happened to a dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran and returned `Ok`.
    Handled,
    /// No handler was registered, or the command was unknown.
    Unhandled,
    /// The handler returned an error or panicked.
    Failed,
}

/// Running totals per dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: u64,
    pub unhandled: u64,
    pub failed: u64,
}

/// Routes commands to handlers created on demand.
pub struct Dispatcher {
    name: &'static str,
    text: CommandRegistry<TextCommand>,
    binary: CommandRegistry<BinaryCommand>,
    sink: Option<Arc<dyn FrameSink>>,
    /// Commands raised by handlers, waiting for the owner to publish them.
    raised: Vec<CommandMessage>,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Create a dispatcher with no sink. `name` appears in log lines.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            text: CommandRegistry::new(name),
            binary: CommandRegistry::new(name),
            sink: None,
            raised: Vec::new(),
            stats: DispatchStats::default(),
        }
    }

    /// Create a dispatcher whose handlers can write frames.
    pub fn with_sink(name: &'static str, sink: Arc<dyn FrameSink>) -> Self {
        let mut dispatcher = Self::new(name);
        dispatcher.sink = Some(sink);
        dispatcher
    }

    pub fn set_sink(&mut self, sink: Arc<dyn FrameSink>) {
        self.sink = Some(sink);
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a handler constructor for a text command.
    pub fn register_text<F, H>(&mut self, command: TextCommand, factory: F) -> bool
    where
        F: Fn() -> H + Send + 'static,
        H: CommandHandler,
    {
        self.text.register(command, factory)
    }

    /// Register a handler constructor for a binary command code.
    pub fn register_binary<F, H>(&mut self, command: BinaryCommand, factory: F) -> bool
    where
        F: Fn() -> H + Send + 'static,
        H: CommandHandler,
    {
        self.binary.register(command, factory)
    }

    /// Register a constructor for either kind of command.
    pub fn register<F, H>(&mut self, command: impl Into<Command>, factory: F) -> bool
    where
        F: Fn() -> H + Send + 'static,
        H: CommandHandler,
    {
        match command.into() {
            Command::Text(cmd) => self.register_text(cmd, factory),
            Command::Binary(cmd) => self.register_binary(cmd, factory),
        }
    }

    /// Register an already boxed constructor.
    pub fn register_boxed(&mut self, command: Command, factory: HandlerFactory) -> bool {
        match command {
            Command::Text(cmd) => self.text.register_boxed(cmd, factory),
            Command::Binary(cmd) => self.binary.register_boxed(cmd, factory),
        }
    }

    /// Whether a handler constructor exists for `command`.
    pub fn is_registered(&self, command: Command) -> bool {
        match command {
            Command::Text(cmd) => self.text.is_registered(cmd),
            Command::Binary(cmd) => self.binary.is_registered(cmd),
        }
    }

    /// Route one message.
    pub fn dispatch(&mut self, command: Command, payload: &CommandPayload) -> DispatchOutcome {
        let created = match command {
            Command::Text(TextCommand::Unknown) => {
                tracing::warn!("{} dispatcher dropping unknown text command", self.name);
                self.stats.unhandled += 1;
                return DispatchOutcome::Unhandled;
            }
            Command::Text(cmd) => instantiate(&mut self.text, cmd),
            Command::Binary(cmd) => instantiate(&mut self.binary, cmd),
        };
        if let Err(reason) = created {
            tracing::error!(
                "{} handler factory for {} panicked, unregistering: {}",
                self.name,
                command,
                reason
            );
            self.stats.failed += 1;
            return DispatchOutcome::Failed;
        }

        let handler = match command {
            Command::Text(cmd) => self.text.resolve(cmd),
            Command::Binary(cmd) => self.binary.resolve(cmd),
        };
        let Some(handler) = handler else {
            self.stats.unhandled += 1;
            return DispatchOutcome::Unhandled;
        };

        let mark = self.raised.len();
        let mut ctx = HandlerContext::new(command, self.sink.as_deref(), &mut self.raised);
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(payload, &mut ctx)));

        match result {
            Ok(Ok(())) => {
                self.stats.handled += 1;
                DispatchOutcome::Handled
            }
            Ok(Err(e)) => {
                tracing::error!("{} handler for {} failed: {}", self.name, command, e);
                self.raised.truncate(mark);
                self.stats.failed += 1;
                DispatchOutcome::Failed
            }
            Err(panic) => {
                tracing::error!(
                    "{} handler for {} panicked: {}",
                    self.name,
                    command,
                    panic_message(panic.as_ref())
                );
                self.raised.truncate(mark);
                self.stats.failed += 1;
                DispatchOutcome::Failed
            }
        }
    }

    /// Route a `(command, payload)` pair.
    pub fn dispatch_message(&mut self, message: &CommandMessage) -> DispatchOutcome {
        self.dispatch(message.0, &message.1)
    }

    /// Take the commands raised by handlers since the last drain, in order.
    pub fn drain_raised(&mut self) -> std::vec::Drain<'_, CommandMessage> {
        self.raised.drain(..)
    }

    pub fn has_raised(&self) -> bool {
        !self.raised.is_empty()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Number of handler instances created so far.
    pub fn active_handlers(&self) -> usize {
        self.text.active_count() + self.binary.active_count()
    }

    /// Drop every cached handler and pending raised command.
    pub fn dispose(&mut self) {
        tracing::debug!(
            "Disposing {} dispatcher ({} handlers)",
            self.name,
            self.active_handlers()
        );
        self.text.dispose();
        self.binary.dispose();
        self.raised.clear();
    }
}

/// Create the handler for `key` if it does not exist yet, containing a
/// panicking factory. The factory is unregistered when it panics.
fn instantiate<K>(registry: &mut CommandRegistry<K>, key: K) -> Result<(), String>
where
    K: Copy + Eq + Hash + Display,
{
    if registry.is_active(key) || !registry.is_registered(key) {
        return Ok(());
    }
    match panic::catch_unwind(AssertUnwindSafe(|| registry.resolve(key).is_some())) {
        Ok(_) => Ok(()),
        Err(panic) => {
            registry.unregister(key);
            Err(panic_message(panic.as_ref()).to_string())
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
