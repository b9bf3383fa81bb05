//! Dispatch module - command routing to lazily created handlers.
//!
//! Provides:
//! - [`CommandRegistry`] - maps command keys to handler factories and instances
//! - [`Dispatcher`] - routes a command by its tag and contains handler failures
//! - [`HandlerContext`] - lets handlers send frames and raise follow-up commands
//! - built-in request encoders and closure adapters
//!
//! # Example
//!
//! ```ignore
//! use tickwire::dispatch::{Dispatcher, HandlerContext, TextHandler};
//! use tickwire::command::{TextCommand, TextPayload};
//!
//! let mut inbound = Dispatcher::new("inbound");
//!
//! inbound.register_text(TextCommand::LoginPass, || {
//!     TextHandler::new(|fields: &TextPayload, _ctx: &mut HandlerContext<'_>| {
//!         tracing::info!("Logged in as {:?}", fields.get(0));
//!         Ok(())
//!     })
//! });
//! ```

mod context;
mod dispatcher;
mod handlers;
mod registry;
mod routes;

pub use context::{FrameSink, HandlerContext};
pub use dispatcher::{DispatchOutcome, DispatchStats, Dispatcher};
pub use handlers::{
    BinaryHandler, BinaryRequest, EnvelopeHandler, TextHandler, TextRequest, TypedEnvelopeHandler,
};
pub use registry::{CommandHandler, CommandRegistry, HandlerFactory, HandlerResult};
pub use routes::{register_default_requests, RouteConstructor, REQUEST_ROUTES};
