//! Static route table for outbound requests.
//!
//! Every request the client can send is listed here with the handler that
//! encodes it. The table is the single place to look when adding a new
//! request code.

use super::{BinaryRequest, CommandHandler, Dispatcher, TextRequest};
use crate::command::{BinaryCommand, Command, TextCommand};

/// Handler constructor stored in a route table.
pub type RouteConstructor = fn() -> Box<dyn CommandHandler>;

fn text_request() -> Box<dyn CommandHandler> {
    Box::new(TextRequest::new())
}

fn binary_request() -> Box<dyn CommandHandler> {
    Box::new(BinaryRequest::new())
}

/// Outbound requests and their encoders.
pub static REQUEST_ROUTES: &[(Command, RouteConstructor)] = &[
    (Command::Text(TextCommand::Connect), text_request),
    (Command::Text(TextCommand::Login), text_request),
    (Command::Text(TextCommand::Logout), text_request),
    (Command::Text(TextCommand::Ping), text_request),
    (Command::Text(TextCommand::Chat), text_request),
    (Command::Binary(BinaryCommand::WORLD_REQUEST), binary_request),
    (Command::Binary(BinaryCommand::MOVE_REQUEST), binary_request),
    (Command::Binary(BinaryCommand::INTERACT_REQUEST), binary_request),
    (Command::Binary(BinaryCommand::SELECT_REQUEST), binary_request),
    (Command::Binary(BinaryCommand::TRAIT_SYNC), binary_request),
];

/// Register every route in [`REQUEST_ROUTES`]. Returns how many were new.
pub fn register_default_requests(dispatcher: &mut Dispatcher) -> usize {
    REQUEST_ROUTES
        .iter()
        .filter(|(command, ctor)| dispatcher.register_boxed(*command, Box::new(*ctor)))
        .count()
}
