//! Message routing: the handler trait and the per-type handler registry.
//!
//! The registry is built once at startup and passed by reference into
//! every connection pipeline — there is no ambient global handler state.

use std::collections::HashMap;
use std::sync::Arc;

use gatehall_protocol::{Message, MessageType};
use gatehall_session::Session;

use crate::GatehallError;

/// A business handler for one message type.
///
/// Handlers are synchronous: every side effect they need — sending a
/// response, broadcasting, touching the registry — is a non-blocking
/// operation, so a handler can never stall its connection's event loop.
///
/// An `Err` return is contained by the dispatcher: it is logged against
/// the session and the connection keeps processing subsequent messages.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, session: &Arc<Session>, message: Message) -> Result<(), GatehallError>;
}

/// Maps message types to their registered handlers.
pub struct HandlerRegistry {
    handlers: HashMap<MessageType, Box<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for a message type, replacing any previous one.
    pub fn register(&mut self, ty: MessageType, handler: impl MessageHandler + 'static) {
        if self.handlers.insert(ty, Box::new(handler)).is_some() {
            tracing::warn!(%ty, "replacing previously registered handler");
        }
    }

    /// The message types that currently have a handler.
    pub fn registered_types(&self) -> Vec<MessageType> {
        self.handlers.keys().copied().collect()
    }

    /// Routes a message to the handler registered for its type tag.
    ///
    /// No handler → the message is dropped with a diagnostic. A handler
    /// error is logged and contained; neither case affects the
    /// connection.
    pub fn dispatch(&self, session: &Arc<Session>, message: Message) {
        let ty = message.message_type();
        let Some(handler) = self.handlers.get(&ty) else {
            tracing::warn!(%ty, session = %session.id(), "no handler registered, dropping message");
            return;
        };
        if let Err(e) = handler.handle(session, message) {
            tracing::error!(
                %ty,
                session = %session.id(),
                error = %e,
                "error handling message"
            );
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
