//! Unified error type for the Gatehall server.

use gatehall_protocol::{MessageType, ProtocolError};
use gatehall_transport::TransportError;

/// Top-level error that wraps the layer-specific errors.
///
/// The server and binary deal with this single type; the `#[from]`
/// attributes let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GatehallError {
    /// A transport-level error (bind, accept, read, write).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unknown type).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A message reached a handler whose type it doesn't accept.
    /// Contained by the dispatcher: logged, connection left open.
    #[error("unexpected message type {got} for {handler}")]
    UnexpectedMessage {
        handler: &'static str,
        got: MessageType,
    },
}
