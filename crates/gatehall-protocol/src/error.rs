//! Error types for the protocol layer.
//!
//! Every error here is recoverable from the connection's point of view:
//! the pipeline logs it, drops the frame, and keeps reading. Nothing in
//! this enum should ever tear down a connection by itself.

use crate::MessageType;

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization of an outbound message body failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The payload text could not be decoded into the expected variant.
    ///
    /// Covers malformed JSON, missing fields, wrong field types, and
    /// invalid UTF-8 (the body is defined as UTF-8 text on the wire).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The 4-byte type code at the start of the payload is not in the
    /// [`MessageType`](crate::MessageType) registry. The frame is dropped;
    /// the connection stays open.
    #[error("unknown message type code: {0}")]
    UnknownType(i32),

    /// The type code is registered but has no decodable variant.
    ///
    /// ERROR (9999) is the one such code: it is reserved in the registry
    /// but carries no message body the server knows how to read.
    #[error("message type {0} has no decodable variant")]
    Unsupported(MessageType),

    /// The payload is shorter than the 4-byte type code.
    #[error("frame payload too short: {len} bytes")]
    Truncated { len: usize },
}
