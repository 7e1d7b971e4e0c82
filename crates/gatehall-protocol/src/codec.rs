//! Frame codec: the `typeCode | payload` unit inside every frame.
//!
//! The transport strips the 4-byte length prefix and hands the rest to
//! [`FrameCodec::decode`]; encode produces the same unit for the
//! transport to prefix and write. Body serialization is pluggable
//! behind the [`Codec`] trait — the wire contract only requires that
//! `decode(encode(m))` reproduces the message. [`JsonCodec`] is the
//! default (and the format existing clients speak).

use std::fmt;
use std::sync::Arc;

use crate::{Body, Message, MessageType, ProtocolError};

/// Serializes message bodies to payload bytes and back.
///
/// `decode` receives the already-resolved [`MessageType`], so an
/// implementation dispatches through an explicit per-type table — the
/// integer code stays the sole discriminator, and no type tag needs to
/// live inside the payload text.
///
/// Dyn-compatible by design: sessions and pipelines hold the codec as
/// `Arc<dyn Codec>` without generics spreading through every layer.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a message body (with its id and timestamp) to bytes.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes payload bytes into the variant registered for `ty`.
    fn decode(&self, ty: MessageType, payload: &[u8]) -> Result<Message, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that speaks JSON via `serde_json`.
///
/// Payload shape: `messageId` and `timestamp` alongside the variant's
/// fields, all flattened at the top level:
///
/// ```text
/// {"messageId":"4f…","timestamp":1719220000000,"username":"alice","password":"…"}
/// ```
///
/// Behind the `json` feature flag (enabled by default).
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

/// The JSON layout of one payload: message metadata plus the body's own
/// fields flattened beside it.
#[cfg(feature = "json")]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct Wire<T> {
    message_id: crate::MessageId,
    timestamp: u64,
    #[serde(flatten)]
    body: T,
}

#[cfg(feature = "json")]
impl JsonCodec {
    fn encode_body<T: serde::Serialize>(
        &self,
        message: &Message,
        body: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(&Wire {
            message_id: message.message_id.clone(),
            timestamp: message.timestamp,
            body,
        })
        .map_err(ProtocolError::Encode)
    }

    fn decode_body<T: serde::de::DeserializeOwned>(
        &self,
        payload: &[u8],
    ) -> Result<Wire<T>, ProtocolError> {
        serde_json::from_slice(payload).map_err(ProtocolError::Decode)
    }
}

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        match &message.body {
            Body::Login(b) => self.encode_body(message, b),
            Body::LoginResponse(b) => self.encode_body(message, b),
            Body::Chat(b) => self.encode_body(message, b),
            Body::ChatResponse(b) => self.encode_body(message, b),
            Body::Heartbeat(b) => self.encode_body(message, b),
        }
    }

    fn decode(&self, ty: MessageType, payload: &[u8]) -> Result<Message, ProtocolError> {
        // The explicit code → decode-function table. ERROR is registered
        // but has no body the server can read.
        let (message_id, timestamp, body) = match ty {
            MessageType::Login => {
                let w = self.decode_body::<crate::Login>(payload)?;
                (w.message_id, w.timestamp, Body::Login(w.body))
            }
            MessageType::LoginResponse => {
                let w = self.decode_body::<crate::LoginResponse>(payload)?;
                (w.message_id, w.timestamp, Body::LoginResponse(w.body))
            }
            MessageType::Chat => {
                let w = self.decode_body::<crate::Chat>(payload)?;
                (w.message_id, w.timestamp, Body::Chat(w.body))
            }
            MessageType::ChatResponse => {
                let w = self.decode_body::<crate::ChatResponse>(payload)?;
                (w.message_id, w.timestamp, Body::ChatResponse(w.body))
            }
            MessageType::Heartbeat => {
                let w = self.decode_body::<crate::Heartbeat>(payload)?;
                (w.message_id, w.timestamp, Body::Heartbeat(w.body))
            }
            MessageType::Error => return Err(ProtocolError::Unsupported(ty)),
        };

        Ok(Message {
            message_id,
            timestamp,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// Encodes and decodes the wire unit: `i32 BE typeCode | body bytes`.
///
/// Cheap to clone — the body codec is shared behind an `Arc`. The
/// maximum payload size is enforced by the transport framing, not here.
#[derive(Clone)]
pub struct FrameCodec {
    body: Arc<dyn Codec>,
}

impl FrameCodec {
    /// Wraps a body codec.
    pub fn new(codec: impl Codec) -> Self {
        Self {
            body: Arc::new(codec),
        }
    }

    /// A frame codec with the default JSON body format.
    #[cfg(feature = "json")]
    pub fn json() -> Self {
        Self::new(JsonCodec)
    }

    /// Encodes a message to `typeCode | body`.
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, ProtocolError> {
        let body = self.body.encode(message)?;
        let mut payload = Vec::with_capacity(4 + body.len());
        payload.extend_from_slice(&message.message_type().code().to_be_bytes());
        payload.extend_from_slice(&body);
        Ok(payload)
    }

    /// Decodes one frame payload.
    ///
    /// # Errors
    /// Soft failures only: [`ProtocolError::Truncated`] for payloads
    /// shorter than the type code, [`ProtocolError::UnknownType`] for
    /// unregistered codes, and body decode errors. Callers drop the
    /// frame and keep the connection.
    pub fn decode(&self, payload: &[u8]) -> Result<Message, ProtocolError> {
        if payload.len() < 4 {
            return Err(ProtocolError::Truncated { len: payload.len() });
        }
        let code = i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let ty = MessageType::from_code(code).ok_or(ProtocolError::UnknownType(code))?;
        self.body.decode(ty, &payload[4..])
    }
}

#[cfg(feature = "json")]
impl Default for FrameCodec {
    fn default() -> Self {
        Self::json()
    }
}

impl fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCodec").finish_non_exhaustive()
    }
}

// =========================================================================
// Tests
// =========================================================================
