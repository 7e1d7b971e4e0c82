//! Wire protocol for Gatehall.
//!
//! This crate defines what travels between a game client and the server:
//!
//! - **Types** ([`Message`], [`Body`], [`MessageType`], [`ChatChannel`]) —
//!   the typed message model and the type-tag registry.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`], [`FrameCodec`]) — how a
//!   message becomes the `typeCode | payload` unit inside a frame.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while encoding
//!   or decoding. None of it is fatal to a connection; callers drop the
//!   offending frame and move on.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (length-prefixed byte frames)
//! and session (player identity). It knows nothing about connections or
//! sessions — only how a frame payload maps to a [`Message`] and back.
//!
//! ```text
//! Transport (frames) → Protocol (Message) → Session/Handlers (player context)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, FrameCodec};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    now_millis, Body, Chat, ChatChannel, ChatResponse, Heartbeat, Login,
    LoginResponse, Message, MessageId, MessageType, PlayerId,
};
