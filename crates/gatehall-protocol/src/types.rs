//! Core protocol types: the message model and the type-tag registry.
//!
//! Every application-level unit on the wire is a [`Message`]: a stable
//! message id, a creation timestamp, and one [`Body`] variant. The
//! [`MessageType`] registry maps each variant to the integer code that
//! discriminates it on the wire.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
///
/// Wall-clock time, not monotonic — these values travel on the wire
/// (message timestamps, heartbeat echoes), so they must mean the same
/// thing to the client.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's identity, derived at login time.
///
/// Newtype over the id string so a player id can't be confused with any
/// other string in a signature. `#[serde(transparent)]` keeps the wire
/// representation a plain JSON string.
///
/// The derivation policy is `"player_" + username` (see the login
/// handler). It is not collision-resistant across case variants of the
/// same name; callers needing globally unique identity must plug in a
/// stronger scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A per-message identifier: unique, but not globally ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generates a fresh random id (16 hex chars, 64 bits of entropy).
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 8] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageType registry
// ---------------------------------------------------------------------------

/// The type-tag registry: every message variant's integer code and label.
///
/// The code is the sole discriminator on the wire and for in-process
/// routing. ERROR is registered (clients may emit it) but has no
/// decodable variant on the server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Login,
    LoginResponse,
    Chat,
    ChatResponse,
    Heartbeat,
    Error,
}

impl MessageType {
    /// The wire code for this type.
    pub const fn code(self) -> i32 {
        match self {
            Self::Login => 1001,
            Self::LoginResponse => 1002,
            Self::Chat => 2001,
            Self::ChatResponse => 2002,
            Self::Heartbeat => 9001,
            Self::Error => 9999,
        }
    }

    /// Human-readable label, used in logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::LoginResponse => "login response",
            Self::Chat => "chat",
            Self::ChatResponse => "chat response",
            Self::Heartbeat => "heartbeat",
            Self::Error => "error",
        }
    }

    /// Looks up a type by its wire code. Unknown codes return `None` —
    /// the caller drops the frame rather than failing the connection.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1001 => Some(Self::Login),
            1002 => Some(Self::LoginResponse),
            2001 => Some(Self::Chat),
            2002 => Some(Self::ChatResponse),
            9001 => Some(Self::Heartbeat),
            9999 => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.code())
    }
}

// ---------------------------------------------------------------------------
// Chat channels
// ---------------------------------------------------------------------------

/// The delivery scope of a chat message.
///
/// Serialized as the upper-case channel name (`"WORLD"`, `"PRIVATE"`, …),
/// matching what clients already send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatChannel {
    /// Every authenticated player except the sender.
    World,
    /// Exactly one receiver, addressed by player id.
    Private,
    /// Guild members. Placeholder contract: not implemented yet.
    Guild,
    /// Team members. Placeholder contract: not implemented yet.
    Team,
}

// ---------------------------------------------------------------------------
// Message bodies
// ---------------------------------------------------------------------------

/// Client → server: authenticate this connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Login {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub client_version: Option<String>,
}

/// Server → client: the outcome of a login attempt.
///
/// `player_id`/`player_name` are present only on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub player_name: Option<String>,
    pub message: String,
}

/// A chat message. Sender fields are stamped by the server from the
/// sending session — client-supplied values are overwritten, never
/// trusted. `receiver_id` is required only for the Private channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(default)]
    pub sender_id: Option<PlayerId>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub receiver_id: Option<PlayerId>,
    pub content: String,
    pub channel: ChatChannel,
}

/// Server → client: the outcome of a chat send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
}

/// Keep-alive ping. The server echoes `client_timestamp` back and fills
/// `server_timestamp`, so the client can compute round-trip time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub client_timestamp: u64,
    #[serde(default)]
    pub server_timestamp: u64,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// The closed set of message variants.
///
/// One variant per registered wire code (ERROR excepted — it has a code
/// but no body). Adding a variant means adding a code to [`MessageType`]
/// and an arm to the codec's dispatch table; the compiler enforces the
/// rest.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Login(Login),
    LoginResponse(LoginResponse),
    Chat(Chat),
    ChatResponse(ChatResponse),
    Heartbeat(Heartbeat),
}

impl Body {
    /// The type tag of this variant. Total: every variant has exactly one.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Login(_) => MessageType::Login,
            Self::LoginResponse(_) => MessageType::LoginResponse,
            Self::Chat(_) => MessageType::Chat,
            Self::ChatResponse(_) => MessageType::ChatResponse,
            Self::Heartbeat(_) => MessageType::Heartbeat,
        }
    }
}

/// A decoded application message: identity, creation time, and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_id: MessageId,
    pub timestamp: u64,
    pub body: Body,
}

impl Message {
    /// Wraps a body with a fresh message id and the current time.
    pub fn new(body: Body) -> Self {
        Self {
            message_id: MessageId::generate(),
            timestamp: now_millis(),
            body,
        }
    }

    /// The type tag of this message's body.
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }
}

// =========================================================================
// Tests
// =========================================================================
