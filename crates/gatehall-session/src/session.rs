//! Session types: the server-side record of one live connection.
//!
//! A session is shared state: the connection's pipeline task, any handler
//! invoked from any connection, and the sweep task all touch it
//! concurrently. Activity time is an atomic; identity fields sit behind a
//! mutex whose critical sections never await.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gatehall_protocol::{FrameCodec, Message, PlayerId};
use gatehall_transport::ConnectionHandle;

/// Counter for generating session ids. Monotonic and collision-free
/// under concurrent accepts; ids are never reused.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Unique identifier for a session, assigned at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timing knobs for the registry's idle sweep.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// A session whose last activity is older than this is evicted by
    /// the next sweep.
    pub idle_timeout: Duration,

    /// How often the sweep runs.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle state of a session.
///
/// ```text
/// Connected ──(login)──→ Authenticated ──→ InGame
///     │                        │              │
///     └────────────────────────┴──────────────┴──→ Closed
/// ```
///
/// `InGame` is a reachable extension state; the built-in handlers never
/// enter it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, not yet authenticated.
    Connected,
    /// A player is bound to this session.
    Authenticated,
    /// Reserved for gameplay layers built on top of this core.
    InGame,
    /// Connection torn down. Terminal.
    Closed,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Identity fields guarded together: they change as a unit on bind/unbind.
#[derive(Debug)]
struct Identity {
    player_id: Option<PlayerId>,
    player_name: Option<String>,
    authenticated: bool,
    state: SessionState,
}

/// One live client connection and its authentication state.
///
/// Created when a connection is accepted; destroyed on disconnect, idle
/// timeout, or duplicate-login eviction. The session owns its
/// [`ConnectionHandle`] for the connection's whole life.
pub struct Session {
    id: SessionId,
    conn: ConnectionHandle,
    codec: FrameCodec,
    created_at: u64,
    last_active: AtomicU64,
    closed: AtomicBool,
    identity: Mutex<Identity>,
}

impl Session {
    /// Creates a session for a freshly accepted connection.
    pub fn new(conn: ConnectionHandle, codec: FrameCodec) -> Self {
        let now = now_millis();
        Self {
            id: SessionId::next(),
            conn,
            codec,
            created_at: now,
            last_active: AtomicU64::new(now),
            closed: AtomicBool::new(false),
            identity: Mutex::new(Identity {
                player_id: None,
                player_name: None,
                authenticated: false,
                state: SessionState::Connected,
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn conn(&self) -> &ConnectionHandle {
        &self.conn
    }

    /// Epoch millis when the session was created.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Epoch millis of the last inbound message.
    pub fn last_active(&self) -> u64 {
        self.last_active.load(Ordering::Relaxed)
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.identity().player_id.clone()
    }

    pub fn player_name(&self) -> Option<String> {
        self.identity().player_name.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity().authenticated
    }

    pub fn state(&self) -> SessionState {
        self.identity().state
    }

    /// Records activity. `fetch_max` keeps `last_active` monotonically
    /// non-decreasing even when pipeline and sweep race.
    pub fn touch(&self) {
        self.last_active.fetch_max(now_millis(), Ordering::Relaxed);
    }

    /// `true` once the session has been silent for longer than `timeout`.
    pub fn is_idle(&self, timeout: Duration) -> bool {
        let idle_for = now_millis().saturating_sub(self.last_active());
        idle_for > timeout.as_millis() as u64
    }

    /// Sends a message to this session's client.
    ///
    /// Fire-and-forget: the frame is enqueued on the connection's FIFO
    /// write path, and encode or enqueue failures are logged, never
    /// returned.
    pub fn send(&self, message: &Message) {
        match self.codec.encode(message) {
            Ok(frame) => self.conn.send(frame),
            Err(e) => {
                tracing::error!(
                    session = %self.id,
                    ty = %message.message_type(),
                    error = %e,
                    "failed to encode outbound message"
                );
            }
        }
    }

    /// Closes the session and its connection. Idempotent — safe to call
    /// concurrently from the pipeline, the sweep, and eviction.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.conn.close();
        self.identity().state = SessionState::Closed;
    }

    /// Installs a player identity. Called only via
    /// [`SessionRegistry::bind_player`](crate::SessionRegistry::bind_player).
    pub(crate) fn bind_identity(&self, player_id: PlayerId, player_name: String) {
        let mut identity = self.identity();
        identity.player_id = Some(player_id);
        identity.player_name = Some(player_name);
        identity.authenticated = true;
        if identity.state != SessionState::Closed {
            identity.state = SessionState::Authenticated;
        }
    }

    /// Clears the player identity. Called only via
    /// [`SessionRegistry::unbind_player`](crate::SessionRegistry::unbind_player).
    pub(crate) fn clear_identity(&self) {
        let mut identity = self.identity();
        identity.player_id = None;
        identity.player_name = None;
        identity.authenticated = false;
        if identity.state != SessionState::Closed {
            identity.state = SessionState::Connected;
        }
    }

    fn identity(&self) -> MutexGuard<'_, Identity> {
        // A poisoned lock only means another thread panicked mid-update;
        // the fields are all valid values, so keep going.
        self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("conn", &self.conn.id())
            .field("last_active", &self.last_active())
            .finish_non_exhaustive()
    }
}

// =========================================================================
// Tests
// =========================================================================
