//! TCP transport for Gatehall.
//!
//! Owns everything below the protocol layer: the listening socket,
//! length-prefix framing (`u32 BE length | payload`), the per-connection
//! outbound queue and writer task, and idempotent connection close.
//!
//! Frame boundaries solve TCP's stream coalescing: the reader never hands
//! a partial or merged payload upward, and the maximum frame length is
//! enforced here — an oversized frame closes the connection instead of
//! attempting partial delivery.

mod conn;
mod error;

pub use conn::{ConnectionHandle, FrameReader, OutboundFrames};
pub use error::TransportError;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;

/// Counter for generating unique connection ids.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A TCP listener producing framed connections.
pub struct TcpTransport {
    listener: TcpListener,
    max_frame_len: usize,
    nodelay: bool,
}

impl TcpTransport {
    /// Binds a listener to the given address.
    pub async fn bind(addr: &str, max_frame_len: usize) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self {
            listener,
            max_frame_len,
            nodelay: true,
        })
    }

    /// Sets whether TCP_NODELAY is applied to accepted sockets.
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts the next connection and sets up its framing: the returned
    /// [`FrameReader`] belongs to the connection's pipeline task, the
    /// [`ConnectionHandle`] can be cloned freely, and a writer task is
    /// spawned to drain the outbound queue onto the socket.
    pub async fn accept(&mut self) -> Result<(FrameReader, ConnectionHandle), TransportError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        if self.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(error = %e, "failed to set TCP_NODELAY");
            }
        }

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %peer, "accepted connection");

        let (read_half, write_half) = stream.into_split();
        let (handle, frames) = ConnectionHandle::channel(id, self.max_frame_len);
        tokio::spawn(conn::write_loop(write_half, frames));

        Ok((FrameReader::new(read_half, self.max_frame_len), handle))
    }
}

// =========================================================================
// Tests
// =========================================================================
