//! Per-connection framing: the read half and the outbound write path.
//!
//! Each accepted socket splits into a [`FrameReader`] (owned by the
//! connection's pipeline task) and a [`ConnectionHandle`] (cloneable,
//! shared with anything that needs to send to or close the connection —
//! handlers, the session sweep, duplicate-login eviction).
//!
//! Writes never block the caller: [`ConnectionHandle::send`] enqueues the
//! frame onto an unbounded FIFO queue drained by a single writer task, so
//! per-connection write order is preserved and failures surface in the
//! log, not in the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};

use crate::{ConnectionId, TransportError};

// ---------------------------------------------------------------------------
// FrameReader
// ---------------------------------------------------------------------------

/// Reads length-prefixed frames from the socket's read half.
///
/// Wire format per frame: `u32 BE length | payload(length bytes)`.
/// The length counts everything after the prefix (type code + body).
pub struct FrameReader {
    read_half: OwnedReadHalf,
    max_frame_len: usize,
}

impl FrameReader {
    pub(crate) fn new(read_half: OwnedReadHalf, max_frame_len: usize) -> Self {
        Self {
            read_half,
            max_frame_len,
        }
    }

    /// Reads the next frame's payload (length prefix already stripped).
    ///
    /// Returns `Ok(None)` when the peer closes cleanly on a frame
    /// boundary.
    ///
    /// # Errors
    /// [`TransportError::FrameTooLarge`] when the declared length exceeds
    /// the configured maximum — the caller must close the connection,
    /// since the stream position is no longer trustworthy. I/O failures
    /// (including EOF mid-frame) surface as [`TransportError::ReadFailed`].
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut len_buf = [0u8; 4];
        match self.read_half.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(TransportError::ReadFailed(e)),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_frame_len {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        let mut payload = vec![0u8; len];
        self.read_half
            .read_exact(&mut payload)
            .await
            .map_err(TransportError::ReadFailed)?;
        Ok(Some(payload))
    }
}

// ---------------------------------------------------------------------------
// ConnectionHandle
// ---------------------------------------------------------------------------

struct ConnInner {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    closed_tx: watch::Sender<bool>,
    open: AtomicBool,
    max_frame_len: usize,
}

impl ConnInner {
    /// Idempotent: only the first close takes effect. Safe to call
    /// concurrently from the pipeline, the sweep, and eviction.
    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.closed_tx.send(true);
            tracing::debug!(conn = %self.id, "connection closed");
        }
    }
}

/// A cheap, cloneable handle to one connection's outbound side.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<ConnInner>,
}

impl ConnectionHandle {
    /// Creates a handle and the frame stream its writer drains.
    ///
    /// The transport wires [`OutboundFrames`] to a socket writer task;
    /// tests consume it directly to observe what a connection would have
    /// sent.
    pub fn channel(id: ConnectionId, max_frame_len: usize) -> (Self, OutboundFrames) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);
        let inner = Arc::new(ConnInner {
            id,
            outbound,
            closed_tx,
            open: AtomicBool::new(true),
            max_frame_len,
        });
        (
            Self {
                inner: Arc::clone(&inner),
            },
            OutboundFrames { rx, inner },
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// `false` once [`close`](Self::close) has been called or the writer
    /// hit a socket error.
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Enqueues a frame payload for delivery. Fire-and-forget: the frame
    /// is length-prefixed and written by the connection's writer task in
    /// FIFO order, and any failure is logged rather than returned.
    pub fn send(&self, payload: Vec<u8>) {
        if !self.is_open() {
            tracing::warn!(conn = %self.inner.id, "cannot send on closed connection");
            return;
        }
        if self.inner.outbound.send(payload).is_err() {
            tracing::warn!(conn = %self.inner.id, "writer task gone, dropping outbound frame");
        }
    }

    /// Closes the connection. Idempotent; the first caller wins and the
    /// rest are no-ops.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Resolves once the connection has been closed (by anyone).
    pub async fn closed(&self) {
        let mut rx = self.inner.closed_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound write path
// ---------------------------------------------------------------------------

/// The receiving end of a connection's outbound queue.
pub struct OutboundFrames {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    inner: Arc<ConnInner>,
}

impl OutboundFrames {
    /// Waits for the next queued frame payload. `None` once every handle
    /// has been dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Non-blocking variant for synchronous tests: sends are enqueued
    /// synchronously, so anything already sent is immediately visible.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }
}

/// Drains the outbound queue onto the socket, prefixing each payload
/// with its length. Exits on close, socket error, or sender drop; a
/// socket error also closes the connection so the read side stops.
pub(crate) async fn write_loop(mut write_half: OwnedWriteHalf, frames: OutboundFrames) {
    let OutboundFrames { mut rx, inner } = frames;
    let mut closed = inner.closed_tx.subscribe();

    loop {
        let payload = tokio::select! {
            payload = rx.recv() => match payload {
                Some(p) => p,
                None => break,
            },
            changed = closed.changed() => {
                if changed.is_err() || *closed.borrow() {
                    break;
                }
                continue;
            }
        };

        if payload.len() > inner.max_frame_len {
            tracing::error!(
                conn = %inner.id,
                len = payload.len(),
                max = inner.max_frame_len,
                "outbound frame exceeds maximum, closing connection"
            );
            inner.close();
            break;
        }

        let prefix = (payload.len() as u32).to_be_bytes();
        let result = async {
            write_half.write_all(&prefix).await?;
            write_half.write_all(&payload).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(conn = %inner.id, error = %e, "write failed, closing connection");
            inner.close();
            break;
        }
    }

    let _ = write_half.shutdown().await;
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, OutboundFrames) {
        ConnectionHandle::channel(ConnectionId::new(1), 1024)
    }

    #[test]
    fn test_send_preserves_fifo_order() {
        let (conn, mut frames) = handle();
        conn.send(vec![1]);
        conn.send(vec![2]);
        conn.send(vec![3]);

        assert_eq!(frames.try_recv(), Some(vec![1]));
        assert_eq!(frames.try_recv(), Some(vec![2]));
        assert_eq!(frames.try_recv(), Some(vec![3]));
        assert_eq!(frames.try_recv(), None);
    }

    #[test]
    fn test_send_after_close_is_dropped() {
        let (conn, mut frames) = handle();
        conn.close();
        conn.send(vec![1]);

        assert_eq!(frames.try_recv(), None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (conn, _frames) = handle();
        assert!(conn.is_open());
        conn.close();
        conn.close();
        conn.close();
        assert!(!conn.is_open());
    }

    #[test]
    fn test_close_from_any_clone_closes_all() {
        let (conn, _frames) = handle();
        let other = conn.clone();
        other.close();
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let (conn, _frames) = handle();
        let waiter = conn.clone();
        let task = tokio::spawn(async move { waiter.closed().await });
        conn.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("closed() should resolve")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn test_closed_resolves_immediately_when_already_closed() {
        let (conn, _frames) = handle();
        conn.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), conn.closed())
            .await
            .expect("closed() should resolve without waiting");
    }
}
