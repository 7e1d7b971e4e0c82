//! Per-connection pipeline: the read/decode/dispatch loop.
//!
//! One task per connection. Connection-level state here (reading,
//! closed) is orthogonal to the session's own lifecycle — the session
//! records who the player is, the pipeline only moves frames.

use std::sync::Arc;

use gatehall_protocol::{now_millis, Body, Heartbeat, Message};
use gatehall_session::Session;
use gatehall_transport::{ConnectionHandle, FrameReader, TransportError};

use crate::server::ServerState;

/// Runs a connection from accept to close.
///
/// Lifecycle: register a fresh session, then loop reading frames until
/// the peer disconnects, the idle limit passes with no frames, a
/// transport error occurs, or someone (sweep, duplicate-login eviction)
/// closes the connection out from under us. On exit the session is
/// removed from the registry and the connection closed.
///
/// Error containment per frame: undecodable frames are dropped and the
/// loop continues; handler errors are contained by the dispatcher. Only
/// transport-level failures end the connection.
pub(crate) async fn handle_connection(
    mut reader: FrameReader,
    conn: ConnectionHandle,
    state: Arc<ServerState>,
) {
    let session = Arc::new(Session::new(conn.clone(), state.codec.clone()));
    tracing::info!(session = %session.id(), conn = %conn.id(), "client connected");
    state.registry.add_session(Arc::clone(&session));

    // No frames for twice the heartbeat interval means the client is gone.
    let idle_limit = state.config.heartbeat_interval * 2;

    loop {
        let frame = tokio::select! {
            result = tokio::time::timeout(idle_limit, reader.read_frame()) => match result {
                Err(_) => {
                    tracing::warn!(session = %session.id(), "read idle timeout, closing connection");
                    break;
                }
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) => {
                    tracing::info!(session = %session.id(), player = ?session.player_id(), "client disconnected");
                    break;
                }
                Ok(Err(e @ TransportError::FrameTooLarge { .. })) => {
                    tracing::warn!(session = %session.id(), error = %e, "closing connection");
                    break;
                }
                Ok(Err(e)) => {
                    tracing::warn!(session = %session.id(), error = %e, "transport error, closing connection");
                    break;
                }
            },
            // Sweep or duplicate-login eviction closed us mid-read.
            _ = conn.closed() => {
                tracing::debug!(session = %session.id(), "connection closed while reading");
                break;
            }
        };

        let message = match state.codec.decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(session = %session.id(), error = %e, "dropping undecodable frame");
                continue;
            }
        };

        session.touch();

        // Heartbeats are answered in place; they never reach a handler.
        if let Body::Heartbeat(hb) = &message.body {
            tracing::debug!(session = %session.id(), "received heartbeat");
            session.send(&Message::new(Body::Heartbeat(Heartbeat {
                client_timestamp: hb.client_timestamp,
                server_timestamp: now_millis(),
            })));
            continue;
        }

        state.handlers.dispatch(&session, message);
    }

    state.registry.remove_session(session.id());
    session.close();
}
