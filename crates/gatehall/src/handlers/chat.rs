//! Chat handling: channel-based message delivery between sessions.

use std::sync::Arc;

use gatehall_protocol::{Body, ChatChannel, ChatResponse, Message, PlayerId};
use gatehall_session::{Session, SessionRegistry};

use crate::{GatehallError, MessageHandler};

/// Handles [`Chat`](gatehall_protocol::Chat) messages from authenticated
/// sessions.
///
/// Sender identity is always stamped from the session — client-supplied
/// sender fields are overwritten before delivery. Unauthenticated senders
/// get a failure response and nothing is delivered.
///
/// Guild and Team are placeholder contracts: the handler answers with an
/// explicit "not implemented yet" failure. That is the intended behavior,
/// not a gap — a guild/team system plugging into this core replaces those
/// arms.
pub struct ChatHandler {
    registry: Arc<SessionRegistry>,
}

impl ChatHandler {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    fn respond(&self, session: &Session, success: bool, message: impl Into<String>) {
        session.send(&Message::new(Body::ChatResponse(ChatResponse {
            success,
            message: message.into(),
        })));
    }

    /// World channel: deliver to every authenticated session except the
    /// sender, then acknowledge with the delivery count.
    fn world_chat(&self, sender: &Arc<Session>, relay: &Message) {
        let mut sent = 0;
        for session in self.registry.all_sessions() {
            if session.is_authenticated() && session.id() != sender.id() {
                session.send(relay);
                sent += 1;
            }
        }

        self.respond(sender, true, format!("Message sent to {sent} players"));
        tracing::info!(
            from = %sender.id(),
            recipients = sent,
            "world chat message broadcast"
        );
    }

    /// Private channel: deliver to exactly one receiver, looked up by
    /// player id.
    fn private_chat(&self, sender: &Arc<Session>, receiver_id: Option<&PlayerId>, relay: &Message) {
        let Some(receiver_id) = receiver_id.filter(|id| !id.0.trim().is_empty()) else {
            self.respond(sender, false, "Receiver ID is required for private chat");
            return;
        };

        let receiver = self
            .registry
            .get_session_by_player(receiver_id)
            .filter(|s| s.is_authenticated());
        let Some(receiver) = receiver else {
            self.respond(
                sender,
                false,
                format!("Player not found or offline: {receiver_id}"),
            );
            return;
        };

        receiver.send(relay);

        let receiver_name = receiver.player_name().unwrap_or_default();
        self.respond(
            sender,
            true,
            format!("Private message sent to {receiver_name}"),
        );
        tracing::info!(
            from = %sender.id(),
            to = %receiver.id(),
            "private chat message sent"
        );
    }
}

impl MessageHandler for ChatHandler {
    fn handle(&self, session: &Arc<Session>, message: Message) -> Result<(), GatehallError> {
        let ty = message.message_type();
        let Message {
            message_id,
            timestamp,
            body,
        } = message;
        let Body::Chat(mut chat) = body else {
            return Err(GatehallError::UnexpectedMessage {
                handler: "ChatHandler",
                got: ty,
            });
        };

        if !session.is_authenticated() {
            tracing::warn!(session = %session.id(), "unauthenticated session attempted chat");
            self.respond(session, false, "Please login first");
            return Ok(());
        }

        // Never trust client-supplied sender identity.
        chat.sender_id = session.player_id();
        chat.sender_name = session.player_name();

        tracing::info!(
            from = ?chat.sender_name,
            channel = ?chat.channel,
            session = %session.id(),
            "processing chat message"
        );

        let channel = chat.channel;
        let receiver_id = chat.receiver_id.clone();
        // The relay keeps the original message id and timestamp; only
        // the sender fields changed.
        let relay = Message {
            message_id,
            timestamp,
            body: Body::Chat(chat),
        };

        match channel {
            ChatChannel::World => self.world_chat(session, &relay),
            ChatChannel::Private => self.private_chat(session, receiver_id.as_ref(), &relay),
            ChatChannel::Guild => {
                self.respond(session, false, "Guild chat not implemented yet");
                tracing::info!(session = %session.id(), "guild chat attempted");
            }
            ChatChannel::Team => {
                self.respond(session, false, "Team chat not implemented yet");
                tracing::info!(session = %session.id(), "team chat attempted");
            }
        }
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use gatehall_protocol::{Chat, FrameCodec};
    use gatehall_session::SessionConfig;
    use gatehall_transport::{ConnectionHandle, ConnectionId, OutboundFrames};

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(SessionConfig::default()))
    }

    fn session(conn_id: u64) -> (Arc<Session>, OutboundFrames) {
        let (conn, frames) = ConnectionHandle::channel(ConnectionId::new(conn_id), 1024);
        (Arc::new(Session::new(conn, FrameCodec::json())), frames)
    }

    /// Adds a session to the registry and authenticates it as `name`.
    fn logged_in(
        registry: &Arc<SessionRegistry>,
        conn_id: u64,
        name: &str,
    ) -> (Arc<Session>, OutboundFrames) {
        let (s, frames) = session(conn_id);
        registry.add_session(Arc::clone(&s));
        registry.bind_player(&s, PlayerId(format!("player_{name}")), name);
        (s, frames)
    }

    fn chat_message(channel: ChatChannel, receiver: Option<&str>) -> Message {
        Message::new(Body::Chat(Chat {
            sender_id: None,
            sender_name: None,
            receiver_id: receiver.map(|r| PlayerId(r.into())),
            content: "hi".into(),
            channel,
        }))
    }

    fn next_message(frames: &mut OutboundFrames) -> Message {
        let frame = frames.try_recv().expect("a frame should be queued");
        FrameCodec::json().decode(&frame).expect("should decode")
    }

    fn next_chat_response(frames: &mut OutboundFrames) -> ChatResponse {
        match next_message(frames).body {
            Body::ChatResponse(r) => r,
            other => panic!("expected ChatResponse, got {other:?}"),
        }
    }

    fn next_chat(frames: &mut OutboundFrames) -> Chat {
        match next_message(frames).body {
            Body::Chat(c) => c,
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    // =====================================================================
    // Authentication gate
    // =====================================================================

    #[test]
    fn test_handle_unauthenticated_sender_gets_failure_and_no_delivery() {
        let registry = registry();
        let handler = ChatHandler::new(Arc::clone(&registry));
        let (_other, mut other_frames) = logged_in(&registry, 2, "bob");
        let (unauth, mut unauth_frames) = session(1);
        registry.add_session(Arc::clone(&unauth));

        handler
            .handle(&unauth, chat_message(ChatChannel::World, None))
            .unwrap();

        let response = next_chat_response(&mut unauth_frames);
        assert!(!response.success);
        assert_eq!(response.message, "Please login first");
        assert!(
            other_frames.try_recv().is_none(),
            "no recipient may see an unauthenticated chat"
        );
    }

    // =====================================================================
    // World channel
    // =====================================================================

    #[test]
    fn test_handle_world_chat_reaches_other_authenticated_sessions() {
        let registry = registry();
        let handler = ChatHandler::new(Arc::clone(&registry));
        let (alice, mut alice_frames) = logged_in(&registry, 1, "alice");
        let (_bob, mut bob_frames) = logged_in(&registry, 2, "bob");
        let (_carol, mut carol_frames) = logged_in(&registry, 3, "carol");
        // An unauthenticated bystander must not receive world chat.
        let (bystander, mut bystander_frames) = session(4);
        registry.add_session(Arc::clone(&bystander));

        handler
            .handle(&alice, chat_message(ChatChannel::World, None))
            .unwrap();

        for frames in [&mut bob_frames, &mut carol_frames] {
            let chat = next_chat(frames);
            assert_eq!(chat.sender_id, Some(PlayerId("player_alice".into())));
            assert_eq!(chat.sender_name, Some("alice".into()));
            assert_eq!(chat.content, "hi");
        }
        assert!(bystander_frames.try_recv().is_none());

        let response = next_chat_response(&mut alice_frames);
        assert!(response.success);
        assert_eq!(response.message, "Message sent to 2 players");
    }

    #[test]
    fn test_handle_world_chat_alone_reports_zero_recipients() {
        let registry = registry();
        let handler = ChatHandler::new(Arc::clone(&registry));
        let (alice, mut alice_frames) = logged_in(&registry, 1, "alice");

        handler
            .handle(&alice, chat_message(ChatChannel::World, None))
            .unwrap();

        let response = next_chat_response(&mut alice_frames);
        assert!(response.success);
        assert_eq!(response.message, "Message sent to 0 players");
    }

    #[test]
    fn test_handle_world_chat_overwrites_client_sender_identity() {
        let registry = registry();
        let handler = ChatHandler::new(Arc::clone(&registry));
        let (alice, _alice_frames) = logged_in(&registry, 1, "alice");
        let (_bob, mut bob_frames) = logged_in(&registry, 2, "bob");

        // The client claims to be someone else.
        let spoofed = Message::new(Body::Chat(Chat {
            sender_id: Some(PlayerId("player_admin".into())),
            sender_name: Some("admin".into()),
            receiver_id: None,
            content: "free gold".into(),
            channel: ChatChannel::World,
        }));
        handler.handle(&alice, spoofed).unwrap();

        let chat = next_chat(&mut bob_frames);
        assert_eq!(chat.sender_id, Some(PlayerId("player_alice".into())));
        assert_eq!(chat.sender_name, Some("alice".into()));
    }

    // =====================================================================
    // Private channel
    // =====================================================================

    #[test]
    fn test_handle_private_chat_delivers_to_receiver_only() {
        let registry = registry();
        let handler = ChatHandler::new(Arc::clone(&registry));
        let (alice, mut alice_frames) = logged_in(&registry, 1, "alice");
        let (_bob, mut bob_frames) = logged_in(&registry, 2, "bob");
        let (_carol, mut carol_frames) = logged_in(&registry, 3, "carol");

        handler
            .handle(
                &alice,
                chat_message(ChatChannel::Private, Some("player_bob")),
            )
            .unwrap();

        let chat = next_chat(&mut bob_frames);
        assert_eq!(chat.sender_id, Some(PlayerId("player_alice".into())));
        assert!(carol_frames.try_recv().is_none());

        let response = next_chat_response(&mut alice_frames);
        assert!(response.success);
        assert_eq!(response.message, "Private message sent to bob");
    }

    #[test]
    fn test_handle_private_chat_unknown_receiver_fails() {
        let registry = registry();
        let handler = ChatHandler::new(Arc::clone(&registry));
        let (alice, mut alice_frames) = logged_in(&registry, 1, "alice");

        handler
            .handle(
                &alice,
                chat_message(ChatChannel::Private, Some("player_nonexistent")),
            )
            .unwrap();

        let response = next_chat_response(&mut alice_frames);
        assert!(!response.success);
        assert!(
            response.message.contains("not found or offline"),
            "got: {}",
            response.message
        );
    }

    #[test]
    fn test_handle_private_chat_missing_receiver_fails() {
        let registry = registry();
        let handler = ChatHandler::new(Arc::clone(&registry));
        let (alice, mut alice_frames) = logged_in(&registry, 1, "alice");

        handler
            .handle(&alice, chat_message(ChatChannel::Private, None))
            .unwrap();

        let response = next_chat_response(&mut alice_frames);
        assert!(!response.success);
        assert_eq!(response.message, "Receiver ID is required for private chat");
    }

    #[test]
    fn test_handle_private_chat_blank_receiver_fails() {
        let registry = registry();
        let handler = ChatHandler::new(Arc::clone(&registry));
        let (alice, mut alice_frames) = logged_in(&registry, 1, "alice");

        handler
            .handle(&alice, chat_message(ChatChannel::Private, Some("  ")))
            .unwrap();

        let response = next_chat_response(&mut alice_frames);
        assert!(!response.success);
        assert_eq!(response.message, "Receiver ID is required for private chat");
    }

    // =====================================================================
    // Guild / Team placeholders
    // =====================================================================

    #[test]
    fn test_handle_guild_chat_answers_not_implemented() {
        let registry = registry();
        let handler = ChatHandler::new(Arc::clone(&registry));
        let (alice, mut alice_frames) = logged_in(&registry, 1, "alice");

        handler
            .handle(&alice, chat_message(ChatChannel::Guild, None))
            .unwrap();

        let response = next_chat_response(&mut alice_frames);
        assert!(!response.success);
        assert_eq!(response.message, "Guild chat not implemented yet");
    }

    #[test]
    fn test_handle_team_chat_answers_not_implemented() {
        let registry = registry();
        let handler = ChatHandler::new(Arc::clone(&registry));
        let (alice, mut alice_frames) = logged_in(&registry, 1, "alice");

        handler
            .handle(&alice, chat_message(ChatChannel::Team, None))
            .unwrap();

        let response = next_chat_response(&mut alice_frames);
        assert!(!response.success);
        assert_eq!(response.message, "Team chat not implemented yet");
    }

    #[test]
    fn test_handle_wrong_body_returns_unexpected_message() {
        let registry = registry();
        let handler = ChatHandler::new(registry);
        let (alice, _frames) = session(1);

        let err = handler
            .handle(
                &alice,
                Message::new(Body::Heartbeat(gatehall_protocol::Heartbeat {
                    client_timestamp: 1,
                    server_timestamp: 0,
                })),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            GatehallError::UnexpectedMessage {
                handler: "ChatHandler",
                ..
            }
        ));
    }

    #[test]
    fn test_relay_preserves_message_id_and_timestamp() {
        let registry = registry();
        let handler = ChatHandler::new(Arc::clone(&registry));
        let (alice, _alice_frames) = logged_in(&registry, 1, "alice");
        let (_bob, mut bob_frames) = logged_in(&registry, 2, "bob");

        let original = chat_message(ChatChannel::World, None);
        let original_id = original.message_id.clone();
        let original_ts = original.timestamp;
        handler.handle(&alice, original).unwrap();

        let relayed = next_message(&mut bob_frames);
        assert_eq!(relayed.message_id, original_id);
        assert_eq!(relayed.timestamp, original_ts);
    }
}
