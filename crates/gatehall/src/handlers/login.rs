//! Login handling: credential validation and player binding.

use std::sync::Arc;

use gatehall_protocol::{Body, Login, LoginResponse, Message, PlayerId};
use gatehall_session::{Session, SessionRegistry};

use crate::{GatehallError, MessageHandler};

/// Validates login credentials.
///
/// Gatehall does not own a credential store — a real deployment plugs in
/// a validator backed by its auth system. Implementations must not block:
/// the validator runs on the connection's event loop, so a check that
/// needs I/O has to impose its own capacity (e.g. a bounded worker pool)
/// behind this interface.
pub trait LoginValidator: Send + Sync {
    fn validate(&self, username: &str, password: &str) -> bool;
}

/// The placeholder policy: username non-empty after trimming, password at
/// least six characters. Anything that clears that bar is accepted.
pub struct BasicValidator;

impl LoginValidator for BasicValidator {
    fn validate(&self, username: &str, password: &str) -> bool {
        !username.trim().is_empty() && password.len() >= 6
    }
}

/// Handles [`Login`] messages on unauthenticated (or re-authenticating)
/// sessions.
///
/// On success the player id is derived as `"player_" + username` — a
/// deliberately simple policy; it is not collision-resistant across case
/// variants of a name, and callers needing global uniqueness must supply
/// a stronger scheme. Binding evicts any prior session holding the same
/// player id (duplicate login).
pub struct LoginHandler {
    registry: Arc<SessionRegistry>,
    validator: Box<dyn LoginValidator>,
}

impl LoginHandler {
    /// A login handler with the placeholder [`BasicValidator`] policy.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self::with_validator(registry, BasicValidator)
    }

    /// A login handler with a custom credential validator.
    pub fn with_validator(
        registry: Arc<SessionRegistry>,
        validator: impl LoginValidator + 'static,
    ) -> Self {
        Self {
            registry,
            validator: Box::new(validator),
        }
    }

    fn respond(&self, session: &Session, response: LoginResponse) {
        session.send(&Message::new(Body::LoginResponse(response)));
    }

    fn login_success(&self, session: &Arc<Session>, login: &Login) {
        let username = &login.username;
        let player_id = PlayerId(format!("player_{username}"));

        self.registry.bind_player(session, player_id.clone(), username);

        self.respond(
            session,
            LoginResponse {
                success: true,
                player_id: Some(player_id.clone()),
                player_name: Some(username.clone()),
                message: "Login successful".to_string(),
            },
        );

        tracing::info!(
            %username,
            player = %player_id,
            session = %session.id(),
            "login successful"
        );
    }

    fn login_failure(&self, session: &Session, username: &str, reason: &str) {
        self.respond(
            session,
            LoginResponse {
                success: false,
                player_id: None,
                player_name: None,
                message: reason.to_string(),
            },
        );

        tracing::warn!(%username, reason, session = %session.id(), "login failed");
    }
}

impl MessageHandler for LoginHandler {
    fn handle(&self, session: &Arc<Session>, message: Message) -> Result<(), GatehallError> {
        let ty = message.message_type();
        let Body::Login(login) = message.body else {
            return Err(GatehallError::UnexpectedMessage {
                handler: "LoginHandler",
                got: ty,
            });
        };

        tracing::info!(
            username = %login.username,
            session = %session.id(),
            "processing login request"
        );

        if self.validator.validate(&login.username, &login.password) {
            self.login_success(session, &login);
        } else {
            self.login_failure(session, &login.username, "Invalid username or password");
        }
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
