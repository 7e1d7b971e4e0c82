//! # Gatehall
//!
//! The connection/session/protocol core of a small TCP game server:
//! length-prefixed frames become typed messages, each connection carries
//! a session for its lifetime, messages route to per-type handlers, and
//! a background sweep reclaims sessions that go silent.
//!
//! ```text
//! bytes → frame codec → Message → pipeline (session lookup)
//!       → dispatcher → handler (session registry, outbound sends)
//!       → frame codec → bytes
//! ```
//!
//! The built-in handlers cover login (placeholder credential policy,
//! duplicate-login eviction) and chat (world/private delivery, guild and
//! team as explicit not-implemented placeholders). Heartbeats are echoed
//! by the pipeline itself.

mod config;
mod error;
mod handler;
mod handlers;
mod pipeline;
mod server;

pub use config::ServerConfig;
pub use error::GatehallError;
pub use handler::{HandlerRegistry, MessageHandler};
pub use handlers::{BasicValidator, ChatHandler, LoginHandler, LoginValidator};
pub use server::{GatehallServer, GatehallServerBuilder};
