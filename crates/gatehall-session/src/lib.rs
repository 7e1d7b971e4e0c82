//! Session tracking for Gatehall.
//!
//! This crate is the server's memory of who is connected:
//!
//! 1. **Sessions** ([`Session`]) — one record per live connection,
//!    carrying the connection handle, the bound player identity, and
//!    activity timestamps.
//! 2. **The registry** ([`SessionRegistry`]) — concurrent lookup by
//!    session id and by player id, duplicate-login eviction, and the
//!    periodic sweep that reclaims idle sessions.
//!
//! # How it fits in the stack
//!
//! ```text
//! Handlers (above)   ← bind players, look up chat recipients
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Transport (below)  ← provides the ConnectionHandle a session owns
//! ```

mod registry;
mod session;

pub use registry::SessionRegistry;
pub use session::{Session, SessionConfig, SessionId, SessionState};
