//! Built-in message handlers: login and chat.

mod chat;
mod login;

pub use chat::ChatHandler;
pub use login::{BasicValidator, LoginHandler, LoginValidator};
