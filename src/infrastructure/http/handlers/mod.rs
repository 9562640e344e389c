//! HTTP Handlers

mod message;
mod ping;
mod session;
mod websocket;

pub use message::*;
pub use ping::*;
pub use session::*;
pub use websocket::*;
