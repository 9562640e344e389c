//! Query Handlers 实现

mod session_handlers;

pub(crate) use session_handlers::resolve_session;
pub use session_handlers::{GetQrCodeHandler, ListSessionsHandler, ResolveSessionHandler};
