//! Session Context - Errors

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid session name: {0}")]
    InvalidName(String),

    #[error("invalid session identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid WhatsApp JID: {0}")]
    InvalidJid(String),

    #[error("invalid proxy configuration: {0}")]
    InvalidProxy(String),

    #[error("session is already connected")]
    AlreadyConnected,

    #[error("session invariant violated: {0}")]
    InvariantViolation(String),
}
