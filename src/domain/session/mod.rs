//! Session Context - 会话限界上下文
//!
//! 职责:
//! - Session 聚合（状态机、不变量）
//! - 标识、名称、JID、代理等值对象

mod aggregate;
mod errors;
mod value_objects;

pub use aggregate::Session;
pub use errors::SessionError;
pub use value_objects::{
    IdentifierType, ProxyConfig, ProxyType, SessionId, SessionIdentifier, SessionName,
    SessionStatus, WhatsAppJid, SESSION_NAME_MAX_LEN, SESSION_NAME_MIN_LEN,
};
