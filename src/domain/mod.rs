//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Session Context: 会话聚合与值对象
//! - Message Context: 出站媒体消息规则

pub mod message;
pub mod session;
