//! Memory Layer - In-Memory State Management
//!
//! 实现 ConnectionManager，管理每个会话的活动客户端句柄

mod connection_manager;

pub use connection_manager::{InMemoryConnectionManager, LiveConnection};
