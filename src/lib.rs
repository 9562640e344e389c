//! wagate - 多会话 WhatsApp HTTP 网关
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Session Context: 会话聚合、状态机、代理配置
//! - Message Context: 媒体种类、大小限制、收件人规范化
//!
//! 应用层 (application/):
//! - Ports: 端口定义（SessionRepository, WhatsAppClient, ConnectionManager）
//! - Commands: CQRS 命令处理器
//! - Queries: CQRS 查询处理器
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: RESTful API + WebSocket
//! - Memory: ConnectionManager 内存实现
//! - Worker: AutoReconnectWorker 后台重连
//! - Persistence: SQLite 存储
//! - Adapters: 协议客户端（bridge / fake）
//! - Events: WebSocket 事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
