//! Connection Manager Port - 活动连接管理
//!
//! 管理每个会话的内存客户端句柄，具体实现在 infrastructure/memory 层。
//! 持久化状态对 API 响应是权威的，内存句柄只代表当前是否可达。

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::{ClientError, RepositoryError, WhatsAppClientPort};
use crate::domain::session::{ProxyConfig, SessionId, WhatsAppJid};

/// Connection Manager 错误
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("No live client for session {0}")]
    ClientNotFound(SessionId),

    #[error("Session {0} is already connected")]
    AlreadyConnected(SessionId),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// 重连时持久化状态已不是 Connected
    #[error("Session {0} is no longer connected")]
    NotConnected(SessionId),

    #[error("Invalid proxy for session {session_id}: {reason}")]
    InvalidProxy {
        session_id: SessionId,
        reason: String,
    },

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Unhealthy connections: {0:?}")]
    Unhealthy(Vec<SessionId>),
}

/// connect 结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectResult {
    pub needs_auth: bool,
    pub qr_code: Option<String>,
    pub jid: Option<WhatsAppJid>,
}

/// 健康检查快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub registered: usize,
    pub connected: usize,
    pub authenticated: usize,
}

/// Connection Manager Port
#[async_trait]
pub trait ConnectionManagerPort: Send + Sync {
    /// 获取已注册的客户端；不存在返回 `ClientNotFound`
    fn get_client(&self, id: &SessionId) -> Result<Arc<dyn WhatsAppClientPort>, ConnectionError>;

    /// 幂等创建：已存在时返回现有句柄
    fn create_client(
        &self,
        id: &SessionId,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Arc<dyn WhatsAppClientPort>, ConnectionError>;

    fn has_client(&self, id: &SessionId) -> bool;

    /// 已注册句柄的会话 ID
    fn client_ids(&self) -> Vec<SessionId>;

    /// 用户发起的连接；持久化状态为 Connected 时返回 `AlreadyConnected`
    async fn connect(&self, id: &SessionId) -> Result<ConnectResult, ConnectionError>;

    /// 自动重连入口；持久化状态不是 Connected 时返回 `NotConnected`
    async fn reconnect(&self, id: &SessionId) -> Result<ConnectResult, ConnectionError>;

    /// 以手机号请求配对码
    async fn pair_phone(&self, id: &SessionId, phone: &str) -> Result<String, ConnectionError>;

    /// 无句柄时视为成功
    async fn disconnect(&self, id: &SessionId) -> Result<(), ConnectionError>;

    /// 从注册表移除并断开，不存在返回 `ClientNotFound`
    async fn remove_client(&self, id: &SessionId) -> Result<(), ConnectionError>;

    /// 登出并移除句柄；无句柄时视为成功
    async fn logout(&self, id: &SessionId) -> Result<(), ConnectionError>;

    /// 所有已认证句柄都在线时健康
    async fn health_check(&self) -> Result<HealthReport, ConnectionError>;

    /// 启动时修正残留的 Connecting 状态，返回修正条数
    async fn reconcile_on_startup(&self) -> Result<usize, ConnectionError>;
}
