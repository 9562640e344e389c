//! WhatsApp Client Port - 协议客户端抽象
//!
//! 协议本身由外部组件实现（桥接服务 / 模拟客户端），
//! 这里只定义单个会话客户端需要具备的能力

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::message::MediaKind;
use crate::domain::session::{ProxyConfig, SessionId, WhatsAppJid};

/// 客户端错误
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Not connected")]
    NotConnected,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// 一次 connect 的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOutcome {
    /// 设备尚未配对，需要扫码或配对码
    pub needs_auth: bool,
    pub qr_code: Option<String>,
    pub jid: Option<WhatsAppJid>,
}

/// 客户端推送的协议事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// 新二维码（旧码过期后会轮换）
    QrCode(String),
    /// 扫码或配对码完成
    PairSuccess { jid: WhatsAppJid },
    /// 已认证并在线
    Connected { jid: WhatsAppJid },
    /// 连接断开（凭证仍在）
    Disconnected,
    /// 设备被登出，凭证失效
    LoggedOut,
}

/// 待发送的媒体消息
#[derive(Debug, Clone)]
pub struct OutgoingMedia {
    pub kind: MediaKind,
    pub recipient: WhatsAppJid,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub caption: Option<String>,
    pub file_name: Option<String>,
    /// 音频是否作为语音消息（PTT）发送
    pub voice_note: bool,
}

/// 发送回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: String,
    pub timestamp: i64,
}

/// WhatsApp Client Port
///
/// 一个实例对应一个会话的协议客户端
#[async_trait]
pub trait WhatsAppClientPort: Send + Sync {
    /// 建立连接；未配对时返回 needs_auth 和首个二维码
    async fn connect(&self) -> Result<ConnectOutcome, ClientError>;

    /// 以手机号请求配对码
    async fn pair_phone(&self, phone: &str) -> Result<String, ClientError>;

    /// 断开连接，保留凭证
    async fn disconnect(&self) -> Result<(), ClientError>;

    /// 登出并清除设备凭证
    async fn logout(&self) -> Result<(), ClientError>;

    async fn is_connected(&self) -> bool;

    async fn is_authenticated(&self) -> bool;

    async fn jid(&self) -> Option<WhatsAppJid>;

    async fn send_media(&self, media: OutgoingMedia) -> Result<SendReceipt, ClientError>;

    /// 订阅协议事件
    fn subscribe(&self) -> broadcast::Receiver<ClientEvent>;
}

/// 客户端工厂
///
/// 按会话存储的凭证构建客户端，不做网络 I/O
pub trait WhatsAppClientFactory: Send + Sync {
    fn create(
        &self,
        session_id: &SessionId,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Arc<dyn WhatsAppClientPort>, ClientError>;
}
