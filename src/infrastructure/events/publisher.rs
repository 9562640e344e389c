//! Event Publisher Implementation
//!
//! WebSocket 事件推送实现

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::domain::session::SessionId;

const CHANNEL_CAPACITY: usize = 100;

/// WebSocket 事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// 新二维码
    QrCode { session_id: String, qr_code: String },
    /// 配对码已生成
    PairingCode {
        session_id: String,
        pairing_code: String,
    },
    /// 认证完成并在线
    Connected { session_id: String, jid: String },
    /// 连接断开
    Disconnected { session_id: String },
    /// 设备被登出
    LoggedOut { session_id: String },
    /// 自动重连失败
    ReconnectFailed { session_id: String, error: String },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::QrCode { session_id, .. }
            | SessionEvent::PairingCode { session_id, .. }
            | SessionEvent::Connected { session_id, .. }
            | SessionEvent::Disconnected { session_id }
            | SessionEvent::LoggedOut { session_id }
            | SessionEvent::ReconnectFailed { session_id, .. } => session_id,
        }
    }
}

/// 事件发布器
///
/// 每个事件同时发到全局通道和该会话的通道（如有订阅者）
pub struct EventPublisher {
    /// session_id -> broadcast sender
    session_channels: DashMap<SessionId, broadcast::Sender<SessionEvent>>,
    global_channel: broadcast::Sender<SessionEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (global_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            session_channels: DashMap::new(),
            global_channel: global_tx,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅全部会话的事件
    pub fn subscribe_global(&self) -> broadcast::Receiver<SessionEvent> {
        self.global_channel.subscribe()
    }

    /// 订阅单个会话的事件，按需创建通道
    pub fn subscribe_session(&self, session_id: &SessionId) -> broadcast::Receiver<SessionEvent> {
        self.session_channels
            .entry(*session_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// 会话删除时释放通道
    pub fn unregister_session(&self, session_id: &SessionId) {
        self.session_channels.remove(session_id);
    }

    /// 没有订阅者时释放通道
    pub fn release_if_idle(&self, session_id: &SessionId) {
        self.session_channels
            .remove_if(session_id, |_, tx| tx.receiver_count() == 0);
    }

    pub fn publish_qr_code(&self, session_id: &SessionId, qr_code: &str) {
        self.publish(
            session_id,
            SessionEvent::QrCode {
                session_id: session_id.to_string(),
                qr_code: qr_code.to_string(),
            },
        );
    }

    pub fn publish_pairing_code(&self, session_id: &SessionId, pairing_code: &str) {
        self.publish(
            session_id,
            SessionEvent::PairingCode {
                session_id: session_id.to_string(),
                pairing_code: pairing_code.to_string(),
            },
        );
    }

    pub fn publish_connected(&self, session_id: &SessionId, jid: &str) {
        self.publish(
            session_id,
            SessionEvent::Connected {
                session_id: session_id.to_string(),
                jid: jid.to_string(),
            },
        );
    }

    pub fn publish_disconnected(&self, session_id: &SessionId) {
        self.publish(
            session_id,
            SessionEvent::Disconnected {
                session_id: session_id.to_string(),
            },
        );
    }

    pub fn publish_logged_out(&self, session_id: &SessionId) {
        self.publish(
            session_id,
            SessionEvent::LoggedOut {
                session_id: session_id.to_string(),
            },
        );
    }

    pub fn publish_reconnect_failed(&self, session_id: &SessionId, error: &str) {
        self.publish(
            session_id,
            SessionEvent::ReconnectFailed {
                session_id: session_id.to_string(),
                error: error.to_string(),
            },
        );
    }

    fn publish(&self, session_id: &SessionId, event: SessionEvent) {
        if let Some(sender) = self.session_channels.get(session_id) {
            if let Err(e) = sender.send(event.clone()) {
                tracing::debug!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to publish session event (no receivers)"
                );
            }
        }
        if let Err(e) = self.global_channel.send(event) {
            tracing::debug!(
                session_id = %session_id,
                error = %e,
                "Failed to publish global event (no receivers)"
            );
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
