//! Session Context - Aggregate Root

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SessionError, SessionId, SessionName, SessionStatus, WhatsAppJid};

/// Session 聚合根
///
/// 不变量:
/// - 名称始终满足 SessionName 规则
/// - wa_jid 仅在 Connected 状态下存在
/// - 已连接时不能再次 connect
/// - 每次修改都刷新 updated_at
///
/// `Connecting` 是瞬态：会写入存储以便查询，但进程重启后不保证保留
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    name: SessionName,
    status: SessionStatus,
    wa_jid: Option<WhatsAppJid>,
    proxy_url: Option<String>,
    qr_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    /// 创建新会话（Disconnected，无 JID）
    pub fn new(name: SessionName) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            name,
            status: SessionStatus::Disconnected,
            wa_jid: None,
            proxy_url: None,
            qr_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 从持久化数据重建
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: SessionId,
        name: SessionName,
        status: SessionStatus,
        wa_jid: Option<WhatsAppJid>,
        proxy_url: Option<String>,
        qr_code: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let session = Self {
            id,
            name,
            status,
            wa_jid,
            proxy_url,
            qr_code,
            created_at,
            updated_at,
        };
        session.validate()?;
        Ok(session)
    }

    /// 校验聚合不变量
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.wa_jid.is_some() && self.status != SessionStatus::Connected {
            return Err(SessionError::InvariantViolation(format!(
                "session {} has a JID while {}",
                self.id, self.status
            )));
        }
        if self.updated_at < self.created_at {
            return Err(SessionError::InvariantViolation(format!(
                "session {} updated_at precedes created_at",
                self.id
            )));
        }
        Ok(())
    }

    /// 进入 Connecting（等待扫码 / 配对码）
    pub fn start_connecting(&mut self) -> Result<(), SessionError> {
        if self.status == SessionStatus::Connected {
            return Err(SessionError::AlreadyConnected);
        }
        self.status = SessionStatus::Connecting;
        self.wa_jid = None;
        self.touch();
        Ok(())
    }

    /// 认证完成，进入 Connected
    pub fn connect(&mut self, jid: WhatsAppJid) -> Result<(), SessionError> {
        if self.status == SessionStatus::Connected {
            return Err(SessionError::AlreadyConnected);
        }
        self.status = SessionStatus::Connected;
        self.wa_jid = Some(jid);
        self.qr_code = None;
        self.touch();
        Ok(())
    }

    /// 断开连接，清空 JID 和二维码
    pub fn disconnect(&mut self) {
        self.status = SessionStatus::Disconnected;
        self.wa_jid = None;
        self.qr_code = None;
        self.touch();
    }

    pub fn rename(&mut self, name: SessionName) {
        self.name = name;
        self.touch();
    }

    pub fn set_proxy_url(&mut self, proxy_url: Option<String>) {
        self.proxy_url = proxy_url.filter(|u| !u.trim().is_empty());
        self.touch();
    }

    pub fn set_qr_code(&mut self, qr_code: Option<String>) {
        self.qr_code = qr_code;
        self.touch();
    }

    fn touch(&mut self) {
        let now = Utc::now();
        // 保证单调递增，同一时钟刻度内的连续修改也能区分
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
    }

    // Getters
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn name(&self) -> &SessionName {
        &self.name
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn wa_jid(&self) -> Option<&WhatsAppJid> {
        self.wa_jid.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Connected
    }

    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy_url.as_deref()
    }

    pub fn qr_code(&self) -> Option<&str> {
        self.qr_code.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
