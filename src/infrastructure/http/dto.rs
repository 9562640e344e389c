//! Data Transfer Objects

use serde::{Deserialize, Serialize};

use crate::domain::session::{ProxyConfig, Session};

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

// ============================================================================
// Session DTOs
// ============================================================================

/// 会话视图（不含二维码，代理密码已隐藏）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDto {
    pub id: String,
    pub name: String,
    pub status: String,
    pub wa_jid: Option<String>,
    pub is_active: bool,
    pub proxy: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Session> for SessionDto {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id().to_string(),
            name: session.name().to_string(),
            status: session.status().as_str().to_string(),
            wa_jid: session.wa_jid().map(|j| j.to_string()),
            is_active: session.is_active(),
            proxy: session
                .proxy_url()
                .and_then(|url| ProxyConfig::from_url(url).ok())
                .map(|proxy| proxy.redacted_url()),
            created_at: session.created_at().to_rfc3339(),
            updated_at: session.updated_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionListDto {
    pub sessions: Vec<SessionDto>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// 带提示信息的会话操作结果
#[derive(Debug, Serialize)]
pub struct SessionActionDto {
    pub session: SessionDto,
    pub message: String,
}
