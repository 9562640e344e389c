//! Session Queries - 会话查询

use crate::application::error::ApplicationError;
use crate::application::validation::{require, Validate};
use crate::domain::session::{IdentifierType, Session, SessionStatus};

/// 按 ID 或名称解析会话
#[derive(Debug, Clone)]
pub struct ResolveSessionQuery {
    pub identifier: String,
}

impl Validate for ResolveSessionQuery {
    fn validate(&self) -> Result<(), ApplicationError> {
        require("session", &self.identifier)
    }
}

#[derive(Debug, Clone)]
pub struct ResolveSessionResponse {
    pub session: Session,
    pub identifier_type: IdentifierType,
}

/// 分页列出会话；limit 为 0 时返回全部
#[derive(Debug, Clone, Default)]
pub struct ListSessionsQuery {
    pub status: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl ListSessionsQuery {
    pub fn parsed_status(&self) -> Result<Option<SessionStatus>, ApplicationError> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => SessionStatus::from_str(&raw.to_ascii_lowercase())
                .map(Some)
                .ok_or_else(|| {
                    ApplicationError::validation(format!(
                        "status must be one of disconnected, connecting, connected (got '{}')",
                        raw
                    ))
                }),
        }
    }
}

impl Validate for ListSessionsQuery {
    fn validate(&self) -> Result<(), ApplicationError> {
        self.parsed_status().map(|_| ())
    }
}

#[derive(Debug, Clone)]
pub struct ListSessionsResponse {
    pub sessions: Vec<Session>,
    pub total: u64,
}

/// 获取当前二维码
#[derive(Debug, Clone)]
pub struct GetQrCodeQuery {
    pub identifier: String,
}

impl Validate for GetQrCodeQuery {
    fn validate(&self) -> Result<(), ApplicationError> {
        require("session", &self.identifier)
    }
}

#[derive(Debug, Clone)]
pub struct QrCodeResponse {
    pub session: Session,
    pub qr_code: String,
}
