//! 应用层错误定义
//!
//! 统一的命令/查询错误类型

use thiserror::Error;

use crate::application::commands::SendMessageResponse;
use crate::application::ports::{ClientError, ConnectionError, RepositoryError};
use crate::domain::message::MediaError;
use crate::domain::session::SessionError;

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 标识既不是合法 ID 也不是合法名称
    #[error("Invalid session identifier: {0}")]
    InvalidIdentifier(String),

    /// 名称冲突
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Session {0} is already connected")]
    AlreadyConnected(String),

    #[error("No live client for session {0}")]
    ClientNotFound(String),

    #[error("Session {0} is not connected")]
    SessionNotConnected(String),

    #[error("Session {0} is not authenticated")]
    AuthenticationFailed(String),

    /// 发送失败，携带部分结果
    #[error("Message send failed: {message}")]
    MessageSendFailed {
        message: String,
        partial: Box<SendMessageResponse>,
    },

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request timed out")]
    Timeout,

    /// 仓储错误
    #[error("Repository error: {0}")]
    RepositoryError(String),

    /// 外部服务错误
    #[error("External service error: {0}")]
    ExternalServiceError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// 机器可读的错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::AlreadyConnected(_) => "ALREADY_CONNECTED",
            Self::ClientNotFound(_) => "CLIENT_NOT_FOUND",
            Self::SessionNotConnected(_) => "SESSION_NOT_CONNECTED",
            Self::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Self::MessageSendFailed { .. } => "MESSAGE_SEND_FAILED",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            Self::Cancelled => "CANCELLED",
            Self::Timeout => "TIMEOUT",
            Self::RepositoryError(_) => "REPOSITORY_ERROR",
            Self::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => Self::not_found("Session", id),
            RepositoryError::Duplicate(name) => Self::AlreadyExists(name),
            other => Self::RepositoryError(other.to_string()),
        }
    }
}

impl From<SessionError> for ApplicationError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidIdentifier(input) => Self::InvalidIdentifier(input),
            SessionError::AlreadyConnected => Self::AlreadyConnected(err.to_string()),
            SessionError::InvariantViolation(msg) => Self::InternalError(msg),
            other => Self::ValidationError(other.to_string()),
        }
    }
}

impl From<ClientError> for ApplicationError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Timeout => Self::Timeout,
            ClientError::NotAuthenticated => Self::AuthenticationFailed(err.to_string()),
            other => Self::ExternalServiceError(other.to_string()),
        }
    }
}

impl From<ConnectionError> for ApplicationError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::ClientNotFound(id) => Self::ClientNotFound(id.to_string()),
            ConnectionError::AlreadyConnected(id) => Self::AlreadyConnected(id.to_string()),
            ConnectionError::SessionNotFound(id) => Self::not_found("Session", id.to_string()),
            ConnectionError::NotConnected(id) => Self::SessionNotConnected(id.to_string()),
            ConnectionError::InvalidProxy { reason, .. } => Self::ValidationError(reason),
            ConnectionError::Client(e) => e.into(),
            ConnectionError::Repository(e) => e.into(),
            ConnectionError::Unhealthy(ids) => {
                Self::ExternalServiceError(format!("{} unhealthy connections", ids.len()))
            }
        }
    }
}

impl From<MediaError> for ApplicationError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::TooLarge { .. } => Self::PayloadTooLarge(err.to_string()),
            MediaError::UnsupportedMime { .. } | MediaError::UnknownMime(_) => {
                Self::UnsupportedMediaType(err.to_string())
            }
            MediaError::InvalidEncoding(_) | MediaError::InvalidRecipient(_) => {
                Self::ValidationError(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::MediaKind;
    use crate::domain::session::SessionId;

    #[test]
    fn test_repository_errors_map_by_kind() {
        let err: ApplicationError = RepositoryError::NotFound("abc".into()).into();
        assert_eq!(err.code(), "NOT_FOUND");

        let err: ApplicationError = RepositoryError::Duplicate("alpha".into()).into();
        assert!(matches!(err, ApplicationError::AlreadyExists(_)));

        let err: ApplicationError = RepositoryError::DatabaseError("locked".into()).into();
        assert_eq!(err.code(), "REPOSITORY_ERROR");
    }

    #[test]
    fn test_connection_errors_map_by_kind() {
        let id = SessionId::new();
        let err: ApplicationError = ConnectionError::ClientNotFound(id).into();
        assert_eq!(err.code(), "CLIENT_NOT_FOUND");

        let err: ApplicationError = ConnectionError::AlreadyConnected(id).into();
        assert_eq!(err.code(), "ALREADY_CONNECTED");

        let err: ApplicationError = ConnectionError::NotConnected(id).into();
        assert_eq!(err.code(), "SESSION_NOT_CONNECTED");

        let err: ApplicationError = ConnectionError::Client(ClientError::Timeout).into();
        assert!(matches!(err, ApplicationError::Timeout));
    }

    #[test]
    fn test_media_errors_map_by_kind() {
        let err: ApplicationError = MediaKind::Image
            .check_size(MediaKind::Image.max_size() + 1)
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "PAYLOAD_TOO_LARGE");
        assert!(err.to_string().contains("exceeds"));

        let err: ApplicationError = MediaKind::Image.check_mime("image/tiff", None).unwrap_err().into();
        assert_eq!(err.code(), "UNSUPPORTED_MEDIA_TYPE");
    }
}
