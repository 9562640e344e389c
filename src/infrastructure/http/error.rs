//! HTTP Error Handling
//!
//! 应用层错误到 HTTP 状态码与统一错误体的映射

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::application::{ApplicationError, RepositoryError};

/// 统一错误响应格式
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errno: i32,
    pub code: &'static str,
    pub error: String,
    pub data: Option<Value>,
}

/// 错误码定义（与 HTTP 状态码一致）
pub mod errno {
    pub const BAD_REQUEST: i32 = 400;
    pub const UNAUTHORIZED: i32 = 401;
    pub const NOT_FOUND: i32 = 404;
    pub const CONFLICT: i32 = 409;
    pub const PRECONDITION_FAILED: i32 = 412;
    pub const PAYLOAD_TOO_LARGE: i32 = 413;
    pub const UNSUPPORTED_MEDIA_TYPE: i32 = 415;
    pub const TOO_MANY_REQUESTS: i32 = 429;
    pub const INTERNAL_ERROR: i32 = 500;
    pub const BAD_GATEWAY: i32 = 502;
    pub const SERVICE_UNAVAILABLE: i32 = 503;
    pub const GATEWAY_TIMEOUT: i32 = 504;
}

/// API 错误
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    data: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn too_many_requests() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Too many requests",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let errno = self.status.as_u16() as i32;
        if self.status.is_server_error() {
            tracing::error!(errno = errno, code = self.code, error = %self.message, "Request failed");
        } else {
            tracing::warn!(errno = errno, code = self.code, error = %self.message, "Request rejected");
        }

        let body = ErrorResponse {
            errno,
            code: self.code,
            error: self.message,
            data: self.data,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        ApplicationError::from(e).into()
    }
}

impl From<ApplicationError> for ApiError {
    fn from(e: ApplicationError) -> Self {
        let code = e.code();
        let message = e.to_string();
        let status = match &e {
            ApplicationError::NotFound { .. } | ApplicationError::ClientNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ApplicationError::ValidationError(_) | ApplicationError::InvalidIdentifier(_) => {
                StatusCode::BAD_REQUEST
            }
            ApplicationError::AlreadyExists(_) | ApplicationError::AlreadyConnected(_) => {
                StatusCode::CONFLICT
            }
            ApplicationError::SessionNotConnected(_) => StatusCode::PRECONDITION_FAILED,
            ApplicationError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            ApplicationError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApplicationError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApplicationError::MessageSendFailed { .. } => StatusCode::BAD_GATEWAY,
            ApplicationError::ExternalServiceError(_) | ApplicationError::Cancelled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApplicationError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApplicationError::RepositoryError(_) | ApplicationError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let error = ApiError::new(status, code, message);
        match e {
            ApplicationError::MessageSendFailed { partial, .. } => match serde_json::to_value(*partial) {
                Ok(data) => error.with_data(data),
                Err(_) => error,
            },
            _ => error,
        }
    }
}
