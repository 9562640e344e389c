//! HTTP Middleware
//!
//! - 错误状态码日志
//! - 静态 API Key 认证

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::error::ApiError;

/// API Key 请求头
pub const API_KEY_HEADER: &str = "x-api-key";

/// 无需认证的路径
const PUBLIC_PATHS: &[&str] = &["/api/ping", "/api/health"];

/// HTTP 状态码错误日志中间件
///
/// 拦截 HTTP 响应，当状态码为 4xx 或 5xx 时记录日志
pub async fn error_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            "HTTP server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            "HTTP client error"
        );
    }

    response
}

/// 认证配置
#[derive(Clone)]
pub struct ApiKeyAuth {
    key: Arc<str>,
}

impl ApiKeyAuth {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Arc::from(key.into()),
        }
    }

    fn matches(&self, provided: &str) -> bool {
        let expected = self.key.as_bytes();
        let provided = provided.as_bytes();
        if expected.len() != provided.len() {
            return false;
        }
        // 逐字节比较耗时一致
        expected
            .iter()
            .zip(provided)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth").field("key", &"***").finish()
    }
}

fn provided_key(request: &Request) -> Option<&str> {
    let headers = request.headers();
    if let Some(value) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.trim());
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// API Key 认证中间件
///
/// 接受 `X-API-Key: <key>` 或 `Authorization: Bearer <key>`
pub async fn api_key_auth(
    State(auth): State<ApiKeyAuth>,
    request: Request,
    next: Next,
) -> Response {
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let verdict = provided_key(&request).map(|key| auth.matches(key));
    match verdict {
        Some(true) => next.run(request).await,
        Some(false) => ApiError::unauthorized("Invalid API key").into_response(),
        None => ApiError::unauthorized("Missing API key").into_response(),
    }
}
