//! Ping / Health Handlers
//!
//! `/api/ping` 只表示进程存活；`/api/health` 检查所有活动连接

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::application::{ApplicationError, ConnectionError};
use crate::infrastructure::http::dto::ApiResponse;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// Ping 响应
#[derive(Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Ping endpoint
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
    pub registered: usize,
    pub connected: usize,
    pub authenticated: usize,
}

/// Health endpoint - 已认证但离线的会话使其返回 503
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<HealthDto>>, ApiError> {
    match state.connections.health_check().await {
        Ok(report) => Ok(Json(ApiResponse::success(HealthDto {
            status: "ok",
            registered: report.registered,
            connected: report.connected,
            authenticated: report.authenticated,
        }))),
        Err(ConnectionError::Unhealthy(ids)) => {
            let sessions: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            Err(ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "UNHEALTHY",
                format!("{} authenticated session(s) are offline", sessions.len()),
            )
            .with_data(serde_json::json!({ "sessions": sessions })))
        }
        Err(e) => Err(ApplicationError::from(e).into()),
    }
}
