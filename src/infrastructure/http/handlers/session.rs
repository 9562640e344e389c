//! Session Handlers
//!
//! `:session` 路径参数可以是会话 ID，也可以是会话名称

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::application::{
    ConnectSessionCommand, CreateSessionCommand, DeleteSessionCommand, DisconnectSessionCommand,
    GetQrCodeQuery, ListSessionsQuery, LogoutSessionCommand, PairPhoneCommand,
    RenameSessionCommand, ResolveSessionQuery, SetProxyCommand,
};
use crate::infrastructure::http::dto::{ApiResponse, SessionActionDto, SessionDto, SessionListDto};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

// ============================================================================
// Create / List / Info
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<ApiResponse<SessionDto>>, ApiError> {
    let ctx = state.request_context();
    let session = state
        .create_session_handler
        .handle(&ctx, CreateSessionCommand { name: req.name })
        .await?;

    Ok(Json(ApiResponse::success(SessionDto::from(&session))))
}

/// limit 省略或为 0 时返回全部
#[derive(Debug, Default, Deserialize)]
pub struct ListSessionsParams {
    pub status: Option<String>,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListSessionsParams>,
) -> Result<Json<ApiResponse<SessionListDto>>, ApiError> {
    let ctx = state.request_context();
    let query = ListSessionsQuery {
        status: params.status,
        limit: params.limit,
        offset: params.offset,
    };
    let result = state.list_sessions_handler.handle(&ctx, query).await?;

    Ok(Json(ApiResponse::success(SessionListDto {
        sessions: result.sessions.iter().map(SessionDto::from).collect(),
        total: result.total,
        limit: params.limit,
        offset: params.offset,
    })))
}

#[derive(Debug, Serialize)]
pub struct SessionInfoDto {
    pub session: SessionDto,
    pub identifier_type: &'static str,
}

pub async fn session_info(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> Result<Json<ApiResponse<SessionInfoDto>>, ApiError> {
    let ctx = state.request_context();
    let result = state
        .resolve_session_handler
        .handle(&ctx, ResolveSessionQuery { identifier: session })
        .await?;

    Ok(Json(ApiResponse::success(SessionInfoDto {
        session: SessionDto::from(&result.session),
        identifier_type: result.identifier_type.as_str(),
    })))
}

// ============================================================================
// Connect / Pair / QR
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ConnectResponseDto {
    pub session: SessionDto,
    pub qr_code: Option<String>,
    pub needs_auth: bool,
    pub message: String,
}

pub async fn connect_session(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> Result<Json<ApiResponse<ConnectResponseDto>>, ApiError> {
    let ctx = state.request_context();
    let result = state
        .connect_session_handler
        .handle(&ctx, ConnectSessionCommand { identifier: session })
        .await?;

    Ok(Json(ApiResponse::success(ConnectResponseDto {
        session: SessionDto::from(&result.session),
        qr_code: result.qr_code,
        needs_auth: result.needs_auth,
        message: result.message,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PairPhoneRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct PairPhoneResponseDto {
    pub session: SessionDto,
    pub pairing_code: String,
    pub message: String,
}

pub async fn pair_phone(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(req): Json<PairPhoneRequest>,
) -> Result<Json<ApiResponse<PairPhoneResponseDto>>, ApiError> {
    let ctx = state.request_context();
    let cmd = PairPhoneCommand {
        identifier: session,
        phone: req.phone,
    };
    let result = state.pair_phone_handler.handle(&ctx, cmd).await?;

    Ok(Json(ApiResponse::success(PairPhoneResponseDto {
        session: SessionDto::from(&result.session),
        pairing_code: result.pairing_code,
        message: result.message,
    })))
}

#[derive(Debug, Serialize)]
pub struct QrCodeDto {
    pub session_id: String,
    pub status: String,
    pub qr_code: String,
}

pub async fn get_qr_code(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> Result<Json<ApiResponse<QrCodeDto>>, ApiError> {
    let ctx = state.request_context();
    let result = state
        .get_qr_code_handler
        .handle(&ctx, GetQrCodeQuery { identifier: session })
        .await?;

    Ok(Json(ApiResponse::success(QrCodeDto {
        session_id: result.session.id().to_string(),
        status: result.session.status().to_string(),
        qr_code: result.qr_code,
    })))
}

// ============================================================================
// Disconnect / Logout / Delete
// ============================================================================

pub async fn disconnect_session(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> Result<Json<ApiResponse<SessionActionDto>>, ApiError> {
    let ctx = state.request_context();
    let result = state
        .disconnect_session_handler
        .handle(&ctx, DisconnectSessionCommand { identifier: session })
        .await?;

    Ok(Json(ApiResponse::success(SessionActionDto {
        session: SessionDto::from(&result.session),
        message: result.message,
    })))
}

pub async fn logout_session(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> Result<Json<ApiResponse<SessionActionDto>>, ApiError> {
    let ctx = state.request_context();
    let result = state
        .logout_session_handler
        .handle(&ctx, LogoutSessionCommand { identifier: session })
        .await?;

    Ok(Json(ApiResponse::success(SessionActionDto {
        session: SessionDto::from(&result.session),
        message: result.message,
    })))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponseDto {
    pub id: String,
    pub message: String,
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> Result<Json<ApiResponse<DeleteResponseDto>>, ApiError> {
    let ctx = state.request_context();
    let result = state
        .delete_session_handler
        .handle(&ctx, DeleteSessionCommand { identifier: session })
        .await?;
    state.event_publisher.unregister_session(&result.id);

    Ok(Json(ApiResponse::success(DeleteResponseDto {
        id: result.id.to_string(),
        message: result.message,
    })))
}

// ============================================================================
// Rename / Proxy
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    pub name: String,
}

pub async fn rename_session(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(req): Json<RenameSessionRequest>,
) -> Result<Json<ApiResponse<SessionDto>>, ApiError> {
    let ctx = state.request_context();
    let cmd = RenameSessionCommand {
        identifier: session,
        new_name: req.name,
    };
    let renamed = state.rename_session_handler.handle(&ctx, cmd).await?;

    Ok(Json(ApiResponse::success(SessionDto::from(&renamed))))
}

/// host 为空表示清除代理
#[derive(Debug, Default, Deserialize)]
pub struct SetProxyRequest {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u32,
    #[serde(default, rename = "type", alias = "proxy_type")]
    pub proxy_type: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub async fn set_proxy(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(req): Json<SetProxyRequest>,
) -> Result<Json<ApiResponse<SessionActionDto>>, ApiError> {
    let ctx = state.request_context();
    let cmd = SetProxyCommand {
        identifier: session,
        host: req.host,
        port: req.port,
        proxy_type: req.proxy_type,
        username: req.username,
        password: req.password,
    };
    let result = state.set_proxy_handler.handle(&ctx, cmd).await?;

    Ok(Json(ApiResponse::success(SessionActionDto {
        session: SessionDto::from(&result.session),
        message: result.message,
    })))
}
