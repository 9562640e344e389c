//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping                                   GET     存活检查
//! - /api/health                                 GET     连接健康检查
//! - /api/sessions/add                           POST    创建会话
//! - /api/sessions/list                          GET     列出会话（status/limit/offset）
//! - /api/sessions/:session/info                 GET     按 ID 或名称解析会话
//! - /api/sessions/:session/connect              POST    连接（未配对时返回二维码）
//! - /api/sessions/:session/pair-phone           POST    手机号配对码
//! - /api/sessions/:session/qr                   GET     当前二维码
//! - /api/sessions/:session/disconnect           POST    断开（幂等）
//! - /api/sessions/:session/logout               POST    登出并清除设备凭证
//! - /api/sessions/:session/rename               POST    重命名
//! - /api/sessions/:session/proxy/set            POST    设置或清除代理
//! - /api/sessions/:session                      DELETE  删除会话
//! - /api/messages/:session/send/{kind}          POST    发送 image/audio/video/document
//! - /ws/events                                  WS      全局事件
//! - /ws/sessions/:session                       WS      单会话事件

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api", api_routes())
        .route("/ws/events", get(handlers::global_websocket_handler))
        .route("/ws/sessions/:session", get(handlers::session_websocket_handler))
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/health", get(handlers::health))
        .nest("/sessions", session_routes())
        .nest("/messages", message_routes())
}

/// Session 路由
fn session_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/add", post(handlers::create_session))
        .route("/list", get(handlers::list_sessions))
        .route("/:session", delete(handlers::delete_session))
        .route("/:session/info", get(handlers::session_info))
        .route("/:session/connect", post(handlers::connect_session))
        .route("/:session/pair-phone", post(handlers::pair_phone))
        .route("/:session/qr", get(handlers::get_qr_code))
        .route("/:session/disconnect", post(handlers::disconnect_session))
        .route("/:session/logout", post(handlers::logout_session))
        .route("/:session/rename", post(handlers::rename_session))
        .route("/:session/proxy/set", post(handlers::set_proxy))
}

/// Message 路由
fn message_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:session/send/image", post(handlers::send_image))
        .route("/:session/send/audio", post(handlers::send_audio))
        .route("/:session/send/video", post(handlers::send_video))
        .route("/:session/send/document", post(handlers::send_document))
}
