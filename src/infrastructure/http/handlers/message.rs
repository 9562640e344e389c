//! Message Handlers
//!
//! 四种媒体共用同一请求体，仅种类不同

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::application::{SendMediaCommand, SendMessageResponse};
use crate::domain::message::MediaKind;
use crate::infrastructure::http::dto::ApiResponse;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMediaRequest {
    #[serde(alias = "to", alias = "phone")]
    pub recipient: String,
    /// base64，可带 data URL 前缀
    #[serde(alias = "base64")]
    pub data: String,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub file_name: Option<String>,
    #[serde(default)]
    pub voice_note: bool,
}

async fn send(
    state: Arc<AppState>,
    kind: MediaKind,
    session: String,
    req: SendMediaRequest,
) -> Result<Json<ApiResponse<SendMessageResponse>>, ApiError> {
    let ctx = state.request_context();
    let cmd = SendMediaCommand {
        identifier: session,
        recipient: req.recipient,
        data: req.data,
        mime_type: req.mime_type,
        caption: req.caption,
        file_name: req.file_name,
        voice_note: req.voice_note,
    };
    let result = state.send_media_handler.handle(&ctx, kind, cmd).await?;

    Ok(Json(ApiResponse::success(result)))
}

pub async fn send_image(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(req): Json<SendMediaRequest>,
) -> Result<Json<ApiResponse<SendMessageResponse>>, ApiError> {
    send(state, MediaKind::Image, session, req).await
}

pub async fn send_audio(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(req): Json<SendMediaRequest>,
) -> Result<Json<ApiResponse<SendMessageResponse>>, ApiError> {
    send(state, MediaKind::Audio, session, req).await
}

pub async fn send_video(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(req): Json<SendMediaRequest>,
) -> Result<Json<ApiResponse<SendMessageResponse>>, ApiError> {
    send(state, MediaKind::Video, session, req).await
}

pub async fn send_document(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(req): Json<SendMediaRequest>,
) -> Result<Json<ApiResponse<SendMessageResponse>>, ApiError> {
    send(state, MediaKind::Document, session, req).await
}
