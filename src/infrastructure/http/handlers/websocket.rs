//! WebSocket Handler
//!
//! 推送 SessionEvent（二维码、配对码、上线、断开、登出、重连失败）

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::application::ResolveSessionQuery;
use crate::domain::session::SessionId;
use crate::infrastructure::events::SessionEvent;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 单会话事件流；路径参数可以是 ID 或名称
pub async fn session_websocket_handler(
    ws: WebSocketUpgrade,
    Path(session): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.request_context();
    let resolved = state
        .resolve_session_handler
        .handle(&ctx, ResolveSessionQuery { identifier: session })
        .await?;
    let session_id = *resolved.session.id();

    Ok(ws.on_upgrade(move |socket| handle_session_socket(socket, session_id, state)))
}

/// 全局事件流
pub async fn global_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_global_socket(socket, state))
}

async fn handle_session_socket(socket: WebSocket, session_id: SessionId, state: Arc<AppState>) {
    let events = state.event_publisher.subscribe_session(&session_id);
    tracing::info!(session_id = %session_id, "WebSocket connected");

    pump(socket, events, state.shutdown.clone()).await;

    state.event_publisher.release_if_idle(&session_id);
    tracing::info!(session_id = %session_id, "WebSocket disconnected");
}

async fn handle_global_socket(socket: WebSocket, state: Arc<AppState>) {
    let events = state.event_publisher.subscribe_global();
    tracing::info!("Global WebSocket connected");

    pump(socket, events, state.shutdown.clone()).await;

    tracing::info!("Global WebSocket disconnected");
}

/// 转发事件直到客户端关闭、通道关闭或服务关闭
async fn pump(
    socket: WebSocket,
    mut events: broadcast::Receiver<SessionEvent>,
    shutdown: tokio_util::sync::CancellationToken,
) {
    let (mut sender, mut receiver) = socket.split();

    // 事件转发任务
    let forward_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "WebSocket subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let msg = match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize event");
                    continue;
                }
            };

            if let Err(e) = sender.send(msg).await {
                tracing::debug!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
        let _ = sender.close().await;
    });

    // 接收客户端消息（ping 由 axum 自动回复 pong）
    let receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    tracing::debug!("WebSocket closed by client");
                    break;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    let forward_abort = forward_task.abort_handle();
    let receive_abort = receive_task.abort_handle();

    tokio::select! {
        _ = forward_task => {}
        _ = receive_task => {}
        _ = shutdown.cancelled() => {}
    }

    forward_abort.abort();
    receive_abort.abort();
}
