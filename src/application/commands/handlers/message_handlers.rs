//! Message Command Handlers - 媒体消息发送

use std::sync::Arc;

use crate::application::commands::{SendMediaCommand, SendMessageResponse};
use crate::application::context::RequestContext;
use crate::application::error::ApplicationError;
use crate::application::ports::{ConnectionManagerPort, OutgoingMedia, SessionRepositoryPort};
use crate::application::queries::handlers::resolve_session;
use crate::application::validation::Validate;
use crate::domain::message::{
    decode_payload, mime_essence, normalize_recipient, sniff_mime, MediaError, MediaKind,
};
use crate::domain::session::SessionStatus;

/// Send Media Handler
///
/// 发送流程：校验 → 解析会话 → 取活动客户端 → 解码 → 确定 MIME →
/// 大小限制 → 类型限制 → 规范化收件人 → 发送
pub struct SendMediaHandler {
    repo: Arc<dyn SessionRepositoryPort>,
    connections: Arc<dyn ConnectionManagerPort>,
}

impl SendMediaHandler {
    pub fn new(
        repo: Arc<dyn SessionRepositoryPort>,
        connections: Arc<dyn ConnectionManagerPort>,
    ) -> Self {
        Self { repo, connections }
    }

    pub async fn send_image(
        &self,
        ctx: &RequestContext,
        cmd: SendMediaCommand,
    ) -> Result<SendMessageResponse, ApplicationError> {
        self.handle(ctx, MediaKind::Image, cmd).await
    }

    pub async fn send_audio(
        &self,
        ctx: &RequestContext,
        cmd: SendMediaCommand,
    ) -> Result<SendMessageResponse, ApplicationError> {
        self.handle(ctx, MediaKind::Audio, cmd).await
    }

    pub async fn send_video(
        &self,
        ctx: &RequestContext,
        cmd: SendMediaCommand,
    ) -> Result<SendMessageResponse, ApplicationError> {
        self.handle(ctx, MediaKind::Video, cmd).await
    }

    pub async fn send_document(
        &self,
        ctx: &RequestContext,
        cmd: SendMediaCommand,
    ) -> Result<SendMessageResponse, ApplicationError> {
        self.handle(ctx, MediaKind::Document, cmd).await
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        kind: MediaKind,
        cmd: SendMediaCommand,
    ) -> Result<SendMessageResponse, ApplicationError> {
        cmd.validate()?;
        ctx.run(self.execute(kind, cmd)).await
    }

    async fn execute(
        &self,
        kind: MediaKind,
        cmd: SendMediaCommand,
    ) -> Result<SendMessageResponse, ApplicationError> {
        let (session, _) = resolve_session(self.repo.as_ref(), &cmd.identifier).await?;
        let id = *session.id();
        if session.status() != SessionStatus::Connected {
            return Err(ApplicationError::SessionNotConnected(id.to_string()));
        }

        let client = self.connections.get_client(&id)?;
        if !client.is_authenticated().await {
            return Err(ApplicationError::AuthenticationFailed(id.to_string()));
        }

        // 编码错误按发送失败处理，同样带回部分结果
        let payload = decode_payload(&cmd.data).map_err(|e| {
            send_failed(kind, cmd.recipient.trim().to_string(), None, e.to_string())
        })?;
        let file_name = cmd.file_name.as_deref();

        let mime = cmd
            .mime_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or(payload.declared_mime)
            .or_else(|| sniff_mime(kind, &payload.bytes, file_name))
            .ok_or(MediaError::UnknownMime(kind))?;

        kind.check_size(payload.bytes.len())?;
        kind.check_mime(&mime, file_name)?;

        let recipient = normalize_recipient(&cmd.recipient)?;
        let size = payload.bytes.len();

        let media = OutgoingMedia {
            kind,
            recipient: recipient.clone(),
            mime_type: mime_essence(&mime),
            data: payload.bytes,
            caption: cmd.caption.filter(|c| !c.trim().is_empty()),
            file_name: cmd.file_name,
            voice_note: kind == MediaKind::Audio && cmd.voice_note,
        };

        match client.send_media(media).await {
            Ok(receipt) => {
                tracing::info!(
                    session_id = %id,
                    kind = %kind,
                    recipient = %recipient,
                    size = size,
                    message_id = %receipt.message_id,
                    "Media message sent"
                );
                Ok(SendMessageResponse {
                    success: true,
                    kind,
                    recipient: recipient.to_string(),
                    message_id: Some(receipt.message_id),
                    mime_type: Some(mime_essence(&mime)),
                    timestamp: Some(receipt.timestamp),
                    error: None,
                })
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %id,
                    kind = %kind,
                    recipient = %recipient,
                    error = %e,
                    "Media message send failed"
                );
                Err(send_failed(
                    kind,
                    recipient.to_string(),
                    Some(mime_essence(&mime)),
                    e.to_string(),
                ))
            }
        }
    }
}

fn send_failed(
    kind: MediaKind,
    recipient: String,
    mime_type: Option<String>,
    error: String,
) -> ApplicationError {
    let partial = SendMessageResponse {
        success: false,
        kind,
        recipient,
        message_id: None,
        mime_type,
        timestamp: None,
        error: Some(error.clone()),
    };
    ApplicationError::MessageSendFailed {
        message: error,
        partial: Box::new(partial),
    }
}
