//! Message Commands - 媒体消息发送命令

use serde::{Deserialize, Serialize};

use crate::application::error::ApplicationError;
use crate::application::validation::{require, Validate};
use crate::domain::message::MediaKind;

/// caption 最大字符数
pub const CAPTION_MAX_LEN: usize = 1024;

/// 发送媒体消息
///
/// `data` 为 base64，可带 `data:<mime>;base64,` 前缀
#[derive(Debug, Clone, Default)]
pub struct SendMediaCommand {
    pub identifier: String,
    pub recipient: String,
    pub data: String,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub file_name: Option<String>,
    /// 仅音频：作为语音消息发送
    pub voice_note: bool,
}

impl Validate for SendMediaCommand {
    fn validate(&self) -> Result<(), ApplicationError> {
        require("session", &self.identifier)?;
        require("recipient", &self.recipient)?;
        require("data", &self.data)?;
        if let Some(caption) = &self.caption {
            if caption.chars().count() > CAPTION_MAX_LEN {
                return Err(ApplicationError::validation(format!(
                    "caption must be at most {} characters",
                    CAPTION_MAX_LEN
                )));
            }
        }
        Ok(())
    }
}

/// 发送结果
///
/// 发送失败时 success=false 并带 error，同时作为错误的附带数据返回
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub kind: MediaKind,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
