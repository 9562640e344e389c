//! Message Context - 消息限界上下文
//!
//! 职责:
//! - 媒体负载解码与 MIME 识别
//! - 分类型大小上限与类型白/黑名单
//! - 收件人地址规范化

mod media;
mod recipient;

use thiserror::Error;

pub use media::{decode_payload, mime_essence, sniff_mime, DecodedPayload, MediaKind};
pub use recipient::{normalize_recipient, DEFAULT_USER_SERVER};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("invalid media encoding: {0}")]
    InvalidEncoding(String),

    #[error("{kind} payload of {size} bytes exceeds the {max} byte limit")]
    TooLarge {
        kind: MediaKind,
        size: usize,
        max: usize,
    },

    #[error("unsupported {kind} MIME type: {mime}")]
    UnsupportedMime { kind: MediaKind, mime: String },

    #[error("could not determine {0} MIME type")]
    UnknownMime(MediaKind),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
}
