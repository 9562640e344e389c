//! Message Context - 媒体类型、大小限制与 MIME 识别

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use super::MediaError;

const MIB: usize = 1024 * 1024;

/// 媒体种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
        }
    }

    /// 解码后负载的最大字节数
    pub fn max_size(&self) -> usize {
        match self {
            MediaKind::Image => 16 * MIB,
            MediaKind::Audio => 16 * MIB,
            MediaKind::Video => 64 * MIB,
            MediaKind::Document => 100 * MIB,
        }
    }

    /// 恰好等于上限时接受
    pub fn check_size(&self, len: usize) -> Result<(), MediaError> {
        let max = self.max_size();
        if len > max {
            return Err(MediaError::TooLarge {
                kind: *self,
                size: len,
                max,
            });
        }
        Ok(())
    }

    /// 校验 MIME 类型：图片/音频/视频走白名单，文档走黑名单
    pub fn check_mime(&self, mime: &str, file_name: Option<&str>) -> Result<(), MediaError> {
        let essence = mime_essence(mime);
        let allowed = match self {
            MediaKind::Image => IMAGE_ALLOWED.contains(&essence.as_str()),
            MediaKind::Audio => AUDIO_ALLOWED.contains(&essence.as_str()),
            MediaKind::Video => VIDEO_ALLOWED.contains(&essence.as_str()),
            MediaKind::Document => {
                let denied_ext = file_name
                    .and_then(extension_of)
                    .is_some_and(|ext| DOCUMENT_DENIED_EXTENSIONS.contains(&ext.as_str()));
                !denied_ext && !DOCUMENT_DENIED.contains(&essence.as_str())
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(MediaError::UnsupportedMime {
                kind: *self,
                mime: mime.to_string(),
            })
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const IMAGE_ALLOWED: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

const AUDIO_ALLOWED: &[&str] = &[
    "audio/ogg",
    "audio/mpeg",
    "audio/mp3",
    "audio/mp4",
    "audio/aac",
    "audio/amr",
    "audio/wav",
    "audio/x-wav",
    "audio/webm",
];

const VIDEO_ALLOWED: &[&str] = &[
    "video/mp4",
    "video/3gpp",
    "video/quicktime",
    "video/webm",
    "video/x-msvideo",
];

const DOCUMENT_DENIED: &[&str] = &[
    "application/x-msdownload",
    "application/x-executable",
    "application/x-sh",
    "application/x-bat",
    "application/x-msdos-program",
    "application/vnd.microsoft.portable-executable",
    "application/x-elf",
];

const DOCUMENT_DENIED_EXTENSIONS: &[&str] = &["exe", "bat", "cmd", "sh", "msi", "com", "scr"];

/// 文档扩展名 -> MIME
const DOCUMENT_EXTENSIONS: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("zip", "application/zip"),
    ("rar", "application/vnd.rar"),
    ("7z", "application/x-7z-compressed"),
    ("exe", "application/x-msdownload"),
    ("msi", "application/x-msdownload"),
    ("sh", "application/x-sh"),
    ("bat", "application/x-bat"),
];

/// 去掉参数并小写，如 `audio/ogg; codecs=opus` -> `audio/ogg`
pub fn mime_essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// 解码后的媒体负载
#[derive(Debug, Clone)]
pub struct DecodedPayload {
    pub bytes: Vec<u8>,
    /// data URL 中声明的 MIME（如有）
    pub declared_mime: Option<String>,
}

/// 解码 base64 负载，支持 `data:<mime>;base64,` 前缀
pub fn decode_payload(raw: &str) -> Result<DecodedPayload, MediaError> {
    let raw = raw.trim();
    let (declared_mime, data) = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| MediaError::InvalidEncoding("malformed data URL".to_string()))?;
            let header = header.strip_suffix(";base64").ok_or_else(|| {
                MediaError::InvalidEncoding("data URL must be base64 encoded".to_string())
            })?;
            let mime = Some(header.to_string()).filter(|m| !m.is_empty());
            (mime, data)
        }
        None => (None, raw),
    };

    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(MediaError::InvalidEncoding("payload is empty".to_string()));
    }

    let bytes = STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| MediaError::InvalidEncoding(e.to_string()))?;

    Ok(DecodedPayload {
        bytes,
        declared_mime,
    })
}

/// 按魔数识别 MIME（文档额外参考扩展名）
pub fn sniff_mime(kind: MediaKind, bytes: &[u8], file_name: Option<&str>) -> Option<String> {
    let sniffed = match kind {
        MediaKind::Image => sniff_image(bytes),
        MediaKind::Audio => sniff_audio(bytes),
        MediaKind::Video => sniff_video(bytes),
        MediaKind::Document => sniff_document(bytes, file_name),
    };
    sniffed.map(str::to_string)
}

fn riff_form(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") {
        Some(&bytes[8..12])
    } else {
        None
    }
}

fn ftyp_brand(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        Some(&bytes[8..12])
    } else {
        None
    }
}

fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if matches!(riff_form(bytes), Some(b"WEBP")) {
        Some("image/webp")
    } else {
        None
    }
}

fn sniff_audio(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"OggS") {
        Some("audio/ogg")
    } else if bytes.starts_with(b"ID3") {
        Some("audio/mpeg")
    } else if bytes.starts_with(b"#!AMR") {
        Some("audio/amr")
    } else if matches!(riff_form(bytes), Some(b"WAVE")) {
        Some("audio/wav")
    } else if ftyp_brand(bytes).is_some_and(|b| b.starts_with(b"M4A")) {
        Some("audio/mp4")
    } else if bytes.len() >= 2 && bytes[0] == 0xFF {
        match bytes[1] {
            0xFB | 0xF3 | 0xF2 => Some("audio/mpeg"),
            0xF1 | 0xF9 => Some("audio/aac"),
            _ => None,
        }
    } else {
        None
    }
}

fn sniff_video(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/webm");
    }
    if matches!(riff_form(bytes), Some(b"AVI ")) {
        return Some("video/x-msvideo");
    }
    match ftyp_brand(bytes)? {
        b"qt  " => Some("video/quicktime"),
        brand if brand.starts_with(b"3g") => Some("video/3gpp"),
        _ => Some("video/mp4"),
    }
}

fn sniff_document(bytes: &[u8], file_name: Option<&str>) -> Option<&'static str> {
    let ext = file_name.and_then(extension_of);
    let by_ext = ext.as_deref().and_then(|ext| {
        DOCUMENT_EXTENSIONS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, mime)| *mime)
    });

    if bytes.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    if bytes.starts_with(b"MZ") {
        return Some("application/x-msdownload");
    }
    if bytes.starts_with(&[0x7F, b'E', b'L', b'F']) {
        return Some("application/x-elf");
    }
    if bytes.starts_with(&[b'P', b'K', 0x03, 0x04]) {
        // docx/xlsx/pptx 都是 zip 容器
        return match ext.as_deref() {
            Some("docx") | Some("xlsx") | Some("pptx") => by_ext,
            _ => Some("application/zip"),
        };
    }

    Some(by_ext.unwrap_or("application/octet-stream"))
}
