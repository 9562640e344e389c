//! Message Context - 收件人地址规范化

use super::MediaError;
use crate::domain::session::WhatsAppJid;

/// 个人用户默认域名
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";

const MIN_PHONE_DIGITS: usize = 5;
const MAX_PHONE_DIGITS: usize = 20;

/// 规范化收件人
///
/// - 去掉空格和 `+ - ( ) .` 等格式字符
/// - 已带 `@` 的按 JID 校验后原样使用（群组 `@g.us` 等）
/// - 纯号码追加 `@s.whatsapp.net`
pub fn normalize_recipient(raw: &str) -> Result<WhatsAppJid, MediaError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MediaError::InvalidRecipient("recipient is required".to_string()));
    }

    if trimmed.contains('@') {
        let (user, server) = trimmed.split_once('@').unwrap_or_default();
        let user: String = user.chars().filter(|c| !is_formatting(*c)).collect();
        return WhatsAppJid::parse(&format!("{}@{}", user, server))
            .map_err(|e| MediaError::InvalidRecipient(e.to_string()));
    }

    let digits: String = trimmed.chars().filter(|c| !is_formatting(*c)).collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(MediaError::InvalidRecipient(format!(
            "'{}' is not a phone number or JID",
            raw
        )));
    }
    if digits.len() < MIN_PHONE_DIGITS || digits.len() > MAX_PHONE_DIGITS {
        return Err(MediaError::InvalidRecipient(format!(
            "phone number must have {}-{} digits",
            MIN_PHONE_DIGITS, MAX_PHONE_DIGITS
        )));
    }

    WhatsAppJid::parse(&format!("{}@{}", digits, DEFAULT_USER_SERVER))
        .map_err(|e| MediaError::InvalidRecipient(e.to_string()))
}

fn is_formatting(c: char) -> bool {
    c.is_whitespace() || matches!(c, '+' | '-' | '(' | ')' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_number_gets_default_server() {
        let jid = normalize_recipient("+55 (11) 99999-9999").unwrap();
        assert_eq!(jid.as_str(), "5511999999999@s.whatsapp.net");
    }

    #[test]
    fn test_jid_kept() {
        let jid = normalize_recipient("120363025246125486@g.us").unwrap();
        assert_eq!(jid.as_str(), "120363025246125486@g.us");

        let jid = normalize_recipient("+5511999999999@s.whatsapp.net").unwrap();
        assert_eq!(jid.as_str(), "5511999999999@s.whatsapp.net");
    }

    #[test]
    fn test_invalid_recipients() {
        assert!(normalize_recipient("").is_err());
        assert!(normalize_recipient("call me maybe").is_err());
        assert!(normalize_recipient("123").is_err());
        assert!(normalize_recipient("@g.us").is_err());
    }
}
