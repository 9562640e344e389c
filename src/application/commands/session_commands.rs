//! Session Commands - 会话相关命令

use crate::application::error::ApplicationError;
use crate::application::validation::{length_between, require, Validate};
use crate::domain::session::{Session, SessionId, SESSION_NAME_MAX_LEN, SESSION_NAME_MIN_LEN};

/// 标识最长长度（UUID 36 字符，名称 50 字符）
const IDENTIFIER_MAX_LEN: usize = 64;

fn validate_identifier(identifier: &str) -> Result<(), ApplicationError> {
    require("session", identifier)?;
    length_between("session", identifier, 1, IDENTIFIER_MAX_LEN)
}

/// 创建会话
#[derive(Debug, Clone)]
pub struct CreateSessionCommand {
    pub name: String,
}

impl Validate for CreateSessionCommand {
    fn validate(&self) -> Result<(), ApplicationError> {
        require("name", &self.name)?;
        length_between("name", &self.name, SESSION_NAME_MIN_LEN, SESSION_NAME_MAX_LEN)
    }
}

/// 连接会话
#[derive(Debug, Clone)]
pub struct ConnectSessionCommand {
    pub identifier: String,
}

impl Validate for ConnectSessionCommand {
    fn validate(&self) -> Result<(), ApplicationError> {
        validate_identifier(&self.identifier)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectSessionResponse {
    pub session: Session,
    pub qr_code: Option<String>,
    pub needs_auth: bool,
    pub message: String,
}

/// 手机号配对
#[derive(Debug, Clone)]
pub struct PairPhoneCommand {
    pub identifier: String,
    pub phone: String,
}

impl Validate for PairPhoneCommand {
    fn validate(&self) -> Result<(), ApplicationError> {
        validate_identifier(&self.identifier)?;
        require("phone", &self.phone)?;
        let digits = self.phone.chars().filter(|c| c.is_ascii_digit()).count();
        if !(5..=20).contains(&digits) {
            return Err(ApplicationError::validation(
                "phone must contain between 5 and 20 digits",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PairPhoneResponse {
    pub session: Session,
    pub pairing_code: String,
    pub message: String,
}

/// 断开会话
#[derive(Debug, Clone)]
pub struct DisconnectSessionCommand {
    pub identifier: String,
}

impl Validate for DisconnectSessionCommand {
    fn validate(&self) -> Result<(), ApplicationError> {
        validate_identifier(&self.identifier)
    }
}

/// 断开 / 登出响应
#[derive(Debug, Clone)]
pub struct DisconnectSessionResponse {
    pub session: Session,
    pub message: String,
}

/// 登出会话（清除设备凭证）
#[derive(Debug, Clone)]
pub struct LogoutSessionCommand {
    pub identifier: String,
}

impl Validate for LogoutSessionCommand {
    fn validate(&self) -> Result<(), ApplicationError> {
        validate_identifier(&self.identifier)
    }
}

/// 删除会话
#[derive(Debug, Clone)]
pub struct DeleteSessionCommand {
    pub identifier: String,
}

impl Validate for DeleteSessionCommand {
    fn validate(&self) -> Result<(), ApplicationError> {
        validate_identifier(&self.identifier)
    }
}

#[derive(Debug, Clone)]
pub struct DeleteSessionResponse {
    pub id: SessionId,
    pub message: String,
}

/// 设置代理；host 为空表示清除
#[derive(Debug, Clone, Default)]
pub struct SetProxyCommand {
    pub identifier: String,
    pub host: String,
    pub port: u32,
    pub proxy_type: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SetProxyCommand {
    pub fn is_clear(&self) -> bool {
        self.host.trim().is_empty()
    }
}

impl Validate for SetProxyCommand {
    fn validate(&self) -> Result<(), ApplicationError> {
        validate_identifier(&self.identifier)?;
        if self.is_clear() {
            return Ok(());
        }
        if !(1..=65535).contains(&self.port) {
            return Err(ApplicationError::validation(
                "port must be between 1 and 65535",
            ));
        }
        require("proxy_type", &self.proxy_type)
    }
}

#[derive(Debug, Clone)]
pub struct SetProxyResponse {
    pub session: Session,
    pub message: String,
}

/// 重命名会话
#[derive(Debug, Clone)]
pub struct RenameSessionCommand {
    pub identifier: String,
    pub new_name: String,
}

impl Validate for RenameSessionCommand {
    fn validate(&self) -> Result<(), ApplicationError> {
        validate_identifier(&self.identifier)?;
        require("new_name", &self.new_name)?;
        length_between(
            "new_name",
            &self.new_name,
            SESSION_NAME_MIN_LEN,
            SESSION_NAME_MAX_LEN,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_name() {
        assert!(CreateSessionCommand { name: "alpha".into() }.validate().is_ok());
        assert!(CreateSessionCommand { name: " ".into() }.validate().is_err());
        assert!(CreateSessionCommand { name: "ab".into() }.validate().is_err());
    }

    #[test]
    fn test_set_proxy_port_range() {
        let mut cmd = SetProxyCommand {
            identifier: "alpha".into(),
            host: "proxy.local".into(),
            port: 0,
            proxy_type: "http".into(),
            ..Default::default()
        };
        assert!(cmd.validate().is_err());
        cmd.port = 70000;
        assert!(cmd.validate().is_err());
        cmd.port = 8080;
        assert!(cmd.validate().is_ok());

        // 清除代理不校验其余字段
        let clear = SetProxyCommand {
            identifier: "alpha".into(),
            ..Default::default()
        };
        assert!(clear.validate().is_ok());
    }

    #[test]
    fn test_pair_phone_digits() {
        let ok = PairPhoneCommand {
            identifier: "alpha".into(),
            phone: "+55 11 99999-9999".into(),
        };
        assert!(ok.validate().is_ok());
        let short = PairPhoneCommand {
            identifier: "alpha".into(),
            phone: "12".into(),
        };
        assert!(short.validate().is_err());
    }
}
