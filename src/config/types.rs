//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::time::Duration;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 协议客户端配置
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// 自动重连配置
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// API Key 认证
    #[serde(default)]
    pub auth: AuthConfig,

    /// 请求限流
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 单个请求的截止时间（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/wagate.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// 协议客户端后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientBackend {
    /// 进程内模拟客户端（本地开发）
    #[default]
    Fake,
    /// 外部协议桥接服务
    Bridge,
}

impl ClientBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientBackend::Fake => "fake",
            ClientBackend::Bridge => "bridge",
        }
    }
}

/// 协议客户端配置
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub backend: ClientBackend,

    /// 桥接服务基础 URL（backend = bridge 时必填）
    #[serde(default)]
    pub bridge_url: String,

    /// 桥接请求超时（秒）
    #[serde(default = "default_bridge_timeout")]
    pub timeout_secs: u64,

    /// 状态轮询间隔（毫秒）
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// 桥接服务令牌
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_bridge_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    2000
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            backend: ClientBackend::default(),
            bridge_url: String::new(),
            timeout_secs: default_bridge_timeout(),
            poll_interval_ms: default_poll_interval(),
            api_token: None,
        }
    }
}

/// 自动重连配置
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 扫描间隔（秒）
    #[serde(default = "default_reconnect_interval")]
    pub interval_secs: u64,

    /// 单轮最大并发重连数
    #[serde(default = "default_reconnect_concurrency")]
    pub max_concurrent: usize,

    /// 单次重连超时（秒）
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// 启动后首次扫描延迟（秒）
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_reconnect_interval() -> u64 {
    30
}

fn default_reconnect_concurrency() -> usize {
    4
}

fn default_attempt_timeout() -> u64 {
    20
}

fn default_initial_delay() -> u64 {
    2
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reconnect_interval(),
            max_concurrent: default_reconnect_concurrency(),
            attempt_timeout_secs: default_attempt_timeout(),
            initial_delay_secs: default_initial_delay(),
        }
    }
}

/// API Key 认证配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub api_key: String,
}

/// 请求限流配置
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,

    /// 每秒放行的请求数
    #[serde(default = "default_rps")]
    pub requests_per_second: u64,

    /// 排队上限，超出返回 429
    #[serde(default = "default_burst")]
    pub burst: usize,
}

fn default_rps() -> u64 {
    50
}

fn default_burst() -> usize {
    100
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: default_rps(),
            burst: default_burst(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.addr(), "0.0.0.0:8080");
        assert_eq!(config.server.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.database.path, "data/wagate.db");
        assert_eq!(config.whatsapp.backend, ClientBackend::Fake);
        assert!(config.reconnect.enabled);
        assert!(!config.auth.enabled);
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_backend_deserialize() {
        let backend: ClientBackend = serde_json::from_str("\"bridge\"").unwrap();
        assert_eq!(backend, ClientBackend::Bridge);
        assert!(serde_json::from_str::<ClientBackend>("\"whatsmeow\"").is_err());
    }
}
