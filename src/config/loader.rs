//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, ClientBackend};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `WAGATE_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `WAGATE_SERVER__PORT=9000`
/// - `WAGATE_DATABASE__PATH=/data/wagate.db`
/// - `WAGATE_WHATSAPP__BACKEND=bridge`
/// - `WAGATE_WHATSAPP__BRIDGE_URL=http://bridge:4000`
/// - `WAGATE_AUTH__API_KEY=...`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("server.request_timeout_secs", 60)?
        .set_default("database.path", "data/wagate.db")?
        .set_default("database.max_connections", 5)?
        .set_default("whatsapp.backend", "fake")?
        .set_default("whatsapp.bridge_url", "")?
        .set_default("whatsapp.timeout_secs", 30)?
        .set_default("whatsapp.poll_interval_ms", 2000)?
        .set_default("reconnect.enabled", true)?
        .set_default("reconnect.interval_secs", 30)?
        .set_default("reconnect.max_concurrent", 4)?
        .set_default("reconnect.attempt_timeout_secs", 20)?
        .set_default("reconnect.initial_delay_secs", 2)?
        .set_default("auth.enabled", false)?
        .set_default("auth.api_key", "")?
        .set_default("rate_limit.enabled", false)?
        .set_default("rate_limit.requests_per_second", 50)?
        .set_default("rate_limit.burst", 100)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 例如: WAGATE_RECONNECT__INTERVAL_SECS=10
    builder = builder.add_source(
        Environment::with_prefix("WAGATE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("Server port cannot be 0"));
    }

    if config.server.request_timeout_secs == 0 {
        return Err(invalid("Request timeout cannot be 0"));
    }

    if config.database.path.trim().is_empty() {
        return Err(invalid("Database path cannot be empty"));
    }

    if config.whatsapp.backend == ClientBackend::Bridge {
        if config.whatsapp.bridge_url.trim().is_empty() {
            return Err(invalid("Bridge URL is required when backend is bridge"));
        }
        if url::Url::parse(&config.whatsapp.bridge_url).is_err() {
            return Err(invalid("Bridge URL is not a valid URL"));
        }
    }

    if config.reconnect.enabled {
        if config.reconnect.interval_secs == 0 {
            return Err(invalid("Reconnect interval cannot be 0 when reconnect is enabled"));
        }
        if config.reconnect.max_concurrent == 0 {
            return Err(invalid("Reconnect concurrency cannot be 0 when reconnect is enabled"));
        }
    }

    if config.auth.enabled && config.auth.api_key.trim().is_empty() {
        return Err(invalid("API key cannot be empty when auth is enabled"));
    }

    if config.rate_limit.enabled
        && (config.rate_limit.requests_per_second == 0 || config.rate_limit.burst == 0)
    {
        return Err(invalid("Rate limit and burst must be positive when rate limiting is enabled"));
    }

    Ok(())
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "***"
    }
}

/// 打印配置信息（用于启动时日志，敏感字段已隐藏）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}", config.server.addr());
    tracing::info!("Request Timeout: {}s", config.server.request_timeout_secs);
    tracing::info!("Database: {}", config.database.path);
    tracing::info!("Database Max Connections: {}", config.database.max_connections);
    tracing::info!("Client Backend: {}", config.whatsapp.backend.as_str());
    if config.whatsapp.backend == ClientBackend::Bridge {
        tracing::info!("Bridge URL: {}", config.whatsapp.bridge_url);
        tracing::info!(
            "Bridge Token: {}",
            redact(config.whatsapp.api_token.as_deref().unwrap_or_default())
        );
    }
    tracing::info!("Auto Reconnect: {}", config.reconnect.enabled);
    if config.reconnect.enabled {
        tracing::info!(
            "Reconnect Interval: {}s (max {} concurrent)",
            config.reconnect.interval_secs,
            config.reconnect.max_concurrent
        );
    }
    tracing::info!(
        "Auth: {} (key {})",
        config.auth.enabled,
        redact(&config.auth.api_key)
    );
    if config.rate_limit.enabled {
        tracing::info!(
            "Rate Limit: {}/s, burst {}",
            config.rate_limit.requests_per_second,
            config.rate_limit.burst
        );
    }
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_validation_passes_for_valid_config() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_db_path() {
        let mut config = AppConfig::default();
        config.database.path = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_bridge_backend_requires_url() {
        let mut config = AppConfig::default();
        config.whatsapp.backend = ClientBackend::Bridge;
        assert!(validate_config(&config).is_err());

        config.whatsapp.bridge_url = "http://bridge:4000".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_reconnect_and_auth_constraints() {
        let mut config = AppConfig::default();
        config.reconnect.interval_secs = 0;
        assert!(validate_config(&config).is_err());

        config.reconnect.enabled = false;
        assert!(validate_config(&config).is_ok());

        config.auth.enabled = true;
        assert!(validate_config(&config).is_err());
        config.auth.api_key = "key".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let file = write_config(
            r#"
[server]
port = 9090

[whatsapp]
backend = "bridge"
bridge_url = "http://bridge.local:4000"

[reconnect]
interval_secs = 5
"#,
        );

        let config = load_config_from_path(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.whatsapp.backend, ClientBackend::Bridge);
        assert_eq!(config.whatsapp.bridge_url, "http://bridge.local:4000");
        assert_eq!(config.reconnect.interval_secs, 5);
        assert_eq!(config.reconnect.max_concurrent, 4);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let file = write_config(
            r#"
[auth]
enabled = true
"#,
        );
        let err = load_config_from_path(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
