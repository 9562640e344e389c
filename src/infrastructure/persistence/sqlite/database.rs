//! SQLite Database - 连接池与表结构

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// 数据库位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    /// 单连接内存库，连接关闭即丢失（测试用）
    Memory,
}

/// 数据库配置
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub location: DatabaseLocation,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("data/wagate.db", 5)
    }
}

impl DatabaseConfig {
    pub fn new(path: impl AsRef<Path>, max_connections: u32) -> Self {
        Self {
            location: DatabaseLocation::File(path.as_ref().to_path_buf()),
            max_connections: max_connections.max(1),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: DatabaseLocation::Memory,
            max_connections: 1,
        }
    }

    /// 每个新连接都会应用这些 PRAGMA
    fn connect_options(&self) -> SqliteConnectOptions {
        let options = match &self.location {
            DatabaseLocation::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            DatabaseLocation::Memory => SqliteConnectOptions::new().in_memory(true),
        };
        options
            .busy_timeout(BUSY_TIMEOUT)
            .synchronous(SqliteSynchronous::Normal)
    }
}

/// 数据库连接池
pub type DbPool = Pool<Sqlite>;

/// 创建数据库连接池
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
    if config.location == DatabaseLocation::Memory {
        // 内存库随连接存亡，不允许回收
        pool_options = pool_options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(config.connect_options())
        .await?;

    tracing::info!(
        location = ?config.location,
        max_connections = config.max_connections,
        busy_timeout_ms = BUSY_TIMEOUT.as_millis() as u64,
        "SQLite pool created"
    );

    Ok(pool)
}

/// 建表；可重复执行
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    // name 唯一约束兜底并发创建同名会话
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'disconnected',
            wa_jid TEXT,
            is_active INTEGER NOT NULL DEFAULT 0,
            proxy_url TEXT,
            qr_code TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status)",
        "CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at)",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}
