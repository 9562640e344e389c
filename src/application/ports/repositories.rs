//! Repository Ports - 出站端口
//!
//! 定义会话持久化的抽象接口
//! 具体实现在 infrastructure 层（SQLite）

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::session::{Session, SessionId, SessionName, SessionStatus};

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

/// Session Repository Port
///
/// `limit == 0` 表示不限制条数，返回全部
#[async_trait]
pub trait SessionRepositoryPort: Send + Sync {
    /// 新建会话；名称冲突返回 `Duplicate`
    async fn create(&self, session: &Session) -> Result<(), RepositoryError>;

    /// 根据 ID 查找；不存在返回 `NotFound`
    async fn get_by_id(&self, id: &SessionId) -> Result<Session, RepositoryError>;

    /// 根据名称查找；不存在返回 `NotFound`
    async fn get_by_name(&self, name: &SessionName) -> Result<Session, RepositoryError>;

    /// 按创建时间倒序分页
    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<Session>, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;

    /// 整体写回；不存在返回 `NotFound`
    async fn update(&self, session: &Session) -> Result<(), RepositoryError>;

    /// 删除；不存在返回 `NotFound`
    async fn delete(&self, id: &SessionId) -> Result<(), RepositoryError>;

    /// 仅更新状态（Connected 以外的状态会清空 JID）
    async fn update_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
    ) -> Result<(), RepositoryError>;

    /// Connected 会话数
    async fn get_active_count(&self) -> Result<u64, RepositoryError>;

    async fn get_by_status(
        &self,
        status: SessionStatus,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Session>, RepositoryError>;

    async fn count_by_status(&self, status: SessionStatus) -> Result<u64, RepositoryError>;

    async fn exists(&self, id: &SessionId) -> Result<bool, RepositoryError>;

    async fn exists_by_name(&self, name: &SessionName) -> Result<bool, RepositoryError>;
}
