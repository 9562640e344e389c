//! SQLite Session Repository

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::FromRow;

use super::DbPool;
use crate::application::ports::{RepositoryError, SessionRepositoryPort};
use crate::domain::session::{
    Session, SessionId, SessionName, SessionStatus, WhatsAppJid,
};

const SELECT_COLUMNS: &str =
    "SELECT id, name, status, wa_jid, proxy_url, qr_code, created_at, updated_at FROM sessions";

/// SQLite Session Repository
pub struct SqliteSessionRepository {
    pool: DbPool,
}

impl SqliteSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: String,
    name: String,
    status: String,
    wa_jid: Option<String>,
    proxy_url: Option<String>,
    qr_code: Option<String>,
    created_at: String,
    updated_at: String,
}

fn serialization(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::SerializationError(e.to_string())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(serialization)?
        .with_timezone(&Utc))
}

/// 定长纳秒格式，保证字符串排序与时间排序一致
fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

impl TryFrom<SessionRow> for Session {
    type Error = RepositoryError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let status = SessionStatus::from_str(&row.status)
            .ok_or_else(|| serialization(format!("unknown status '{}'", row.status)))?;
        let wa_jid = row
            .wa_jid
            .as_deref()
            .map(WhatsAppJid::parse)
            .transpose()
            .map_err(serialization)?;

        Session::restore(
            SessionId::parse(&row.id).map_err(serialization)?,
            SessionName::new(row.name).map_err(serialization)?,
            status,
            wa_jid,
            row.proxy_url,
            row.qr_code,
            parse_time(&row.created_at)?,
            parse_time(&row.updated_at)?,
        )
        .map_err(serialization)
    }
}

fn rows_to_sessions(rows: Vec<SessionRow>) -> Result<Vec<Session>, RepositoryError> {
    rows.into_iter().map(Session::try_from).collect()
}

/// 唯一约束冲突映射为 Duplicate
fn map_write_error(e: sqlx::Error, name: &SessionName) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Duplicate(format!("session name '{}' is taken", name))
        }
        _ => RepositoryError::DatabaseError(e.to_string()),
    }
}

fn db_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::DatabaseError(e.to_string())
}

/// limit 为 0 时 SQLite 用 -1 表示不限制
fn sql_limit(limit: u32) -> i64 {
    if limit == 0 {
        -1
    } else {
        i64::from(limit)
    }
}

#[async_trait]
impl SessionRepositoryPort for SqliteSessionRepository {
    async fn create(&self, session: &Session) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, name, status, wa_jid, is_active, proxy_url, qr_code, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id().to_string())
        .bind(session.name().as_str())
        .bind(session.status().as_str())
        .bind(session.wa_jid().map(|j| j.as_str().to_string()))
        .bind(session.is_active())
        .bind(session.proxy_url())
        .bind(session.qr_code())
        .bind(format_time(session.created_at()))
        .bind(format_time(session.updated_at()))
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, session.name()))?;

        Ok(())
    }

    async fn get_by_id(&self, id: &SessionId) -> Result<Session, RepositoryError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(Session::try_from)
            .transpose()?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn get_by_name(&self, name: &SessionName) -> Result<Session, RepositoryError> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("{} WHERE name = ?", SELECT_COLUMNS))
                .bind(name.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(Session::try_from)
            .transpose()?
            .ok_or_else(|| RepositoryError::NotFound(name.to_string()))
    }

    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<Session>, RepositoryError> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "{} ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?",
            SELECT_COLUMNS
        ))
        .bind(sql_limit(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows_to_sessions(rows)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count as u64)
    }

    async fn update(&self, session: &Session) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET
                name = ?,
                status = ?,
                wa_jid = ?,
                is_active = ?,
                proxy_url = ?,
                qr_code = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(session.name().as_str())
        .bind(session.status().as_str())
        .bind(session.wa_jid().map(|j| j.as_str().to_string()))
        .bind(session.is_active())
        .bind(session.proxy_url())
        .bind(session.qr_code())
        .bind(format_time(session.updated_at()))
        .bind(session.id().to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, session.name()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(session.id().to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
    ) -> Result<(), RepositoryError> {
        // 只改状态无法提供 JID，离开 Connected 时清空 JID 以维持不变量
        let mut session = self.get_by_id(id).await?;
        match status {
            SessionStatus::Disconnected => session.disconnect(),
            SessionStatus::Connecting => session.start_connecting().map_err(serialization)?,
            SessionStatus::Connected => {
                if session.status() != SessionStatus::Connected {
                    return Err(RepositoryError::SerializationError(
                        "cannot mark a session connected without a JID".to_string(),
                    ));
                }
                return Ok(());
            }
        }
        self.update(&session).await
    }

    async fn get_active_count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count as u64)
    }

    async fn get_by_status(
        &self,
        status: SessionStatus,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Session>, RepositoryError> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "{} WHERE status = ? ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?",
            SELECT_COLUMNS
        ))
        .bind(status.as_str())
        .bind(sql_limit(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows_to_sessions(rows)
    }

    async fn count_by_status(&self, status: SessionStatus) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count as u64)
    }

    async fn exists(&self, id: &SessionId) -> Result<bool, RepositoryError> {
        let found: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?)")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(found != 0)
    }

    async fn exists_by_name(&self, name: &SessionName) -> Result<bool, RepositoryError> {
        let found: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sessions WHERE name = ?)")
                .bind(name.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;
        Ok(found != 0)
    }
}
