//! Auto-Reconnect Worker - 周期性恢复已认证会话
//!
//! 每轮扫描持久化为 Connected 但没有活动句柄的会话（进程重启、
//! 网络中断后句柄被移除），并发受限地重新建立连接。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ConnectionError, ConnectionManagerPort, SessionRepositoryPort};
use crate::domain::session::{SessionId, SessionStatus};
use crate::infrastructure::events::EventPublisher;

/// Worker 配置
#[derive(Debug, Clone)]
pub struct ReconnectWorkerConfig {
    pub enabled: bool,
    /// 扫描间隔
    pub interval: Duration,
    /// 单轮最大并发重连数
    pub max_concurrent: usize,
    /// 单次重连超时
    pub attempt_timeout: Duration,
    /// 启动后首次扫描前的等待
    pub initial_delay: Duration,
}

impl Default for ReconnectWorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            max_concurrent: 4,
            attempt_timeout: Duration::from_secs(20),
            initial_delay: Duration::from_secs(2),
        }
    }
}

/// 单次重连结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Restored,
    NeedsAuth,
    /// 列出之后被用户断开
    Skipped,
    Failed,
}

/// 单轮扫描统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub attempted: usize,
    pub restored: usize,
    pub needs_auth: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// 自动重连 Worker
pub struct AutoReconnectWorker {
    config: ReconnectWorkerConfig,
    repo: Arc<dyn SessionRepositoryPort>,
    connections: Arc<dyn ConnectionManagerPort>,
    event_publisher: Arc<EventPublisher>,
}

impl AutoReconnectWorker {
    pub fn new(
        config: ReconnectWorkerConfig,
        repo: Arc<dyn SessionRepositoryPort>,
        connections: Arc<dyn ConnectionManagerPort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            config,
            repo,
            connections,
            event_publisher,
        }
    }

    /// 启动 Worker，直到 `shutdown` 被取消
    pub async fn run(self, shutdown: CancellationToken) {
        if !self.config.enabled {
            tracing::info!("AutoReconnectWorker disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            max_concurrent = self.config.max_concurrent,
            "AutoReconnectWorker started"
        );

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("AutoReconnectWorker stopped");
                return;
            }
            _ = tokio::time::sleep(self.config.initial_delay) => {}
        }

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let summary = self.sweep().await;
                    if summary.attempted > 0 {
                        tracing::info!(
                            attempted = summary.attempted,
                            restored = summary.restored,
                            needs_auth = summary.needs_auth,
                            skipped = summary.skipped,
                            failed = summary.failed,
                            "Reconnect sweep finished"
                        );
                    }
                }
            }
        }

        tracing::info!("AutoReconnectWorker stopped");
    }

    /// 执行一轮扫描
    pub async fn sweep(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();

        let sessions = match self
            .repo
            .get_by_status(SessionStatus::Connected, 0, 0)
            .await
        {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list connected sessions");
                return summary;
            }
        };

        let pending: Vec<SessionId> = sessions
            .iter()
            .map(|s| *s.id())
            .filter(|id| !self.connections.has_client(id))
            .collect();
        if pending.is_empty() {
            return summary;
        }

        // 使用 semaphore 控制并发
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut attempts = JoinSet::new();

        for id in pending {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!("Failed to acquire semaphore permit");
                    break;
                }
            };
            summary.attempted += 1;

            let repo = self.repo.clone();
            let connections = self.connections.clone();
            let event_publisher = self.event_publisher.clone();
            let timeout = self.config.attempt_timeout;

            attempts.spawn(async move {
                let _permit = permit;
                Self::attempt(id, timeout, repo, connections, event_publisher).await
            });
        }

        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(Outcome::Restored) => summary.restored += 1,
                Ok(Outcome::NeedsAuth) => summary.needs_auth += 1,
                Ok(Outcome::Skipped) => summary.skipped += 1,
                Ok(Outcome::Failed) => summary.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Reconnect attempt aborted");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    async fn attempt(
        id: SessionId,
        timeout: Duration,
        repo: Arc<dyn SessionRepositoryPort>,
        connections: Arc<dyn ConnectionManagerPort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Outcome {
        match tokio::time::timeout(timeout, connections.reconnect(&id)).await {
            Ok(Ok(result)) if !result.needs_auth => {
                tracing::info!(session_id = %id, "Session reconnected");
                Outcome::Restored
            }
            Ok(Ok(_)) => {
                tracing::warn!(session_id = %id, "Device credentials are gone, session needs pairing");
                Self::drop_handle(&id, connections.as_ref()).await;
                match repo.get_by_id(&id).await {
                    Ok(mut session) => {
                        session.disconnect();
                        if let Err(e) = repo.update(&session).await {
                            tracing::error!(session_id = %id, error = %e, "Failed to persist disconnected session");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(session_id = %id, error = %e, "Session vanished during reconnect");
                    }
                }
                event_publisher.publish_reconnect_failed(&id, "device credentials are no longer valid");
                Outcome::NeedsAuth
            }
            Ok(Err(ConnectionError::NotConnected(_) | ConnectionError::SessionNotFound(_))) => {
                // 状态已由用户改写，不触碰句柄和存储
                tracing::debug!(session_id = %id, "Session left connected state, reconnect skipped");
                Outcome::Skipped
            }
            Ok(Err(e)) => {
                tracing::warn!(session_id = %id, error = %e, "Reconnect failed, retrying next sweep");
                Self::drop_handle(&id, connections.as_ref()).await;
                event_publisher.publish_reconnect_failed(&id, &e.to_string());
                Outcome::Failed
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %id,
                    timeout_secs = timeout.as_secs(),
                    "Reconnect timed out, retrying next sweep"
                );
                Self::drop_handle(&id, connections.as_ref()).await;
                event_publisher.publish_reconnect_failed(&id, "reconnect timed out");
                Outcome::Failed
            }
        }
    }

    async fn drop_handle(id: &SessionId, connections: &dyn ConnectionManagerPort) {
        match connections.remove_client(id).await {
            Ok(()) | Err(ConnectionError::ClientNotFound(_)) => {}
            Err(e) => {
                tracing::debug!(session_id = %id, error = %e, "Failed to release client handle");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{Session, SessionName, WhatsAppJid};
    use crate::infrastructure::adapters::FakeClientFactory;
    use crate::infrastructure::events::SessionEvent;
    use crate::infrastructure::memory::InMemoryConnectionManager;
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteSessionRepository,
    };

    fn jid() -> WhatsAppJid {
        WhatsAppJid::parse("5511999999999@s.whatsapp.net").unwrap()
    }

    async fn repo() -> Arc<dyn SessionRepositoryPort> {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Arc::new(SqliteSessionRepository::new(pool))
    }

    async fn seed_connected(repo: &Arc<dyn SessionRepositoryPort>, name: &str) -> SessionId {
        let mut session = Session::new(SessionName::new(name).unwrap());
        session.connect(jid()).unwrap();
        repo.create(&session).await.unwrap();
        *session.id()
    }

    fn worker(
        repo: Arc<dyn SessionRepositoryPort>,
        factory: FakeClientFactory,
        publisher: Arc<EventPublisher>,
    ) -> (AutoReconnectWorker, Arc<InMemoryConnectionManager>) {
        let manager =
            InMemoryConnectionManager::new(repo.clone(), Arc::new(factory), publisher.clone())
                .arc();
        let config = ReconnectWorkerConfig {
            attempt_timeout: Duration::from_secs(2),
            initial_delay: Duration::ZERO,
            ..Default::default()
        };
        (
            AutoReconnectWorker::new(config, repo, manager.clone(), publisher),
            manager,
        )
    }

    #[tokio::test]
    async fn test_sweep_restores_paired_sessions() {
        let repo = repo().await;
        let id = seed_connected(&repo, "alpha").await;
        let factory = FakeClientFactory::new().with_credentials(id, jid());
        let (worker, manager) = worker(repo.clone(), factory, EventPublisher::new().arc());

        let summary = worker.sweep().await;
        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.restored, 1);
        assert!(manager.has_client(&id));

        // 已有句柄的会话不会再次尝试
        let again = worker.sweep().await;
        assert_eq!(again, SweepSummary::default());
    }

    #[tokio::test]
    async fn test_sweep_marks_unpaired_sessions_disconnected() {
        let repo = repo().await;
        let id = seed_connected(&repo, "alpha").await;
        let publisher = EventPublisher::new().arc();
        let mut events = publisher.subscribe_session(&id);
        let (worker, manager) = worker(repo.clone(), FakeClientFactory::new(), publisher);

        let summary = worker.sweep().await;
        assert_eq!(summary.needs_auth, 1);
        assert!(!manager.has_client(&id));

        let session = repo.get_by_id(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert!(session.wa_jid().is_none());

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::ReconnectFailed { .. }) {
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn test_sweep_survives_connect_errors() {
        let repo = repo().await;
        let id = seed_connected(&repo, "alpha").await;
        let factory = FakeClientFactory::new().with_credentials(id, jid());
        factory.set_fail_connect(true);
        let (worker, manager) = worker(repo.clone(), factory, EventPublisher::new().arc());

        let summary = worker.sweep().await;
        assert_eq!(summary.failed, 1);
        assert!(!manager.has_client(&id));

        // 持久化状态保持 Connected，下一轮继续尝试
        let session = repo.get_by_id(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Connected);
        assert_eq!(worker.sweep().await.attempted, 1);
    }

    #[tokio::test]
    async fn test_sweep_bounds_concurrency() {
        let repo = repo().await;
        let mut factory = FakeClientFactory::new();
        for name in ["alpha", "bravo", "charlie", "delta", "echo"] {
            let id = seed_connected(&repo, name).await;
            factory = factory.with_credentials(id, jid());
        }
        factory.set_connect_delay(Duration::from_millis(20));
        let (mut worker, manager) = worker(repo.clone(), factory, EventPublisher::new().arc());
        worker.config.max_concurrent = 2;

        let summary = worker.sweep().await;
        assert_eq!(summary.attempted, 5);
        assert_eq!(summary.restored, 5);
        assert_eq!(manager.len(), 5);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let repo = repo().await;
        let (worker, _) = worker(repo, FakeClientFactory::new(), EventPublisher::new().arc());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_skips_sessions_disconnected_mid_sweep() {
        let repo = repo().await;
        let alpha = seed_connected(&repo, "alpha").await;
        let bravo = seed_connected(&repo, "bravo").await;
        let factory = FakeClientFactory::new()
            .with_credentials(alpha, jid())
            .with_credentials(bravo, jid());
        factory.set_connect_delay(Duration::from_millis(100));
        let publisher = EventPublisher::new().arc();
        let mut alpha_events = publisher.subscribe_session(&alpha);
        let mut bravo_events = publisher.subscribe_session(&bravo);
        let (mut worker, manager) = worker(repo.clone(), factory, publisher);
        worker.config.max_concurrent = 1;

        // 第一个会话占住唯一的并发位时，断开还在排队的另一个
        let (summary, late) = tokio::join!(worker.sweep(), async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let late = if manager.has_client(&alpha) { bravo } else { alpha };
            let mut session = repo.get_by_id(&late).await.unwrap();
            session.disconnect();
            repo.update(&session).await.unwrap();
            late
        });

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.restored, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed + summary.needs_auth, 0);

        assert!(!manager.has_client(&late));
        let stored = repo.get_by_id(&late).await.unwrap();
        assert_eq!(stored.status(), SessionStatus::Disconnected);

        let events = if late == alpha { &mut alpha_events } else { &mut bravo_events };
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, SessionEvent::ReconnectFailed { .. }));
        }
    }
}
