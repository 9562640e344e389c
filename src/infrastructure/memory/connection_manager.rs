//! In-Memory Connection Manager Implementation
//!
//! 每个会话至多一个活动客户端句柄。注册表只在增删时加锁，
//! 网络与存储 I/O 都在锁外进行。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::application::ports::{
    ClientEvent, ConnectResult, ConnectionError, ConnectionManagerPort, HealthReport,
    RepositoryError, SessionRepositoryPort, WhatsAppClientFactory, WhatsAppClientPort,
};
use crate::domain::session::{ProxyConfig, Session, SessionId, SessionStatus};
use crate::infrastructure::events::EventPublisher;

type Registry = DashMap<SessionId, Arc<LiveConnection>>;
type SessionLocks = DashMap<SessionId, Arc<tokio::sync::Mutex<()>>>;

/// 活动连接句柄
pub struct LiveConnection {
    client: Arc<dyn WhatsAppClientPort>,
    proxy: Option<ProxyConfig>,
    generation: u64,
    registered_at: DateTime<Utc>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl LiveConnection {
    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(handle) = listener.take() {
                handle.abort();
            }
        }
    }
}

/// 事件监听任务需要的共享依赖
#[derive(Clone)]
struct ListenerContext {
    repo: Arc<dyn SessionRepositoryPort>,
    publisher: Arc<EventPublisher>,
    clients: Arc<Registry>,
    connect_locks: Arc<SessionLocks>,
}

/// 内存连接管理器
pub struct InMemoryConnectionManager {
    clients: Arc<Registry>,
    /// 同一会话的 connect 串行执行，不同会话互不阻塞
    connect_locks: Arc<SessionLocks>,
    repo: Arc<dyn SessionRepositoryPort>,
    factory: Arc<dyn WhatsAppClientFactory>,
    publisher: Arc<EventPublisher>,
    next_generation: AtomicU64,
}

impl InMemoryConnectionManager {
    pub fn new(
        repo: Arc<dyn SessionRepositoryPort>,
        factory: Arc<dyn WhatsAppClientFactory>,
        publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            connect_locks: Arc::new(DashMap::new()),
            repo,
            factory,
            publisher,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.connect_locks.len()
    }

    fn session_lock(&self, id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        self.connect_locks.entry(*id).or_default().value().clone()
    }

    /// 句柄移除后回收会话锁；仍有人持有或等待时保留
    fn release_lock(&self, id: &SessionId) {
        release_idle_lock(&self.connect_locks, id);
    }

    fn listener_context(&self) -> ListenerContext {
        ListenerContext {
            repo: self.repo.clone(),
            publisher: self.publisher.clone(),
            clients: self.clients.clone(),
            connect_locks: self.connect_locks.clone(),
        }
    }

    async fn load_session(&self, id: &SessionId) -> Result<Session, ConnectionError> {
        self.repo.get_by_id(id).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => ConnectionError::SessionNotFound(*id),
            other => ConnectionError::Repository(other),
        })
    }

    fn session_proxy(session: &Session) -> Result<Option<ProxyConfig>, ConnectionError> {
        session
            .proxy_url()
            .map(ProxyConfig::from_url)
            .transpose()
            .map_err(|e| ConnectionError::InvalidProxy {
                session_id: *session.id(),
                reason: e.to_string(),
            })
    }

    /// 构建客户端并启动事件监听（无 I/O）
    fn new_connection(
        &self,
        id: &SessionId,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Arc<LiveConnection>, ConnectionError> {
        let client = self.factory.create(id, proxy)?;
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let events = client.subscribe();
        let listener = tokio::spawn(listen(self.listener_context(), *id, generation, events));

        Ok(Arc::new(LiveConnection {
            client,
            proxy: proxy.cloned(),
            generation,
            registered_at: Utc::now(),
            listener: Mutex::new(Some(listener)),
        }))
    }

    /// 获取或创建句柄；`replace_stale` 为真时代理变更会替换旧句柄
    ///
    /// 返回 (句柄, 是否新建, 被替换的旧句柄)
    fn get_or_create(
        &self,
        id: &SessionId,
        proxy: Option<&ProxyConfig>,
        replace_stale: bool,
    ) -> Result<(Arc<LiveConnection>, bool, Option<Arc<LiveConnection>>), ConnectionError> {
        match self.clients.entry(*id) {
            Entry::Occupied(mut entry) => {
                if !replace_stale || entry.get().proxy.as_ref() == proxy {
                    return Ok((entry.get().clone(), false, None));
                }
                let conn = self.new_connection(id, proxy)?;
                let stale = entry.insert(conn.clone());
                tracing::info!(session_id = %id, "Proxy changed, replacing live client");
                Ok((conn, true, Some(stale)))
            }
            Entry::Vacant(entry) => {
                let conn = self.new_connection(id, proxy)?;
                entry.insert(conn.clone());
                tracing::debug!(session_id = %id, generation = conn.generation, "Live client registered");
                Ok((conn, true, None))
            }
        }
    }

    /// 仅当注册表中仍是同一代句柄时移除
    fn remove_if_current(&self, id: &SessionId, generation: u64) -> Option<Arc<LiveConnection>> {
        remove_generation(&self.clients, id, generation)
    }

    async fn retire(id: &SessionId, conn: Arc<LiveConnection>) {
        if let Err(e) = conn.client.disconnect().await {
            tracing::warn!(session_id = %id, error = %e, "Failed to disconnect retired client");
        }
    }

    /// 已持有会话锁时执行物理连接
    async fn connect_locked(
        &self,
        id: &SessionId,
        session: &Session,
    ) -> Result<ConnectResult, ConnectionError> {
        let proxy = Self::session_proxy(session)?;
        let (conn, fresh, stale) = self.get_or_create(id, proxy.as_ref(), true)?;
        if let Some(stale) = stale {
            Self::retire(id, stale).await;
        }

        match conn.client.connect().await {
            Ok(outcome) => {
                tracing::info!(
                    session_id = %id,
                    needs_auth = outcome.needs_auth,
                    fresh_client = fresh,
                    "Client connected"
                );
                Ok(ConnectResult {
                    needs_auth: outcome.needs_auth,
                    qr_code: outcome.qr_code,
                    jid: outcome.jid,
                })
            }
            Err(e) => {
                if fresh {
                    self.remove_if_current(id, conn.generation);
                }
                tracing::warn!(session_id = %id, error = %e, "Client connect failed");
                Err(e.into())
            }
        }
    }
}

impl Drop for InMemoryConnectionManager {
    fn drop(&mut self) {
        // 监听任务持有注册表引用，需显式清空以结束它们
        self.clients.clear();
    }
}

fn release_idle_lock(locks: &SessionLocks, id: &SessionId) {
    // 分片锁内判断引用计数，与 session_lock 的 entry 互斥
    locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
}

fn remove_generation(
    clients: &Registry,
    id: &SessionId,
    generation: u64,
) -> Option<Arc<LiveConnection>> {
    clients
        .remove_if(id, |_, conn| conn.generation == generation)
        .map(|(_, conn)| conn)
}

#[async_trait]
impl ConnectionManagerPort for InMemoryConnectionManager {
    fn get_client(&self, id: &SessionId) -> Result<Arc<dyn WhatsAppClientPort>, ConnectionError> {
        self.clients
            .get(id)
            .map(|conn| conn.client.clone())
            .ok_or(ConnectionError::ClientNotFound(*id))
    }

    fn create_client(
        &self,
        id: &SessionId,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Arc<dyn WhatsAppClientPort>, ConnectionError> {
        let (conn, _, _) = self.get_or_create(id, proxy, false)?;
        Ok(conn.client.clone())
    }

    fn has_client(&self, id: &SessionId) -> bool {
        self.clients.contains_key(id)
    }

    fn client_ids(&self) -> Vec<SessionId> {
        self.clients.iter().map(|entry| *entry.key()).collect()
    }

    async fn connect(&self, id: &SessionId) -> Result<ConnectResult, ConnectionError> {
        let lock = self.session_lock(id);
        let _guard = lock.lock().await;

        let session = self.load_session(id).await?;
        if session.status() == SessionStatus::Connected {
            return Err(ConnectionError::AlreadyConnected(*id));
        }

        self.connect_locked(id, &session).await
    }

    async fn reconnect(&self, id: &SessionId) -> Result<ConnectResult, ConnectionError> {
        let lock = self.session_lock(id);
        let _guard = lock.lock().await;

        // 列出之后用户可能已断开
        let session = self.load_session(id).await?;
        if session.status() != SessionStatus::Connected {
            tracing::debug!(session_id = %id, status = %session.status(), "Reconnect skipped");
            return Err(ConnectionError::NotConnected(*id));
        }

        // 等锁期间可能已被用户连接
        let existing = self.clients.get(id).map(|conn| conn.client.clone());
        if let Some(client) = existing {
            if client.is_connected().await {
                let authenticated = client.is_authenticated().await;
                return Ok(ConnectResult {
                    needs_auth: !authenticated,
                    qr_code: None,
                    jid: client.jid().await,
                });
            }
        }

        self.connect_locked(id, &session).await
    }

    async fn pair_phone(&self, id: &SessionId, phone: &str) -> Result<String, ConnectionError> {
        let lock = self.session_lock(id);
        let _guard = lock.lock().await;

        let session = self.load_session(id).await?;
        if session.status() == SessionStatus::Connected {
            return Err(ConnectionError::AlreadyConnected(*id));
        }

        let existing = self.clients.get(id).map(|conn| conn.client.clone());
        let online = match &existing {
            Some(client) => client.is_connected().await,
            None => false,
        };
        let client = match existing {
            Some(client) if online => client,
            _ => {
                let result = self.connect_locked(id, &session).await?;
                if !result.needs_auth {
                    // 凭证仍有效，Connected 事件会回写状态
                    return Err(ConnectionError::AlreadyConnected(*id));
                }
                self.get_client(id)?
            }
        };

        let code = client.pair_phone(phone).await?;
        self.publisher.publish_pairing_code(id, &code);
        tracing::info!(session_id = %id, "Pairing code requested");
        Ok(code)
    }

    async fn disconnect(&self, id: &SessionId) -> Result<(), ConnectionError> {
        let result = {
            let lock = self.session_lock(id);
            let _guard = lock.lock().await;
            match self.clients.remove(id) {
                Some((_, conn)) => conn.client.disconnect().await.map(|_| true),
                None => Ok(false),
            }
        };
        self.release_lock(id);

        if result? {
            tracing::info!(session_id = %id, "Client disconnected");
        } else {
            tracing::debug!(session_id = %id, "Disconnect without live client");
        }
        Ok(())
    }

    async fn remove_client(&self, id: &SessionId) -> Result<(), ConnectionError> {
        let result = {
            let lock = self.session_lock(id);
            let _guard = lock.lock().await;
            match self.clients.remove(id) {
                Some((_, conn)) => conn.client.disconnect().await.map_err(ConnectionError::from),
                None => Err(ConnectionError::ClientNotFound(*id)),
            }
        };
        self.release_lock(id);

        result?;
        tracing::info!(session_id = %id, "Client removed");
        Ok(())
    }

    async fn logout(&self, id: &SessionId) -> Result<(), ConnectionError> {
        let result = {
            let lock = self.session_lock(id);
            let _guard = lock.lock().await;
            let client = match self.clients.remove(id) {
                Some((_, conn)) => Ok(conn.client.clone()),
                // 没有活动句柄时用临时客户端清除凭证
                None => self.factory.create(id, None).map_err(ConnectionError::from),
            };
            match client {
                Ok(client) => client.logout().await.map_err(ConnectionError::from),
                Err(e) => Err(e),
            }
        };
        self.release_lock(id);

        result?;
        self.publisher.publish_logged_out(id);
        tracing::info!(session_id = %id, "Client logged out");
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthReport, ConnectionError> {
        let snapshot: Vec<(SessionId, Arc<dyn WhatsAppClientPort>)> = self
            .clients
            .iter()
            .map(|entry| (*entry.key(), entry.value().client.clone()))
            .collect();

        let mut report = HealthReport {
            registered: snapshot.len(),
            ..Default::default()
        };
        let mut unhealthy = Vec::new();

        for (id, client) in snapshot {
            let connected = client.is_connected().await;
            let authenticated = client.is_authenticated().await;
            if connected {
                report.connected += 1;
            }
            if authenticated {
                report.authenticated += 1;
                if !connected {
                    unhealthy.push(id);
                }
            }
        }

        if unhealthy.is_empty() {
            Ok(report)
        } else {
            tracing::warn!(count = unhealthy.len(), "Authenticated clients are offline");
            Err(ConnectionError::Unhealthy(unhealthy))
        }
    }

    async fn reconcile_on_startup(&self) -> Result<usize, ConnectionError> {
        let stale = self
            .repo
            .get_by_status(SessionStatus::Connecting, 0, 0)
            .await?;

        let mut reset = 0;
        for mut session in stale {
            if self.has_client(session.id()) {
                continue;
            }
            session.disconnect();
            self.repo.update(&session).await?;
            reset += 1;
        }

        if reset > 0 {
            tracing::info!(count = reset, "Reset sessions left connecting by a previous run");
        }
        Ok(reset)
    }
}

/// 事件监听：把协议事件回写到存储并推送
async fn listen(
    ctx: ListenerContext,
    id: SessionId,
    generation: u64,
    mut events: broadcast::Receiver<ClientEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let logged_out = matches!(event, ClientEvent::LoggedOut);
                if let Err(e) = apply_event(&ctx, &id, event).await {
                    if e.is_not_found() {
                        tracing::debug!(session_id = %id, "Event for deleted session ignored");
                    } else {
                        tracing::warn!(session_id = %id, error = %e, "Failed to persist client event");
                    }
                }
                if logged_out {
                    if remove_generation(&ctx.clients, &id, generation).is_some() {
                        release_idle_lock(&ctx.connect_locks, &id);
                    }
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(session_id = %id, skipped = skipped, "Client event listener lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
    tracing::debug!(session_id = %id, generation = generation, "Client event listener stopped");
}

async fn apply_event(
    ctx: &ListenerContext,
    id: &SessionId,
    event: ClientEvent,
) -> Result<(), RepositoryError> {
    match event {
        ClientEvent::QrCode(qr) => {
            ctx.publisher.publish_qr_code(id, &qr);
            let mut session = ctx.repo.get_by_id(id).await?;
            // 收到二维码说明客户端正在等待认证
            if session.status() != SessionStatus::Connected {
                session
                    .start_connecting()
                    .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;
                session.set_qr_code(Some(qr));
                ctx.repo.update(&session).await?;
            }
        }
        ClientEvent::PairSuccess { jid } | ClientEvent::Connected { jid } => {
            ctx.publisher.publish_connected(id, jid.as_str());
            let mut session = ctx.repo.get_by_id(id).await?;
            if session.status() != SessionStatus::Connected {
                session
                    .connect(jid)
                    .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;
                ctx.repo.update(&session).await?;
                tracing::info!(session_id = %id, "Session authenticated");
            }
        }
        ClientEvent::Disconnected => {
            // 保留持久化的 Connected，由自动重连恢复
            ctx.publisher.publish_disconnected(id);
            tracing::info!(session_id = %id, "Client connection dropped");
        }
        ClientEvent::LoggedOut => {
            ctx.publisher.publish_logged_out(id);
            let mut session = ctx.repo.get_by_id(id).await?;
            session.disconnect();
            ctx.repo.update(&session).await?;
            tracing::warn!(session_id = %id, "Device logged out remotely");
        }
    }
    Ok(())
}
