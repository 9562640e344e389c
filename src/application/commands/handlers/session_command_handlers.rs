//! Session Command Handlers

use std::sync::Arc;

use crate::application::commands::session_commands::*;
use crate::application::context::RequestContext;
use crate::application::error::ApplicationError;
use crate::application::ports::{ConnectionError, ConnectionManagerPort, SessionRepositoryPort};
use crate::application::queries::handlers::resolve_session;
use crate::application::validation::Validate;
use crate::domain::session::{ProxyConfig, ProxyType, Session, SessionName, SessionStatus};

/// Create Session Handler
///
/// 只写存储，不触碰连接管理器
pub struct CreateSessionHandler {
    repo: Arc<dyn SessionRepositoryPort>,
}

impl CreateSessionHandler {
    pub fn new(repo: Arc<dyn SessionRepositoryPort>) -> Self {
        Self { repo }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        cmd: CreateSessionCommand,
    ) -> Result<Session, ApplicationError> {
        cmd.validate()?;
        ctx.run(self.execute(cmd)).await
    }

    async fn execute(&self, cmd: CreateSessionCommand) -> Result<Session, ApplicationError> {
        let name = SessionName::new(cmd.name)?;

        if self.repo.exists_by_name(&name).await? {
            return Err(ApplicationError::AlreadyExists(format!(
                "session name '{}' is taken",
                name
            )));
        }

        let session = Session::new(name);
        session.validate()?;

        // 并发创建同名会话时由唯一约束兜底，Duplicate 映射为 AlreadyExists
        self.repo.create(&session).await?;

        tracing::info!(
            session_id = %session.id(),
            name = %session.name(),
            "Session created"
        );
        Ok(session)
    }
}

/// Connect Session Handler
pub struct ConnectSessionHandler {
    repo: Arc<dyn SessionRepositoryPort>,
    connections: Arc<dyn ConnectionManagerPort>,
}

impl ConnectSessionHandler {
    pub fn new(
        repo: Arc<dyn SessionRepositoryPort>,
        connections: Arc<dyn ConnectionManagerPort>,
    ) -> Self {
        Self { repo, connections }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        cmd: ConnectSessionCommand,
    ) -> Result<ConnectSessionResponse, ApplicationError> {
        cmd.validate()?;
        ctx.run(self.execute(cmd)).await
    }

    async fn execute(
        &self,
        cmd: ConnectSessionCommand,
    ) -> Result<ConnectSessionResponse, ApplicationError> {
        let (session, _) = resolve_session(self.repo.as_ref(), &cmd.identifier).await?;
        let id = *session.id();

        let result = self.connections.connect(&id).await?;

        // 事件监听可能已先一步写回，重新读取最新行
        let mut session = self.repo.get_by_id(&id).await?;

        let message = if result.needs_auth {
            // 监听已写回 Connected 时二维码作废
            if session.status() != SessionStatus::Connected {
                session.start_connecting()?;
                session.set_qr_code(result.qr_code.clone());
            }
            "Scan the QR code with WhatsApp to authenticate".to_string()
        } else {
            let jid = result.jid.clone().ok_or_else(|| {
                ApplicationError::ExternalServiceError(
                    "client reported an authenticated connection without a JID".to_string(),
                )
            })?;
            if session.status() != SessionStatus::Connected {
                session.connect(jid)?;
            }
            "Session connected".to_string()
        };

        self.repo.update(&session).await?;

        tracing::info!(
            session_id = %id,
            needs_auth = result.needs_auth,
            status = %session.status(),
            "Session connect finished"
        );

        Ok(ConnectSessionResponse {
            session,
            qr_code: result.qr_code,
            needs_auth: result.needs_auth,
            message,
        })
    }
}

/// Pair Phone Handler
pub struct PairPhoneHandler {
    repo: Arc<dyn SessionRepositoryPort>,
    connections: Arc<dyn ConnectionManagerPort>,
}

impl PairPhoneHandler {
    pub fn new(
        repo: Arc<dyn SessionRepositoryPort>,
        connections: Arc<dyn ConnectionManagerPort>,
    ) -> Self {
        Self { repo, connections }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        cmd: PairPhoneCommand,
    ) -> Result<PairPhoneResponse, ApplicationError> {
        cmd.validate()?;
        ctx.run(self.execute(cmd)).await
    }

    async fn execute(&self, cmd: PairPhoneCommand) -> Result<PairPhoneResponse, ApplicationError> {
        let (session, _) = resolve_session(self.repo.as_ref(), &cmd.identifier).await?;
        let id = *session.id();
        if session.is_active() {
            return Err(ApplicationError::AlreadyConnected(id.to_string()));
        }

        let phone: String = cmd.phone.chars().filter(|c| c.is_ascii_digit()).collect();
        let pairing_code = self.connections.pair_phone(&id, &phone).await?;

        let mut session = self.repo.get_by_id(&id).await?;
        if session.status() != SessionStatus::Connected {
            session.start_connecting()?;
            self.repo.update(&session).await?;
        }

        tracing::info!(session_id = %id, "Pairing code issued");

        Ok(PairPhoneResponse {
            session,
            pairing_code,
            message: "Enter the pairing code in WhatsApp under Linked devices".to_string(),
        })
    }
}

/// Disconnect Session Handler
pub struct DisconnectSessionHandler {
    repo: Arc<dyn SessionRepositoryPort>,
    connections: Arc<dyn ConnectionManagerPort>,
}

impl DisconnectSessionHandler {
    pub fn new(
        repo: Arc<dyn SessionRepositoryPort>,
        connections: Arc<dyn ConnectionManagerPort>,
    ) -> Self {
        Self { repo, connections }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        cmd: DisconnectSessionCommand,
    ) -> Result<DisconnectSessionResponse, ApplicationError> {
        cmd.validate()?;
        ctx.run(self.execute(cmd)).await
    }

    async fn execute(
        &self,
        cmd: DisconnectSessionCommand,
    ) -> Result<DisconnectSessionResponse, ApplicationError> {
        let (mut session, _) = resolve_session(self.repo.as_ref(), &cmd.identifier).await?;

        // 已断开：幂等成功，不写存储
        if session.status() == SessionStatus::Disconnected {
            return Ok(DisconnectSessionResponse {
                session,
                message: "Session is already disconnected".to_string(),
            });
        }

        // 句柄此时已移除，拆除失败也要落盘 Disconnected
        match self.connections.disconnect(session.id()).await {
            Ok(()) | Err(ConnectionError::ClientNotFound(_)) => {}
            Err(e) => {
                tracing::warn!(session_id = %session.id(), error = %e, "Client teardown failed, marking session disconnected");
            }
        }

        session.disconnect();
        self.repo.update(&session).await?;

        tracing::info!(session_id = %session.id(), "Session disconnected");

        Ok(DisconnectSessionResponse {
            session,
            message: "Session disconnected".to_string(),
        })
    }
}

/// Logout Session Handler
///
/// 与断开不同：清除设备凭证，下次连接需要重新配对
pub struct LogoutSessionHandler {
    repo: Arc<dyn SessionRepositoryPort>,
    connections: Arc<dyn ConnectionManagerPort>,
}

impl LogoutSessionHandler {
    pub fn new(
        repo: Arc<dyn SessionRepositoryPort>,
        connections: Arc<dyn ConnectionManagerPort>,
    ) -> Self {
        Self { repo, connections }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        cmd: LogoutSessionCommand,
    ) -> Result<DisconnectSessionResponse, ApplicationError> {
        cmd.validate()?;
        ctx.run(self.execute(cmd)).await
    }

    async fn execute(
        &self,
        cmd: LogoutSessionCommand,
    ) -> Result<DisconnectSessionResponse, ApplicationError> {
        let (session, _) = resolve_session(self.repo.as_ref(), &cmd.identifier).await?;
        let id = *session.id();

        self.connections.logout(&id).await?;

        let mut session = self.repo.get_by_id(&id).await?;
        if session.status() != SessionStatus::Disconnected || session.qr_code().is_some() {
            session.disconnect();
            self.repo.update(&session).await?;
        }

        tracing::info!(session_id = %id, "Session logged out");

        Ok(DisconnectSessionResponse {
            session,
            message: "Session logged out; the next connect requires pairing".to_string(),
        })
    }
}

/// Delete Session Handler
pub struct DeleteSessionHandler {
    repo: Arc<dyn SessionRepositoryPort>,
    connections: Arc<dyn ConnectionManagerPort>,
}

impl DeleteSessionHandler {
    pub fn new(
        repo: Arc<dyn SessionRepositoryPort>,
        connections: Arc<dyn ConnectionManagerPort>,
    ) -> Self {
        Self { repo, connections }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        cmd: DeleteSessionCommand,
    ) -> Result<DeleteSessionResponse, ApplicationError> {
        cmd.validate()?;
        ctx.run(self.execute(cmd)).await
    }

    async fn execute(
        &self,
        cmd: DeleteSessionCommand,
    ) -> Result<DeleteSessionResponse, ApplicationError> {
        let (session, _) = resolve_session(self.repo.as_ref(), &cmd.identifier).await?;
        let id = *session.id();

        // 尽力拆除连接，失败不阻塞删除
        match self.connections.remove_client(&id).await {
            Ok(()) | Err(ConnectionError::ClientNotFound(_)) => {}
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Failed to tear down connection before delete");
            }
        }

        self.repo.delete(&id).await?;

        tracing::info!(session_id = %id, name = %session.name(), "Session deleted");

        Ok(DeleteSessionResponse {
            id,
            message: "Session deleted".to_string(),
        })
    }
}

/// Set Proxy Handler
///
/// 只写存储，下次连接生效
pub struct SetProxyHandler {
    repo: Arc<dyn SessionRepositoryPort>,
}

impl SetProxyHandler {
    pub fn new(repo: Arc<dyn SessionRepositoryPort>) -> Self {
        Self { repo }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        cmd: SetProxyCommand,
    ) -> Result<SetProxyResponse, ApplicationError> {
        cmd.validate()?;
        ctx.run(self.execute(cmd)).await
    }

    async fn execute(&self, cmd: SetProxyCommand) -> Result<SetProxyResponse, ApplicationError> {
        let proxy = if cmd.is_clear() {
            None
        } else {
            Some(build_proxy(&cmd)?)
        };

        let (mut session, _) = resolve_session(self.repo.as_ref(), &cmd.identifier).await?;

        let message = match &proxy {
            Some(proxy) => {
                session.set_proxy_url(Some(proxy.to_url()?));
                tracing::info!(
                    session_id = %session.id(),
                    proxy = %proxy.redacted_url(),
                    "Session proxy set"
                );
                "Proxy updated; it takes effect on the next connect".to_string()
            }
            None => {
                session.set_proxy_url(None);
                tracing::info!(session_id = %session.id(), "Session proxy cleared");
                "Proxy cleared".to_string()
            }
        };

        self.repo.update(&session).await?;

        Ok(SetProxyResponse { session, message })
    }
}

fn build_proxy(cmd: &SetProxyCommand) -> Result<ProxyConfig, ApplicationError> {
    let proxy_type = ProxyType::from_str(cmd.proxy_type.trim()).ok_or_else(|| {
        ApplicationError::validation(format!(
            "proxy_type must be http or socks5 (got '{}')",
            cmd.proxy_type
        ))
    })?;
    let port = u16::try_from(cmd.port)
        .map_err(|_| ApplicationError::validation("port must be between 1 and 65535"))?;

    let non_empty = |v: &Option<String>| v.as_ref().filter(|s| !s.is_empty()).cloned();
    let proxy = ProxyConfig {
        host: cmd.host.trim().to_string(),
        port,
        proxy_type,
        username: non_empty(&cmd.username),
        password: non_empty(&cmd.password),
    };
    proxy.validate()?;
    Ok(proxy)
}

/// Rename Session Handler
pub struct RenameSessionHandler {
    repo: Arc<dyn SessionRepositoryPort>,
}

impl RenameSessionHandler {
    pub fn new(repo: Arc<dyn SessionRepositoryPort>) -> Self {
        Self { repo }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        cmd: RenameSessionCommand,
    ) -> Result<Session, ApplicationError> {
        cmd.validate()?;
        ctx.run(self.execute(cmd)).await
    }

    async fn execute(&self, cmd: RenameSessionCommand) -> Result<Session, ApplicationError> {
        let new_name = SessionName::new(cmd.new_name)?;
        let (mut session, _) = resolve_session(self.repo.as_ref(), &cmd.identifier).await?;

        if session.name() == &new_name {
            return Ok(session);
        }
        if self.repo.exists_by_name(&new_name).await? {
            return Err(ApplicationError::AlreadyExists(format!(
                "session name '{}' is taken",
                new_name
            )));
        }

        let old_name = session.name().clone();
        session.rename(new_name);
        self.repo.update(&session).await?;

        tracing::info!(
            session_id = %session.id(),
            from = %old_name,
            to = %session.name(),
            "Session renamed"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{ConnectResult, HealthReport, WhatsAppClientPort};
    use crate::domain::session::{SessionId, WhatsAppJid};
    use crate::infrastructure::adapters::FakeClientFactory;
    use crate::infrastructure::events::EventPublisher;
    use crate::infrastructure::memory::InMemoryConnectionManager;
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteSessionRepository,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixture {
        repo: Arc<dyn SessionRepositoryPort>,
        factory: Arc<FakeClientFactory>,
        manager: Arc<InMemoryConnectionManager>,
        connections: Arc<dyn ConnectionManagerPort>,
    }

    async fn fixture() -> Fixture {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo: Arc<dyn SessionRepositoryPort> = Arc::new(SqliteSessionRepository::new(pool));
        let factory = Arc::new(FakeClientFactory::new());
        let manager = InMemoryConnectionManager::new(
            repo.clone(),
            factory.clone(),
            EventPublisher::new().arc(),
        )
        .arc();
        let connections: Arc<dyn ConnectionManagerPort> = manager.clone();
        Fixture {
            repo,
            factory,
            manager,
            connections,
        }
    }

    fn jid() -> WhatsAppJid {
        WhatsAppJid::parse("5511999999999@s.whatsapp.net").unwrap()
    }

    async fn create(f: &Fixture, name: &str) -> Session {
        CreateSessionHandler::new(f.repo.clone())
            .handle(
                &RequestContext::background(),
                CreateSessionCommand { name: name.into() },
            )
            .await
            .unwrap()
    }

    async fn connect(
        f: &Fixture,
        identifier: &str,
    ) -> Result<ConnectSessionResponse, ApplicationError> {
        ConnectSessionHandler::new(f.repo.clone(), f.connections.clone())
            .handle(
                &RequestContext::background(),
                ConnectSessionCommand {
                    identifier: identifier.into(),
                },
            )
            .await
    }

    async fn wait_for_status(f: &Fixture, id: &SessionId, status: SessionStatus) {
        for _ in 0..100 {
            if f.repo.get_by_id(id).await.unwrap().status() == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never reached {}", status);
    }

    /// 连接并模拟扫码，直到存储中为 Connected
    async fn pair(f: &Fixture, session: &Session) {
        connect(f, session.name().as_str()).await.unwrap();
        f.factory.client(session.id()).unwrap().complete_pairing(jid());
        wait_for_status(f, session.id(), SessionStatus::Connected).await;
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_name() {
        let f = fixture().await;
        let session = create(&f, "alpha").await;
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert!(session.wa_jid().is_none());

        let err = CreateSessionHandler::new(f.repo.clone())
            .handle(
                &RequestContext::background(),
                CreateSessionCommand {
                    name: "alpha".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_concurrent_create_single_winner() {
        let f = fixture().await;
        let handler = CreateSessionHandler::new(f.repo.clone());
        let ctx = RequestContext::background();
        let cmd = CreateSessionCommand {
            name: "racer".into(),
        };

        let (a, b) = tokio::join!(handler.handle(&ctx, cmd.clone()), handler.handle(&ctx, cmd));
        let oks = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(oks, 1);
        let err = a.err().or(b.err()).unwrap();
        assert!(matches!(err, ApplicationError::AlreadyExists(_)));
        assert_eq!(f.repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_connect_unpaired_returns_qr() {
        let f = fixture().await;
        create(&f, "alpha").await;

        let response = connect(&f, "alpha").await.unwrap();
        assert!(response.needs_auth);
        assert!(!response.qr_code.as_deref().unwrap_or_default().is_empty());
        assert_eq!(response.session.status(), SessionStatus::Connecting);

        let stored = f.repo.get_by_id(response.session.id()).await.unwrap();
        assert_eq!(stored.status(), SessionStatus::Connecting);
        assert_eq!(stored.qr_code(), response.qr_code.as_deref());
    }

    #[tokio::test]
    async fn test_connect_when_connected_conflicts() {
        let f = fixture().await;
        let session = create(&f, "alpha").await;
        pair(&f, &session).await;

        let stored = f.repo.get_by_id(session.id()).await.unwrap();
        assert_eq!(stored.wa_jid(), Some(&jid()));
        assert!(stored.qr_code().is_none());

        let err = connect(&f, &session.id().to_string()).await.unwrap_err();
        assert!(matches!(err, ApplicationError::AlreadyConnected(_)));
    }

    #[tokio::test]
    async fn test_connect_unknown_session() {
        let f = fixture().await;
        let err = connect(&f, "ghost").await.unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let f = fixture().await;
        let session = create(&f, "alpha").await;
        pair(&f, &session).await;

        let handler = DisconnectSessionHandler::new(f.repo.clone(), f.connections.clone());
        let ctx = RequestContext::background();
        let cmd = DisconnectSessionCommand {
            identifier: "alpha".into(),
        };

        let first = handler.handle(&ctx, cmd.clone()).await.unwrap();
        assert_eq!(first.session.status(), SessionStatus::Disconnected);
        assert!(first.session.wa_jid().is_none());

        let second = handler.handle(&ctx, cmd).await.unwrap();
        assert_eq!(second.session.status(), SessionStatus::Disconnected);
        assert_eq!(second.message, "Session is already disconnected");

        // 断开不清除设备凭证
        assert!(f.factory.has_credentials(session.id()));
    }

    #[tokio::test]
    async fn test_disconnect_persists_when_teardown_fails() {
        let f = fixture().await;
        let session = create(&f, "alpha").await;
        pair(&f, &session).await;
        f.factory.set_fail_disconnect(true);

        let response = DisconnectSessionHandler::new(f.repo.clone(), f.connections.clone())
            .handle(
                &RequestContext::background(),
                DisconnectSessionCommand {
                    identifier: "alpha".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.session.status(), SessionStatus::Disconnected);
        assert!(!f.manager.has_client(session.id()));

        let stored = f.repo.get_by_id(session.id()).await.unwrap();
        assert_eq!(stored.status(), SessionStatus::Disconnected);
        assert!(stored.wa_jid().is_none());
    }

    /// connect 返回二维码之前，扫码已完成并写回 Connected
    struct PairedBeforeReturn {
        inner: Arc<InMemoryConnectionManager>,
        factory: Arc<FakeClientFactory>,
        repo: Arc<dyn SessionRepositoryPort>,
    }

    #[async_trait]
    impl ConnectionManagerPort for PairedBeforeReturn {
        fn get_client(
            &self,
            id: &SessionId,
        ) -> Result<Arc<dyn WhatsAppClientPort>, ConnectionError> {
            self.inner.get_client(id)
        }

        fn create_client(
            &self,
            id: &SessionId,
            proxy: Option<&ProxyConfig>,
        ) -> Result<Arc<dyn WhatsAppClientPort>, ConnectionError> {
            self.inner.create_client(id, proxy)
        }

        fn has_client(&self, id: &SessionId) -> bool {
            self.inner.has_client(id)
        }

        fn client_ids(&self) -> Vec<SessionId> {
            self.inner.client_ids()
        }

        async fn connect(&self, id: &SessionId) -> Result<ConnectResult, ConnectionError> {
            let result = self.inner.connect(id).await?;
            if let Some(client) = self.factory.client(id) {
                client.complete_pairing(jid());
            }
            for _ in 0..100 {
                if self.repo.get_by_id(id).await?.status() == SessionStatus::Connected {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok(result)
        }

        async fn reconnect(&self, id: &SessionId) -> Result<ConnectResult, ConnectionError> {
            self.inner.reconnect(id).await
        }

        async fn pair_phone(&self, id: &SessionId, phone: &str) -> Result<String, ConnectionError> {
            self.inner.pair_phone(id, phone).await
        }

        async fn disconnect(&self, id: &SessionId) -> Result<(), ConnectionError> {
            self.inner.disconnect(id).await
        }

        async fn remove_client(&self, id: &SessionId) -> Result<(), ConnectionError> {
            self.inner.remove_client(id).await
        }

        async fn logout(&self, id: &SessionId) -> Result<(), ConnectionError> {
            self.inner.logout(id).await
        }

        async fn health_check(&self) -> Result<HealthReport, ConnectionError> {
            self.inner.health_check().await
        }

        async fn reconcile_on_startup(&self) -> Result<usize, ConnectionError> {
            self.inner.reconcile_on_startup().await
        }
    }

    #[tokio::test]
    async fn test_connect_drops_qr_when_paired_meanwhile() {
        let f = fixture().await;
        let session = create(&f, "alpha").await;
        let connections: Arc<dyn ConnectionManagerPort> = Arc::new(PairedBeforeReturn {
            inner: f.manager.clone(),
            factory: f.factory.clone(),
            repo: f.repo.clone(),
        });

        let response = ConnectSessionHandler::new(f.repo.clone(), connections)
            .handle(
                &RequestContext::background(),
                ConnectSessionCommand {
                    identifier: "alpha".into(),
                },
            )
            .await
            .unwrap();
        assert!(response.needs_auth);
        assert_eq!(response.session.status(), SessionStatus::Connected);
        assert!(response.session.qr_code().is_none());

        let stored = f.repo.get_by_id(session.id()).await.unwrap();
        assert_eq!(stored.status(), SessionStatus::Connected);
        assert!(stored.qr_code().is_none());
        assert_eq!(stored.wa_jid(), Some(&jid()));
    }

    #[tokio::test]
    async fn test_logout_clears_credentials() {
        let f = fixture().await;
        let session = create(&f, "alpha").await;
        pair(&f, &session).await;

        let response = LogoutSessionHandler::new(f.repo.clone(), f.connections.clone())
            .handle(
                &RequestContext::background(),
                LogoutSessionCommand {
                    identifier: "alpha".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.session.status(), SessionStatus::Disconnected);
        assert!(!f.factory.has_credentials(session.id()));

        // 下次连接需要重新扫码
        let again = connect(&f, "alpha").await.unwrap();
        assert!(again.needs_auth);
    }

    #[tokio::test]
    async fn test_pair_phone_issues_code() {
        let f = fixture().await;
        let session = create(&f, "alpha").await;

        let response = PairPhoneHandler::new(f.repo.clone(), f.connections.clone())
            .handle(
                &RequestContext::background(),
                PairPhoneCommand {
                    identifier: "alpha".into(),
                    phone: "+55 11 99999-1234".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.pairing_code, "FAKE-1234");
        assert_eq!(response.session.status(), SessionStatus::Connecting);
        assert_eq!(response.session.id(), session.id());
    }

    #[tokio::test]
    async fn test_pair_phone_rejected_when_connected() {
        let f = fixture().await;
        let session = create(&f, "alpha").await;
        pair(&f, &session).await;

        let err = PairPhoneHandler::new(f.repo.clone(), f.connections.clone())
            .handle(
                &RequestContext::background(),
                PairPhoneCommand {
                    identifier: "alpha".into(),
                    phone: "5511999991234".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::AlreadyConnected(_)));
    }

    #[tokio::test]
    async fn test_delete_tears_down_connection() {
        let f = fixture().await;
        let session = create(&f, "alpha").await;
        connect(&f, "alpha").await.unwrap();
        assert_eq!(f.manager.len(), 1);

        let response = DeleteSessionHandler::new(f.repo.clone(), f.connections.clone())
            .handle(
                &RequestContext::background(),
                DeleteSessionCommand {
                    identifier: "alpha".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(&response.id, session.id());
        assert!(f.manager.is_empty());
        assert!(!f.repo.exists(session.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_proxy_round_trip() {
        let f = fixture().await;
        create(&f, "alpha").await;
        let handler = SetProxyHandler::new(f.repo.clone());
        let ctx = RequestContext::background();

        let response = handler
            .handle(
                &ctx,
                SetProxyCommand {
                    identifier: "alpha".into(),
                    host: "proxy.local".into(),
                    port: 1080,
                    proxy_type: "socks5".into(),
                    username: Some("user".into()),
                    password: Some("pass".into()),
                },
            )
            .await
            .unwrap();
        let url = response.session.proxy_url().unwrap();
        let proxy = ProxyConfig::from_url(url).unwrap();
        assert_eq!(proxy.host, "proxy.local");
        assert_eq!(proxy.port, 1080);
        assert_eq!(proxy.proxy_type, ProxyType::Socks5);
        assert_eq!(proxy.username.as_deref(), Some("user"));
        assert_eq!(proxy.password.as_deref(), Some("pass"));

        let cleared = handler
            .handle(
                &ctx,
                SetProxyCommand {
                    identifier: "alpha".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(cleared.session.proxy_url().is_none());
    }

    #[tokio::test]
    async fn test_set_proxy_username_requires_password() {
        let f = fixture().await;
        create(&f, "alpha").await;

        let err = SetProxyHandler::new(f.repo.clone())
            .handle(
                &RequestContext::background(),
                SetProxyCommand {
                    identifier: "alpha".into(),
                    host: "proxy.local".into(),
                    port: 8080,
                    proxy_type: "http".into(),
                    username: Some("user".into()),
                    password: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::ValidationError(_)));
        assert!(err.to_string().contains("password"));

        let err = SetProxyHandler::new(f.repo.clone())
            .handle(
                &RequestContext::background(),
                SetProxyCommand {
                    identifier: "alpha".into(),
                    host: "proxy.local".into(),
                    port: 8080,
                    proxy_type: "ftp".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_rename_checks_conflicts() {
        let f = fixture().await;
        let alpha = create(&f, "alpha").await;
        create(&f, "beta").await;
        let handler = RenameSessionHandler::new(f.repo.clone());
        let ctx = RequestContext::background();

        let err = handler
            .handle(
                &ctx,
                RenameSessionCommand {
                    identifier: "alpha".into(),
                    new_name: "beta".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::AlreadyExists(_)));

        let renamed = handler
            .handle(
                &ctx,
                RenameSessionCommand {
                    identifier: alpha.id().to_string(),
                    new_name: "gamma".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name().as_str(), "gamma");
        assert_eq!(renamed.id(), alpha.id());
        assert!(!f
            .repo
            .exists_by_name(&SessionName::new("alpha").unwrap())
            .await
            .unwrap());
    }
}
