//! Session Query Handlers

use std::sync::Arc;

use crate::application::context::RequestContext;
use crate::application::error::ApplicationError;
use crate::application::ports::{RepositoryError, SessionRepositoryPort};
use crate::application::queries::{
    GetQrCodeQuery, ListSessionsQuery, ListSessionsResponse, QrCodeResponse, ResolveSessionQuery,
    ResolveSessionResponse,
};
use crate::application::validation::Validate;
use crate::domain::session::{IdentifierType, Session, SessionIdentifier, SessionStatus};

/// 解析标识并读取会话
///
/// 合法 UUID 按 ID 查询，其余按名称查询
pub(crate) async fn resolve_session(
    repo: &dyn SessionRepositoryPort,
    raw: &str,
) -> Result<(Session, IdentifierType), ApplicationError> {
    let identifier = SessionIdentifier::parse(raw)?;
    let found = match &identifier {
        SessionIdentifier::Id(id) => repo.get_by_id(id).await,
        SessionIdentifier::Name(name) => repo.get_by_name(name).await,
    };
    match found {
        Ok(session) => Ok((session, identifier.identifier_type())),
        Err(RepositoryError::NotFound(_)) => {
            Err(ApplicationError::not_found("Session", identifier.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolve Session Handler
pub struct ResolveSessionHandler {
    repo: Arc<dyn SessionRepositoryPort>,
}

impl ResolveSessionHandler {
    pub fn new(repo: Arc<dyn SessionRepositoryPort>) -> Self {
        Self { repo }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        query: ResolveSessionQuery,
    ) -> Result<ResolveSessionResponse, ApplicationError> {
        query.validate()?;
        let (session, identifier_type) = ctx
            .run(resolve_session(self.repo.as_ref(), &query.identifier))
            .await?;
        Ok(ResolveSessionResponse {
            session,
            identifier_type,
        })
    }
}

/// List Sessions Handler
pub struct ListSessionsHandler {
    repo: Arc<dyn SessionRepositoryPort>,
}

impl ListSessionsHandler {
    pub fn new(repo: Arc<dyn SessionRepositoryPort>) -> Self {
        Self { repo }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        query: ListSessionsQuery,
    ) -> Result<ListSessionsResponse, ApplicationError> {
        query.validate()?;
        let status = query.parsed_status()?;
        ctx.run(self.execute(status, query.limit, query.offset)).await
    }

    async fn execute(
        &self,
        status: Option<SessionStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<ListSessionsResponse, ApplicationError> {
        let (sessions, total) = match status {
            Some(status) => (
                self.repo.get_by_status(status, limit, offset).await?,
                self.repo.count_by_status(status).await?,
            ),
            None => (
                self.repo.list(limit, offset).await?,
                self.repo.count().await?,
            ),
        };
        Ok(ListSessionsResponse { sessions, total })
    }
}

/// Get QR Code Handler
pub struct GetQrCodeHandler {
    repo: Arc<dyn SessionRepositoryPort>,
}

impl GetQrCodeHandler {
    pub fn new(repo: Arc<dyn SessionRepositoryPort>) -> Self {
        Self { repo }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        query: GetQrCodeQuery,
    ) -> Result<QrCodeResponse, ApplicationError> {
        query.validate()?;
        let (session, _) = ctx
            .run(resolve_session(self.repo.as_ref(), &query.identifier))
            .await?;

        if session.is_active() {
            return Err(ApplicationError::AlreadyConnected(session.id().to_string()));
        }
        let qr_code = session
            .qr_code()
            .map(str::to_string)
            .ok_or_else(|| ApplicationError::not_found("QR code", session.id().to_string()))?;

        Ok(QrCodeResponse { session, qr_code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{SessionName, WhatsAppJid};
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteSessionRepository,
    };

    async fn setup_repo() -> Arc<dyn SessionRepositoryPort> {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Arc::new(SqliteSessionRepository::new(pool))
    }

    async fn seed(repo: &Arc<dyn SessionRepositoryPort>, name: &str) -> Session {
        let session = Session::new(SessionName::new(name).unwrap());
        repo.create(&session).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_resolve_by_id_and_name() {
        let repo = setup_repo().await;
        let session = seed(&repo, "alpha").await;
        let handler = ResolveSessionHandler::new(repo);
        let ctx = RequestContext::background();

        let by_name = handler
            .handle(&ctx, ResolveSessionQuery { identifier: "alpha".into() })
            .await
            .unwrap();
        assert_eq!(by_name.identifier_type, IdentifierType::Name);
        assert_eq!(by_name.session.id(), session.id());

        let by_id = handler
            .handle(
                &ctx,
                ResolveSessionQuery {
                    identifier: session.id().to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(by_id.identifier_type, IdentifierType::Id);
        assert_eq!(by_id.session.name().as_str(), "alpha");
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let repo = setup_repo().await;
        let handler = ResolveSessionHandler::new(repo);
        let ctx = RequestContext::background();

        let err = handler
            .handle(&ctx, ResolveSessionQuery { identifier: "missing".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { .. }));

        let err = handler
            .handle(&ctx, ResolveSessionQuery { identifier: "bad/name!".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn test_list_with_zero_limit_returns_all() {
        let repo = setup_repo().await;
        for i in 0..5 {
            seed(&repo, &format!("session-{}", i)).await;
        }
        let handler = ListSessionsHandler::new(repo);
        let ctx = RequestContext::background();

        let all = handler
            .handle(&ctx, ListSessionsQuery::default())
            .await
            .unwrap();
        assert_eq!(all.sessions.len(), 5);
        assert_eq!(all.total, 5);

        let page = handler
            .handle(
                &ctx,
                ListSessionsQuery {
                    limit: 2,
                    offset: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.sessions.len(), 2);
        assert_eq!(page.total, 5);
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let repo = setup_repo().await;
        seed(&repo, "idle-one").await;
        let mut online = seed(&repo, "online-one").await;
        online
            .connect(WhatsAppJid::parse("5511999999999@s.whatsapp.net").unwrap())
            .unwrap();
        repo.update(&online).await.unwrap();

        let handler = ListSessionsHandler::new(repo);
        let result = handler
            .handle(
                &RequestContext::background(),
                ListSessionsQuery {
                    status: Some("connected".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.sessions[0].name().as_str(), "online-one");
    }

    #[tokio::test]
    async fn test_qr_code_lookup() {
        let repo = setup_repo().await;
        let mut session = seed(&repo, "alpha").await;
        let handler = GetQrCodeHandler::new(repo.clone());
        let ctx = RequestContext::background();

        let err = handler
            .handle(&ctx, GetQrCodeQuery { identifier: "alpha".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { .. }));

        session.start_connecting().unwrap();
        session.set_qr_code(Some("2@qr".into()));
        repo.update(&session).await.unwrap();

        let qr = handler
            .handle(&ctx, GetQrCodeQuery { identifier: "alpha".into() })
            .await
            .unwrap();
        assert_eq!(qr.qr_code, "2@qr");
        assert_eq!(qr.session.status(), SessionStatus::Connecting);
    }
}
