//! Application State
//!
//! 包含所有 Command/Query Handlers 的应用状态

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::{
    // Command handlers
    ConnectSessionHandler, CreateSessionHandler, DeleteSessionHandler, DisconnectSessionHandler,
    LogoutSessionHandler, PairPhoneHandler, RenameSessionHandler, SendMediaHandler,
    SetProxyHandler,
    // Query handlers
    GetQrCodeHandler, ListSessionsHandler, ResolveSessionHandler,
    // Ports
    ConnectionManagerPort, RequestContext, SessionRepositoryPort,
};
use crate::infrastructure::events::EventPublisher;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// 应用状态
pub struct AppState {
    // ========== Ports ==========
    pub connections: Arc<dyn ConnectionManagerPort>,
    pub event_publisher: Arc<EventPublisher>,

    /// 服务关闭时取消所有进行中的请求
    pub shutdown: CancellationToken,
    pub request_timeout: Duration,

    // ========== Command Handlers ==========
    pub create_session_handler: CreateSessionHandler,
    pub connect_session_handler: ConnectSessionHandler,
    pub pair_phone_handler: PairPhoneHandler,
    pub disconnect_session_handler: DisconnectSessionHandler,
    pub logout_session_handler: LogoutSessionHandler,
    pub delete_session_handler: DeleteSessionHandler,
    pub set_proxy_handler: SetProxyHandler,
    pub rename_session_handler: RenameSessionHandler,
    pub send_media_handler: SendMediaHandler,

    // ========== Query Handlers ==========
    pub resolve_session_handler: ResolveSessionHandler,
    pub list_sessions_handler: ListSessionsHandler,
    pub get_qr_code_handler: GetQrCodeHandler,
}

impl AppState {
    /// 创建应用状态
    pub fn new(
        repo: Arc<dyn SessionRepositoryPort>,
        connections: Arc<dyn ConnectionManagerPort>,
        event_publisher: Arc<EventPublisher>,
    ) -> Self {
        Self {
            // Ports
            connections: connections.clone(),
            event_publisher,
            shutdown: CancellationToken::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,

            // Command handlers
            create_session_handler: CreateSessionHandler::new(repo.clone()),
            connect_session_handler: ConnectSessionHandler::new(repo.clone(), connections.clone()),
            pair_phone_handler: PairPhoneHandler::new(repo.clone(), connections.clone()),
            disconnect_session_handler: DisconnectSessionHandler::new(
                repo.clone(),
                connections.clone(),
            ),
            logout_session_handler: LogoutSessionHandler::new(repo.clone(), connections.clone()),
            delete_session_handler: DeleteSessionHandler::new(repo.clone(), connections.clone()),
            set_proxy_handler: SetProxyHandler::new(repo.clone()),
            rename_session_handler: RenameSessionHandler::new(repo.clone()),
            send_media_handler: SendMediaHandler::new(repo.clone(), connections),

            // Query handlers
            resolve_session_handler: ResolveSessionHandler::new(repo.clone()),
            list_sessions_handler: ListSessionsHandler::new(repo.clone()),
            get_qr_code_handler: GetQrCodeHandler::new(repo),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 每个请求一个上下文：截止时间 + 关闭令牌的子令牌
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_timeout(self.request_timeout).with_cancel(self.shutdown.child_token())
    }
}
