//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（Repository、WhatsAppClient、ConnectionManager）
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - context: 请求取消与截止时间
//! - validation: 命令字段校验
//! - error: 应用层错误定义

pub mod commands;
pub mod context;
pub mod error;
pub mod ports;
pub mod queries;
pub mod validation;

// Re-exports
pub use commands::{
    // Session commands
    ConnectSessionCommand,
    ConnectSessionResponse,
    CreateSessionCommand,
    DeleteSessionCommand,
    DeleteSessionResponse,
    DisconnectSessionCommand,
    DisconnectSessionResponse,
    LogoutSessionCommand,
    PairPhoneCommand,
    PairPhoneResponse,
    RenameSessionCommand,
    SetProxyCommand,
    SetProxyResponse,
    // Message commands
    SendMediaCommand,
    SendMessageResponse,
    // Handlers
    handlers::{
        ConnectSessionHandler, CreateSessionHandler, DeleteSessionHandler,
        DisconnectSessionHandler, LogoutSessionHandler, PairPhoneHandler, RenameSessionHandler,
        SendMediaHandler, SetProxyHandler,
    },
};

pub use context::RequestContext;
pub use error::ApplicationError;
pub use validation::Validate;

pub use ports::{
    ClientError, ClientEvent, ConnectOutcome, ConnectResult, ConnectionError,
    ConnectionManagerPort, HealthReport, OutgoingMedia, RepositoryError, SendReceipt,
    SessionRepositoryPort, WhatsAppClientFactory, WhatsAppClientPort,
};

pub use queries::{
    GetQrCodeQuery,
    ListSessionsQuery,
    ListSessionsResponse,
    QrCodeResponse,
    ResolveSessionQuery,
    ResolveSessionResponse,
    // Handlers
    handlers::{GetQrCodeHandler, ListSessionsHandler, ResolveSessionHandler},
};
