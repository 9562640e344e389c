//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod connection_manager;
mod repositories;
mod whatsapp_client;

pub use connection_manager::{ConnectResult, ConnectionError, ConnectionManagerPort, HealthReport};
pub use repositories::{RepositoryError, SessionRepositoryPort};
pub use whatsapp_client::{
    ClientError, ClientEvent, ConnectOutcome, OutgoingMedia, SendReceipt, WhatsAppClientFactory,
    WhatsAppClientPort,
};
