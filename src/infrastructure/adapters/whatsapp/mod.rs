//! WhatsApp Adapter - 协议客户端实现

mod bridge_client;
mod fake_client;

pub use bridge_client::{BridgeClientConfig, BridgeClientFactory, BridgeWhatsAppClient};
pub use fake_client::{FakeBehavior, FakeClientFactory, FakeWhatsAppClient};
