//! Fake WhatsApp Client - 进程内模拟客户端
//!
//! 不访问网络：未配对时返回二维码，配对后直接在线。
//! 用于测试和 `fake` 后端（本地开发）。

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::application::ports::{
    ClientError, ClientEvent, ConnectOutcome, OutgoingMedia, SendReceipt, WhatsAppClientFactory,
    WhatsAppClientPort,
};
use crate::domain::session::{ProxyConfig, SessionId, WhatsAppJid};

const EVENT_CAPACITY: usize = 32;

/// 可在运行中调整的模拟行为
#[derive(Debug, Default)]
pub struct FakeBehavior {
    fail_connect: AtomicBool,
    fail_send: AtomicBool,
    fail_disconnect: AtomicBool,
    connect_delay_ms: AtomicU64,
}

/// 模拟客户端工厂
///
/// 设备凭证保存在工厂中，客户端重建（重连、重启）后仍然有效
#[derive(Default)]
pub struct FakeClientFactory {
    credentials: Arc<DashMap<SessionId, WhatsAppJid>>,
    clients: DashMap<SessionId, Arc<FakeWhatsAppClient>>,
    behavior: Arc<FakeBehavior>,
    created: AtomicUsize,
}

impl FakeClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置已配对的设备凭证
    pub fn with_credentials(self, session_id: SessionId, jid: WhatsAppJid) -> Self {
        self.credentials.insert(session_id, jid);
        self
    }

    pub fn has_credentials(&self, session_id: &SessionId) -> bool {
        self.credentials.contains_key(session_id)
    }

    /// 最近一次为该会话创建的客户端
    pub fn client(&self, session_id: &SessionId) -> Option<Arc<FakeWhatsAppClient>> {
        self.clients.get(session_id).map(|c| c.value().clone())
    }

    /// 累计创建的客户端数
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.behavior.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.behavior.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.behavior.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.behavior
            .connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl WhatsAppClientFactory for FakeClientFactory {
    fn create(
        &self,
        session_id: &SessionId,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Arc<dyn WhatsAppClientPort>, ClientError> {
        let client = Arc::new(FakeWhatsAppClient::new(
            *session_id,
            proxy.cloned(),
            self.credentials.clone(),
            self.behavior.clone(),
        ));
        self.clients.insert(*session_id, client.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(session_id = %session_id, "FakeWhatsAppClient created");
        Ok(client)
    }
}

#[derive(Debug, Default)]
struct FakeState {
    connected: bool,
    qr_seq: u32,
    sent: Vec<OutgoingMedia>,
}

/// 模拟客户端
pub struct FakeWhatsAppClient {
    session_id: SessionId,
    proxy: Option<ProxyConfig>,
    credentials: Arc<DashMap<SessionId, WhatsAppJid>>,
    behavior: Arc<FakeBehavior>,
    state: Mutex<FakeState>,
    events: broadcast::Sender<ClientEvent>,
}

impl FakeWhatsAppClient {
    fn new(
        session_id: SessionId,
        proxy: Option<ProxyConfig>,
        credentials: Arc<DashMap<SessionId, WhatsAppJid>>,
        behavior: Arc<FakeBehavior>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            session_id,
            proxy,
            credentials,
            behavior,
            state: Mutex::new(FakeState::default()),
            events,
        }
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    /// 模拟手机端扫码完成
    pub fn complete_pairing(&self, jid: WhatsAppJid) {
        self.credentials.insert(self.session_id, jid.clone());
        self.set_connected(true);
        self.emit(ClientEvent::PairSuccess { jid: jid.clone() });
        self.emit(ClientEvent::Connected { jid });
    }

    /// 模拟网络中断（凭证保留）
    pub fn drop_connection(&self) {
        self.set_connected(false);
        self.emit(ClientEvent::Disconnected);
    }

    /// 模拟在手机端移除设备
    pub fn remote_logout(&self) {
        self.credentials.remove(&self.session_id);
        self.set_connected(false);
        self.emit(ClientEvent::LoggedOut);
    }

    /// 已发送的消息
    pub fn sent_messages(&self) -> Vec<OutgoingMedia> {
        self.state
            .lock()
            .map(|s| s.sent.clone())
            .unwrap_or_default()
    }

    fn set_connected(&self, connected: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.connected = connected;
        }
    }

    fn next_qr(&self) -> String {
        let seq = match self.state.lock() {
            Ok(mut state) => {
                state.qr_seq += 1;
                state.qr_seq
            }
            Err(_) => 0,
        };
        format!("2@fake-{}-{}", self.session_id, seq)
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl WhatsAppClientPort for FakeWhatsAppClient {
    async fn connect(&self) -> Result<ConnectOutcome, ClientError> {
        let delay = self.behavior.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.behavior.fail_connect.load(Ordering::SeqCst) {
            return Err(ClientError::NetworkError(
                "simulated connection failure".to_string(),
            ));
        }

        let stored = self.credentials.get(&self.session_id).map(|j| j.value().clone());
        match stored {
            Some(jid) => {
                self.set_connected(true);
                self.emit(ClientEvent::Connected { jid: jid.clone() });
                Ok(ConnectOutcome {
                    needs_auth: false,
                    qr_code: None,
                    jid: Some(jid),
                })
            }
            None => {
                let qr = self.next_qr();
                self.set_connected(true);
                self.emit(ClientEvent::QrCode(qr.clone()));
                Ok(ConnectOutcome {
                    needs_auth: true,
                    qr_code: Some(qr),
                    jid: None,
                })
            }
        }
    }

    async fn pair_phone(&self, phone: &str) -> Result<String, ClientError> {
        if !self.is_connected().await {
            return Err(ClientError::NotConnected);
        }
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        let tail = &digits[digits.len().saturating_sub(4)..];
        Ok(format!("FAKE-{:0>4}", tail))
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        if self.behavior.fail_disconnect.load(Ordering::SeqCst) {
            return Err(ClientError::Timeout);
        }
        self.set_connected(false);
        Ok(())
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.credentials.remove(&self.session_id);
        self.set_connected(false);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().map(|s| s.connected).unwrap_or(false)
    }

    async fn is_authenticated(&self) -> bool {
        self.credentials.contains_key(&self.session_id)
    }

    async fn jid(&self) -> Option<WhatsAppJid> {
        self.credentials.get(&self.session_id).map(|j| j.value().clone())
    }

    async fn send_media(&self, media: OutgoingMedia) -> Result<SendReceipt, ClientError> {
        if !self.is_connected().await {
            return Err(ClientError::NotConnected);
        }
        if self.behavior.fail_send.load(Ordering::SeqCst) {
            return Err(ClientError::SendFailed("simulated send failure".to_string()));
        }
        if let Ok(mut state) = self.state.lock() {
            state.sent.push(media);
        }
        Ok(SendReceipt {
            message_id: format!("FAKE{}", Uuid::new_v4().simple()).to_uppercase(),
            timestamp: Utc::now().timestamp(),
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}
