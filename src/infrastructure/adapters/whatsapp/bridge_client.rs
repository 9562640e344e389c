//! Bridge WhatsApp Client - 调用外部协议桥接服务
//!
//! 实现 WhatsAppClientPort trait，协议由桥接服务实现，本进程只做编排
//!
//! 桥接服务 API（每个会话独立路径）:
//! POST {base}/sessions/{id}/connect     {"proxy_url": "..."}
//! POST {base}/sessions/{id}/pair        {"phone": "..."}
//! POST {base}/sessions/{id}/disconnect
//! POST {base}/sessions/{id}/logout
//! POST {base}/sessions/{id}/send        {"kind", "to", "mime_type", "data"(base64), ...}
//! GET  {base}/sessions/{id}/status

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    ClientError, ClientEvent, ConnectOutcome, OutgoingMedia, SendReceipt, WhatsAppClientFactory,
    WhatsAppClientPort,
};
use crate::domain::message::MediaKind;
use crate::domain::session::{ProxyConfig, SessionId, WhatsAppJid};

const EVENT_CAPACITY: usize = 32;

/// 桥接客户端配置
#[derive(Debug, Clone)]
pub struct BridgeClientConfig {
    /// 桥接服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
    /// 状态轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 桥接服务的访问令牌
    pub api_token: Option<String>,
}

impl Default for BridgeClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            timeout_secs: 30,
            poll_interval_ms: 2000,
            api_token: None,
        }
    }
}

impl BridgeClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_poll_interval(mut self, millis: u64) -> Self {
        self.poll_interval_ms = millis;
        self
    }

    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        self.api_token = token.filter(|t| !t.is_empty());
        self
    }
}

#[derive(Debug, Serialize)]
struct ConnectRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PairRequest<'a> {
    phone: &'a str,
}

#[derive(Debug, Deserialize)]
struct PairResponse {
    pairing_code: String,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    kind: MediaKind,
    to: &'a str,
    mime_type: &'a str,
    data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_name: Option<&'a str>,
    ptt: bool,
}

/// 桥接服务报告的会话状态
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct BridgeStatus {
    connected: bool,
    authenticated: bool,
    jid: Option<String>,
    qr_code: Option<String>,
    logged_out: bool,
}

/// 本地缓存的连接状态
#[derive(Debug, Default)]
struct CachedState {
    connected: bool,
    authenticated: bool,
    jid: Option<WhatsAppJid>,
    qr_code: Option<String>,
}

fn map_reqwest_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else if e.is_connect() {
        ClientError::NetworkError(format!("Cannot connect to WhatsApp bridge: {}", e))
    } else {
        ClientError::NetworkError(e.to_string())
    }
}

/// 桥接客户端工厂
///
/// 所有会话共享同一个 reqwest 连接池
pub struct BridgeClientFactory {
    http: Client,
    config: Arc<BridgeClientConfig>,
}

impl BridgeClientFactory {
    pub fn new(config: BridgeClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }
}

impl WhatsAppClientFactory for BridgeClientFactory {
    fn create(
        &self,
        session_id: &SessionId,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Arc<dyn WhatsAppClientPort>, ClientError> {
        let proxy_url = proxy
            .map(|p| p.to_url())
            .transpose()
            .map_err(|e| ClientError::ServiceError(e.to_string()))?;
        Ok(Arc::new(BridgeWhatsAppClient::new(
            self.http.clone(),
            self.config.clone(),
            *session_id,
            proxy_url,
        )))
    }
}

/// 桥接客户端
///
/// 连接后后台轮询桥接服务状态，把状态变化转换为 ClientEvent
pub struct BridgeWhatsAppClient {
    inner: Arc<BridgeInner>,
    poller: Mutex<Option<CancellationToken>>,
}

struct BridgeInner {
    http: Client,
    config: Arc<BridgeClientConfig>,
    session_id: SessionId,
    proxy_url: Option<String>,
    state: Mutex<CachedState>,
    events: broadcast::Sender<ClientEvent>,
}

impl BridgeWhatsAppClient {
    fn new(
        http: Client,
        config: Arc<BridgeClientConfig>,
        session_id: SessionId,
        proxy_url: Option<String>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(BridgeInner {
                http,
                config,
                session_id,
                proxy_url,
                state: Mutex::new(CachedState::default()),
                events,
            }),
            poller: Mutex::new(None),
        }
    }

    fn start_polling(&self) {
        let token = CancellationToken::new();
        if let Ok(mut poller) = self.poller.lock() {
            if let Some(old) = poller.replace(token.clone()) {
                old.cancel();
            }
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(inner.config.poll_interval_ms));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match inner.fetch_status().await {
                            Ok(status) => {
                                if !inner.apply_status(status) {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(
                                    session_id = %inner.session_id,
                                    error = %e,
                                    "Bridge status poll failed"
                                );
                            }
                        }
                    }
                }
            }
            tracing::debug!(session_id = %inner.session_id, "Bridge status poller stopped");
        });
    }

    fn stop_polling(&self) {
        if let Ok(mut poller) = self.poller.lock() {
            if let Some(token) = poller.take() {
                token.cancel();
            }
        }
    }
}

impl Drop for BridgeWhatsAppClient {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

impl BridgeInner {
    fn url(&self, action: &str) -> String {
        format!(
            "{}/sessions/{}/{}",
            self.config.base_url, self.session_id, action
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(ClientError::NotAuthenticated),
            409 => Err(ClientError::NotConnected),
            _ => Err(ClientError::ServiceError(format!(
                "HTTP {}: {}",
                status, error_text
            ))),
        }
    }

    async fn post_empty(&self, action: &str) -> Result<(), ClientError> {
        let response = self
            .authorize(self.http.post(self.url(action)))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_status(&self) -> Result<BridgeStatus, ClientError> {
        let response = self
            .authorize(self.http.get(self.url("status")))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    fn emit(&self, event: ClientEvent) {
        // 没有订阅者时忽略
        let _ = self.events.send(event);
    }

    fn parse_jid(&self, raw: Option<&str>) -> Option<WhatsAppJid> {
        let raw = raw?;
        match WhatsAppJid::parse(raw) {
            Ok(jid) => Some(jid),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Bridge returned an invalid JID");
                None
            }
        }
    }

    /// 合并最新状态并发出变化事件；返回 false 表示应停止轮询
    fn apply_status(&self, status: BridgeStatus) -> bool {
        let jid = self.parse_jid(status.jid.as_deref());
        let mut events = Vec::new();

        let keep_polling = match self.state.lock() {
            Ok(mut state) => {
                if status.logged_out {
                    *state = CachedState::default();
                    events.push(ClientEvent::LoggedOut);
                    false
                } else {
                    if let Some(qr) = status.qr_code.filter(|q| !q.is_empty()) {
                        if state.qr_code.as_deref() != Some(qr.as_str()) && !status.authenticated {
                            state.qr_code = Some(qr.clone());
                            events.push(ClientEvent::QrCode(qr));
                        }
                    }
                    if status.authenticated && !state.authenticated {
                        if let Some(jid) = jid.clone() {
                            events.push(ClientEvent::PairSuccess { jid });
                        }
                    }
                    if status.connected && status.authenticated && !state.connected {
                        if let Some(jid) = jid.clone() {
                            events.push(ClientEvent::Connected { jid });
                        }
                    }
                    if !status.connected && state.connected {
                        events.push(ClientEvent::Disconnected);
                    }
                    state.connected = status.connected;
                    state.authenticated = status.authenticated;
                    if jid.is_some() {
                        state.jid = jid;
                        state.qr_code = None;
                    }
                    true
                }
            }
            Err(_) => false,
        };

        for event in events {
            self.emit(event);
        }
        keep_polling
    }
}

#[async_trait]
impl WhatsAppClientPort for BridgeWhatsAppClient {
    async fn connect(&self) -> Result<ConnectOutcome, ClientError> {
        let inner = &self.inner;
        tracing::debug!(
            url = %inner.url("connect"),
            has_proxy = inner.proxy_url.is_some(),
            "Sending bridge connect request"
        );

        let response = inner
            .authorize(inner.http.post(inner.url("connect")))
            .json(&ConnectRequest {
                proxy_url: inner.proxy_url.as_deref(),
            })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status: BridgeStatus = BridgeInner::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        let jid = inner.parse_jid(status.jid.as_deref());
        let outcome = if status.authenticated {
            if jid.is_none() {
                return Err(ClientError::InvalidResponse(
                    "authenticated session without JID".to_string(),
                ));
            }
            ConnectOutcome {
                needs_auth: false,
                qr_code: None,
                jid: jid.clone(),
            }
        } else {
            ConnectOutcome {
                needs_auth: true,
                qr_code: status.qr_code.clone().filter(|q| !q.is_empty()),
                jid: None,
            }
        };

        inner.apply_status(status);
        self.start_polling();

        tracing::info!(
            session_id = %inner.session_id,
            needs_auth = outcome.needs_auth,
            "Bridge connect completed"
        );
        Ok(outcome)
    }

    async fn pair_phone(&self, phone: &str) -> Result<String, ClientError> {
        let inner = &self.inner;
        let response = inner
            .authorize(inner.http.post(inner.url("pair")))
            .json(&PairRequest { phone })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body: PairResponse = BridgeInner::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(body.pairing_code)
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.stop_polling();
        self.inner.post_empty("disconnect").await?;
        if let Ok(mut state) = self.inner.state.lock() {
            state.connected = false;
        }
        Ok(())
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.stop_polling();
        self.inner.post_empty("logout").await?;
        if let Ok(mut state) = self.inner.state.lock() {
            *state = CachedState::default();
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.inner.state.lock().map(|s| s.connected).unwrap_or(false)
    }

    async fn is_authenticated(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|s| s.authenticated)
            .unwrap_or(false)
    }

    async fn jid(&self) -> Option<WhatsAppJid> {
        self.inner.state.lock().ok().and_then(|s| s.jid.clone())
    }

    async fn send_media(&self, media: OutgoingMedia) -> Result<SendReceipt, ClientError> {
        let inner = &self.inner;
        let body = SendRequest {
            kind: media.kind,
            to: media.recipient.as_str(),
            mime_type: &media.mime_type,
            data: STANDARD.encode(&media.data),
            caption: media.caption.as_deref(),
            file_name: media.file_name.as_deref(),
            ptt: media.voice_note,
        };

        tracing::debug!(
            session_id = %inner.session_id,
            kind = %media.kind,
            size = media.data.len(),
            "Sending media through bridge"
        );

        let response = inner
            .authorize(inner.http.post(inner.url("send")))
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = BridgeInner::check(response).await.map_err(|e| match e {
            ClientError::ServiceError(msg) => ClientError::SendFailed(msg),
            other => other,
        })?;
        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }
}
