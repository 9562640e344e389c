//! wagate - 多会话 WhatsApp HTTP 网关
//!
//! - Domain: session/, message/ (Bounded Contexts)
//! - Application: commands, queries, ports
//! - Infrastructure: http, memory, worker, persistence, adapters, events

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use wagate::application::{ConnectionManagerPort, SessionRepositoryPort, WhatsAppClientFactory};
use wagate::config::{load_config, print_config, AppConfig, ClientBackend, LogConfig};
use wagate::infrastructure::adapters::{BridgeClientConfig, BridgeClientFactory, FakeClientFactory};
use wagate::infrastructure::events::EventPublisher;
use wagate::infrastructure::http::{AppState, HttpServer, RateLimit, ServerConfig};
use wagate::infrastructure::memory::InMemoryConnectionManager;
use wagate::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteSessionRepository,
};
use wagate::infrastructure::worker::{AutoReconnectWorker, ReconnectWorkerConfig};

fn init_tracing(log: &LogConfig) {
    let log_filter = format!("{},wagate={},tower_http=debug", log.level, log.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter));

    if log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn client_factory(config: &AppConfig) -> anyhow::Result<Arc<dyn WhatsAppClientFactory>> {
    let factory: Arc<dyn WhatsAppClientFactory> = match config.whatsapp.backend {
        ClientBackend::Fake => {
            tracing::warn!("Using the in-process fake client; no real WhatsApp traffic is sent");
            Arc::new(FakeClientFactory::new())
        }
        ClientBackend::Bridge => {
            let bridge = BridgeClientConfig::new(config.whatsapp.bridge_url.clone())
                .with_timeout(config.whatsapp.timeout_secs)
                .with_poll_interval(config.whatsapp.poll_interval_ms)
                .with_api_token(config.whatsapp.api_token.clone());
            Arc::new(BridgeClientFactory::new(bridge)?)
        }
    };
    Ok(factory)
}

fn server_config(config: &AppConfig) -> ServerConfig {
    let mut server = ServerConfig::new(&config.server.host, config.server.port);
    if config.auth.enabled {
        server = server.with_api_key(config.auth.api_key.clone());
    }
    if config.rate_limit.enabled {
        server = server.with_rate_limit(RateLimit {
            requests: config.rate_limit.requests_per_second,
            per: Duration::from_secs(1),
            burst: config.rate_limit.burst,
        });
    }
    server
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        return;
    }
    tracing::info!("Received shutdown signal");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config.log);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wagate starting");
    print_config(&config);

    // 确保数据目录存在
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // 初始化数据库
    let db_config = DatabaseConfig::new(&config.database.path, config.database.max_connections);
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;

    let repo: Arc<dyn SessionRepositoryPort> = Arc::new(SqliteSessionRepository::new(pool));
    let event_publisher = EventPublisher::new().arc();
    let factory = client_factory(&config)?;

    let connections: Arc<dyn ConnectionManagerPort> =
        InMemoryConnectionManager::new(repo.clone(), factory, event_publisher.clone()).arc();

    // 上次运行遗留的 Connecting 状态没有对应句柄
    let reset = connections.reconcile_on_startup().await?;
    tracing::info!(reset = reset, "Startup reconciliation finished");

    let shutdown = CancellationToken::new();

    // 启动自动重连 Worker
    let worker_config = ReconnectWorkerConfig {
        enabled: config.reconnect.enabled,
        interval: Duration::from_secs(config.reconnect.interval_secs),
        max_concurrent: config.reconnect.max_concurrent,
        attempt_timeout: Duration::from_secs(config.reconnect.attempt_timeout_secs),
        initial_delay: Duration::from_secs(config.reconnect.initial_delay_secs),
    };
    let worker = AutoReconnectWorker::new(
        worker_config,
        repo.clone(),
        connections.clone(),
        event_publisher.clone(),
    );
    let worker_handle = tokio::spawn(worker.run(shutdown.child_token()));

    // 创建 HTTP 服务器
    let state = AppState::new(repo, connections.clone(), event_publisher)
        .with_shutdown(shutdown.child_token())
        .with_request_timeout(config.server.request_timeout());
    let server = HttpServer::new(server_config(&config), state);

    tokio::spawn(shutdown_signal(shutdown.clone()));

    let served = server.run(shutdown.clone()).await;

    // 服务器退出（含绑定失败）时也停止后台任务
    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        tracing::warn!(error = %e, "Reconnect worker did not stop cleanly");
    }

    // 断开所有活动连接，保留持久化状态以便下次启动自动重连
    for id in connections.client_ids() {
        if let Err(e) = connections.disconnect(&id).await {
            tracing::warn!(session_id = %id, error = %e, "Failed to disconnect client on shutdown");
        }
    }

    served?;
    tracing::info!("Server shutdown complete");

    Ok(())
}
