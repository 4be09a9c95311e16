//! CDK distribution HTTP server.

use anyhow::Context;
use cdk_core::{DistributionEnvironment, SystemClock};
use cdk_forum::HttpForumClient;
use cdk_postgres::PostgresProjectRepository;
use cdk_redis::{RedisInventoryStore, RedisRateLimiter, RedisSameIpStore, RedisSessionStore};
use cdk_server::{
    AppState, Config, build_router, lifecycle,
    server::health::{PostgresProbe, RedisProbe},
    telemetry,
};
use cdk_web::handlers::ReadinessProbe;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    let config = Config::from_env();
    telemetry::init_tracing(&config.server.log_level);
    info!("Starting CDK server");

    let metrics_handle = telemetry::install_metrics().context("Failed to install Prometheus recorder")?;
    let metrics_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.metrics_port)
        .parse()
        .context("Invalid metrics address")?;
    telemetry::spawn_metrics_server(metrics_handle, metrics_addr);

    info!("Connecting to PostgreSQL...");
    let pool = cdk_postgres::connect(
        &config.postgres.url,
        config.postgres.max_connections,
        config.postgres.min_connections,
        Duration::from_secs(config.postgres.connect_timeout),
    )
    .await?;
    let repository = PostgresProjectRepository::new(pool.clone());
    repository.migrate().await?;
    info!("Migrations complete");

    info!("Connecting to Redis...");
    let redis = cdk_redis::connect(&config.redis.url).await?;
    info!("Redis connected");

    let forum = HttpForumClient::new(
        config.forum.base_url.clone(),
        config.forum.api_key.clone(),
        config.forum.timeout(),
    )?;
    if config.forum.api_key.is_empty() {
        warn!("FORUM_API_KEY is not set; lottery projects cannot be created");
    }

    let env = DistributionEnvironment {
        inventory: Arc::new(RedisInventoryStore::new(redis.clone())),
        same_ip: Arc::new(RedisSameIpStore::new(redis.clone())),
        repository: Arc::new(repository),
        forum: Arc::new(forum),
        rate_limiter: Arc::new(RedisRateLimiter::new(redis.clone())),
        sessions: Arc::new(RedisSessionStore::new(redis.clone())),
        clock: Arc::new(SystemClock),
    };
    let probes: Vec<Arc<dyn ReadinessProbe>> =
        vec![Arc::new(PostgresProbe(pool)), Arc::new(RedisProbe(redis))];

    let state = AppState::new(env, config.projects.clone(), probes);
    let app = build_router(state, &config.server.cors_origins);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "HTTP server listening");

    // Start the drain deadline only once a signal has arrived.
    let shutdown = Arc::new(Notify::new());
    let signalled = Arc::clone(&shutdown);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        lifecycle::shutdown_signal().await;
        signalled.notify_one();
    })
    .into_future();

    let drain_timeout = Duration::from_secs(config.server.shutdown_timeout);
    tokio::select! {
        result = server => result.context("HTTP server failed")?,
        () = async {
            shutdown.notified().await;
            tokio::time::sleep(drain_timeout).await;
        } => warn!(timeout_secs = config.server.shutdown_timeout, "Graceful shutdown timed out"),
    }

    info!("Server shut down");
    Ok(())
}
