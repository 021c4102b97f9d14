use anyhow::Result;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edge_ratelimit::{
    config::Settings,
    limiter::RateLimiter,
    metrics::Metrics,
    server::{build_router, serve, shutdown_signal, AppState},
    storage::{CounterStore, RedisStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edge_ratelimit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rate limit service");

    let config_path = std::env::var("CONFIG_PATH").ok();
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path);
    }
    let settings = Settings::load(config_path.as_deref())?;
    let limits = settings.limiter_config();
    info!(
        ip_rps = limits.ip_requests_per_second,
        ip_block_secs = limits.ip_block_duration_seconds,
        token_rps = limits.token_requests_per_second,
        token_block_secs = limits.token_block_duration_seconds,
        "Configuration loaded"
    );

    let store = Arc::new(RedisStore::connect(settings.redis_config()).await?);
    let limiter = Arc::new(RateLimiter::new(store.clone(), limits));
    let metrics = Arc::new(Metrics::new()?);

    let state = AppState {
        limiter,
        metrics,
        request_timeout: settings.request_timeout(),
    };
    let router = build_router(state, &settings)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server_port));
    serve(router, addr, shutdown_signal()).await?;

    if let Err(e) = store.close().await {
        warn!("Failed to close store: {}", e);
    }

    info!("Service stopped");
    Ok(())
}
