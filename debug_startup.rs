// Connectivity probe for the counter store used by the service.
// Run this with: cargo run --bin debug_startup

use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edge_ratelimit::{
    config::Settings,
    context::Context,
    storage::{CounterStore, RedisStore},
};

const PROBE_KEY: &str = "rate_limit:probe:debug_startup";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting store connectivity probe...");
    let start_time = Instant::now();

    let settings = Settings::load(std::env::var("CONFIG_PATH").ok().as_deref())?;
    let redis_config = settings.redis_config();
    info!("Using Redis URL: {}", redis_config.url);

    let result = tokio::time::timeout(Duration::from_secs(10), RedisStore::connect(redis_config)).await;
    let store = match result {
        Ok(Ok(store)) => {
            info!("Redis store connected in {:?}", start_time.elapsed());
            store
        }
        Ok(Err(e)) => {
            error!("Redis store connection failed: {}", e);
            return Err(e.into());
        }
        Err(_) => {
            error!("Redis connection timed out after 10 seconds");
            return Err(anyhow::anyhow!("Redis connection timeout"));
        }
    };

    let ctx = Context::with_timeout(Duration::from_secs(3));

    let probe_start = Instant::now();
    store.health_check(&ctx).await?;
    info!("Health check passed in {:?}", probe_start.elapsed());

    let count = store.increment(&ctx, PROBE_KEY, Duration::from_secs(1)).await?;
    info!("Probe increment returned {}", count);
    store.delete(&ctx, PROBE_KEY).await?;
    info!("Probe key removed");

    store.close().await?;
    info!("All checks completed successfully in {:?}", start_time.elapsed());
    Ok(())
}
