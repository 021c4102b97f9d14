use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{CounterStore, StoreError};
use crate::context::Context;

/// Redis client configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(1),
        }
    }
}

impl RedisConfig {
    /// Build a configuration from discrete connection settings
    pub fn from_parts(host: &str, port: u16, password: &str, db: i64) -> Self {
        Self {
            url: redis_url(host, port, password, db),
            ..Default::default()
        }
    }
}

fn redis_url(host: &str, port: u16, password: &str, db: i64) -> String {
    if password.is_empty() {
        format!("redis://{}:{}/{}", host, port, db)
    } else {
        format!("redis://:{}@{}:{}/{}", password, host, port, db)
    }
}

/// Connection shared by every clone of a store; empty once closed
struct SharedConnection<C> {
    inner: Arc<RwLock<Option<C>>>,
}

impl<C> Clone for SharedConnection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Clone> SharedConnection<C> {
    fn new(connection: C) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(connection))),
        }
    }

    async fn get(&self) -> Result<C, StoreError> {
        self.inner.read().await.clone().ok_or(StoreError::Closed)
    }

    /// Take the connection out; `None` if it was already released
    async fn release(&self) -> Option<C> {
        self.inner.write().await.take()
    }

    fn is_closed(&self) -> Option<bool> {
        self.inner.try_read().ok().map(|conn| conn.is_none())
    }
}

/// Redis-backed counter store
#[derive(Clone)]
pub struct RedisStore {
    connection: SharedConnection<ConnectionManager>,
    config: RedisConfig,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .field("closed", &self.connection.is_closed())
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis and verify the connection with PING
    pub async fn connect(config: RedisConfig) -> Result<Self, StoreError> {
        info!("Creating Redis client for {}", config.url);

        let client = redis::Client::open(config.url.clone()).map_err(|e| {
            warn!("Failed to create Redis client: {}", e);
            StoreError::Redis(e)
        })?;

        let connection = match tokio::time::timeout(
            config.connection_timeout,
            client.get_connection_manager(),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                warn!("Failed to create connection manager: {}", e);
                return Err(StoreError::Redis(e));
            }
            Err(_) => {
                warn!(
                    "Timeout while creating connection manager ({}s)",
                    config.connection_timeout.as_secs()
                );
                return Err(StoreError::Timeout(config.connection_timeout));
            }
        };

        let store = Self {
            connection: SharedConnection::new(connection),
            config,
        };

        store.bounded(ping(store.connection.get().await?)).await?;
        info!("Redis store initialized successfully");
        Ok(store)
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Run a single command under the caller's context and the adapter's
    /// own command timeout.
    async fn execute<F, Fut, T>(&self, ctx: &Context, command: F) -> Result<T, StoreError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let conn = self.connection.get().await?;
        ctx.run(self.bounded(command(conn))).await
    }

    async fn bounded<F, T>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.config.command_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.config.command_timeout))?
    }
}

async fn ping(mut conn: ConnectionManager) -> Result<(), StoreError> {
    redis::cmd("PING")
        .query_async::<_, ()>(&mut conn)
        .await
        .map_err(StoreError::from)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        self.execute(ctx, |mut conn| async move {
            let mut pipe = redis::pipe();
            pipe.atomic().cmd("INCR").arg(key);
            if !ttl.is_zero() {
                pipe.cmd("PEXPIRE").arg(key).arg(ttl_millis(ttl)).ignore();
            }

            let value: redis::Value = pipe.query_async(&mut conn).await?;
            match value {
                redis::Value::Bulk(values) => match values.first() {
                    Some(redis::Value::Int(count)) => Ok(*count),
                    other => Err(StoreError::UnexpectedResponse(format!(
                        "expected integer from INCR, got {:?}",
                        other
                    ))),
                },
                other => Err(StoreError::UnexpectedResponse(format!(
                    "unexpected pipeline response {:?}",
                    other
                ))),
            }
        })
        .await
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<i64, StoreError> {
        self.execute(ctx, |mut conn| async move {
            let value: Option<i64> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
            Ok(value.unwrap_or(0))
        })
        .await
    }

    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.execute(ctx, |mut conn| async move {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if !ttl.is_zero() {
                cmd.arg("PX").arg(ttl_millis(ttl));
            }
            cmd.query_async::<_, ()>(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, StoreError> {
        self.execute(ctx, |mut conn| async move {
            let count: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
            Ok(count > 0)
        })
        .await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), StoreError> {
        self.execute(ctx, |mut conn| async move {
            redis::cmd("DEL").arg(key).query_async::<_, ()>(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        if let Some(connection) = self.connection.release().await {
            drop(connection);
            debug!("Redis store closed");
        }
        Ok(())
    }

    async fn health_check(&self, ctx: &Context) -> Result<(), StoreError> {
        self.execute(ctx, ping).await
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PEXPIRE 0 deletes the key, so round sub-millisecond TTLs up.
    (ttl.as_millis() as u64).max(1)
}
