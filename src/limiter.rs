use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::{
    context::Context,
    error::{RateLimitError, Result},
    storage::{CounterStore, StoreOperation},
    utils::{generate_block_key, generate_counter_key, TimeSource, WINDOW},
};

/// Which quota an identity is counted against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    Ip,
    Token,
}

impl LimitType {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitType::Ip => "ip",
            LimitType::Token => "token",
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitType {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ip" => Ok(LimitType::Ip),
            "token" => Ok(LimitType::Token),
            other => Err(RateLimitError::InvalidLimitType(other.to_string())),
        }
    }
}

/// Quotas for both limit types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub ip_requests_per_second: u32,
    pub ip_block_duration_seconds: u64,
    pub token_requests_per_second: u32,
    pub token_block_duration_seconds: u64,
}

impl LimiterConfig {
    /// Requests allowed per window and cooldown length for `limit_type`
    pub fn quota(&self, limit_type: LimitType) -> (i64, Duration) {
        match limit_type {
            LimitType::Ip => (
                i64::from(self.ip_requests_per_second),
                Duration::from_secs(self.ip_block_duration_seconds),
            ),
            LimitType::Token => (
                i64::from(self.token_requests_per_second),
                Duration::from_secs(self.token_block_duration_seconds),
            ),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            ip_requests_per_second: 10,
            ip_block_duration_seconds: 300,
            token_requests_per_second: 100,
            token_block_duration_seconds: 600,
        }
    }
}

/// Outcome of a single rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitResult {
    pub allowed: bool,
    pub limit: i64,
    pub remaining: i64,
    pub reset_time: DateTime<Utc>,
}

impl LimitResult {
    /// Whole seconds until `reset_time`, rounded up and never below 1
    pub fn retry_after_secs(&self) -> u64 {
        let millis = (self.reset_time - Utc::now()).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// Fixed-window rate limiter with a hard cooldown block.
///
/// The limiter itself holds no mutable state; every counter and block lives
/// in the injected [`CounterStore`], so one instance can be shared freely
/// across tasks.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: LimiterConfig,
    time_source: TimeSource,
}

impl RateLimiter {
    /// Create a new rate limiter over the given store
    pub fn new(store: Arc<dyn CounterStore>, config: LimiterConfig) -> Self {
        Self {
            store,
            config,
            time_source: TimeSource::new(),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Check `identifier` against the quota named by `limit_type`.
    ///
    /// Unknown limit types are rejected before the store is touched.
    pub async fn check_limit(
        &self,
        ctx: &Context,
        identifier: &str,
        limit_type: &str,
    ) -> Result<LimitResult> {
        let limit_type = limit_type.parse::<LimitType>()?;
        self.check(ctx, identifier, limit_type).await
    }

    /// Typed form of [`check_limit`](Self::check_limit)
    pub async fn check(
        &self,
        ctx: &Context,
        identifier: &str,
        limit_type: LimitType,
    ) -> Result<LimitResult> {
        let (limit, block_duration) = self.config.quota(limit_type);

        let block_key = generate_block_key(limit_type, identifier);
        let blocked = self
            .store
            .exists(ctx, &block_key)
            .await
            .map_err(|e| RateLimitError::from_store(StoreOperation::Exists, &block_key, e))?;

        if blocked {
            debug!(%limit_type, identifier, "request rejected while blocked");
            return Ok(self.denied(limit, block_duration));
        }

        let counter_key = generate_counter_key(limit_type, identifier);
        let current_count = self
            .store
            .increment(ctx, &counter_key, WINDOW)
            .await
            .map_err(|e| RateLimitError::from_store(StoreOperation::Increment, &counter_key, e))?;

        if current_count > limit {
            // A zero cooldown denies this request only; writing the marker
            // with no TTL would block forever.
            if !block_duration.is_zero() {
                self.store
                    .set(ctx, &block_key, 1, block_duration)
                    .await
                    .map_err(|e| RateLimitError::from_store(StoreOperation::Set, &block_key, e))?;
            }
            warn!(
                %limit_type,
                identifier,
                count = current_count,
                limit,
                block_secs = block_duration.as_secs(),
                "rate limit exceeded, blocking"
            );
            return Ok(self.denied(limit, block_duration));
        }

        debug!(%limit_type, identifier, count = current_count, limit, "request allowed");
        Ok(LimitResult {
            allowed: true,
            limit,
            remaining: limit - current_count,
            reset_time: self.time_source.reset_after(WINDOW),
        })
    }

    /// Health check for the underlying store
    pub async fn health_check(&self, ctx: &Context) -> Result<()> {
        self.store
            .health_check(ctx)
            .await
            .map_err(|e| RateLimitError::from_store(StoreOperation::Ping, "<store>", e))
    }

    fn denied(&self, limit: i64, block_duration: Duration) -> LimitResult {
        LimitResult {
            allowed: false,
            limit,
            remaining: 0,
            reset_time: self.time_source.reset_after(block_duration),
        }
    }
}
