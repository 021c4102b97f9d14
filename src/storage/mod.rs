//! Counter store contract and its implementations.
//!
//! The decision engine never talks to a backend directly; it only needs a
//! key-value store with atomic increment-with-expiry, plain read/write,
//! existence check and delete. [`RedisStore`] backs production and
//! [`MemoryStore`] backs tests and single-process deployments.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::context::Context;

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::{RedisConfig, RedisStore};

/// Errors raised by a counter store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("store command timed out after {0:?}")]
    Timeout(Duration),

    #[error("store is closed")]
    Closed,

    #[error("unexpected store response: {0}")]
    UnexpectedResponse(String),
}

impl StoreError {
    /// True when the caller's context, not the backend, ended the call.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StoreError::Cancelled | StoreError::DeadlineExceeded)
    }
}

/// Store operation names, carried in errors for context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    Increment,
    Get,
    Set,
    Exists,
    Delete,
    Ping,
}

impl StoreOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreOperation::Increment => "increment",
            StoreOperation::Get => "get",
            StoreOperation::Set => "set",
            StoreOperation::Exists => "exists",
            StoreOperation::Delete => "delete",
            StoreOperation::Ping => "ping",
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key-value store with atomic counters and per-key expiry.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add one to the counter at `key`, creating it at zero if
    /// absent, and (re)apply `ttl`. Returns the post-increment value.
    ///
    /// A zero `ttl` keeps whatever expiry the key already has.
    async fn increment(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<i64, StoreError>;

    /// Current value of `key`, or 0 when absent.
    async fn get(&self, ctx: &Context, key: &str) -> Result<i64, StoreError>;

    /// Unconditionally write `value` at `key` with expiry `ttl`; a zero `ttl`
    /// means the key never expires.
    async fn set(&self, ctx: &Context, key: &str, value: i64, ttl: Duration)
        -> Result<(), StoreError>;

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, StoreError>;

    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), StoreError>;

    /// Release underlying resources. Calling it more than once is a no-op.
    async fn close(&self) -> Result<(), StoreError>;

    /// Health check for the store
    async fn health_check(&self, ctx: &Context) -> Result<(), StoreError>;
}
