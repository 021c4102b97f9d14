//! Edge Rate Limit
//!
//! Per-IP and per-token request rate limiting for HTTP services. Each
//! identity gets a fixed one-second counting window; exceeding it puts the
//! identity into a cooldown block for a configured duration. All state lives
//! in a pluggable counter store (Redis in production, in-memory for tests),
//! so the limiter itself can be shared across any number of tasks.

pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod storage;
pub mod utils;

// Re-export main types
pub use crate::config::Settings;
pub use context::Context;
pub use error::{RateLimitError, Result};
pub use limiter::{LimitResult, LimitType, LimiterConfig, RateLimiter};
pub use storage::{CounterStore, MemoryStore, RedisStore, StoreError};
