use async_trait::async_trait;
use moka::{future::Cache, Expiry};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use super::{CounterStore, StoreError};
use crate::context::Context;

/// A stored counter together with the instant it expires at
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CounterEntry {
    pub value: i64,
    pub expires_at: Option<Instant>,
}

fn deadline(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        Some(Instant::now() + ttl)
    }
}

/// Expiry policy that reads each entry's own deadline on create and update
pub struct EntryExpiry;

impl Expiry<String, CounterEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CounterEntry,
        created_at: Instant,
    ) -> Option<Duration> {
        value
            .expires_at
            .map(|at| at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CounterEntry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value
            .expires_at
            .map(|at| at.saturating_duration_since(updated_at))
    }
}

/// In-process counter store backed by a concurrent cache.
///
/// The cache is unbounded: evicting a live counter or block marker would
/// silently reset a limit, so entries leave only when their TTL runs out or
/// they are deleted.
pub struct MemoryStore {
    entries: Cache<String, CounterEntry>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let entries = Cache::builder().expire_after(EntryExpiry).build();

        Self {
            entries,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        self.ensure_open()?;
        ctx.run(async {
            // Upserts on the same key are serialized by the cache.
            let entry = self
                .entries
                .entry(key.to_string())
                .and_upsert_with(|existing| {
                    // A zero TTL leaves an existing expiry untouched.
                    let entry = match existing.map(|e| e.into_value()) {
                        Some(prev) if ttl.is_zero() => CounterEntry {
                            value: prev.value + 1,
                            expires_at: prev.expires_at,
                        },
                        prev => CounterEntry {
                            value: prev.map(|p| p.value).unwrap_or(0) + 1,
                            expires_at: deadline(ttl),
                        },
                    };
                    std::future::ready(entry)
                })
                .await;
            Ok(entry.into_value().value)
        })
        .await
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<i64, StoreError> {
        self.ensure_open()?;
        ctx.run(async { Ok(self.entries.get(key).await.map(|e| e.value).unwrap_or(0)) })
            .await
    }

    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        ctx.run(async {
            self.entries
                .insert(
                    key.to_string(),
                    CounterEntry {
                        value,
                        expires_at: deadline(ttl),
                    },
                )
                .await;
            Ok(())
        })
        .await
    }

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, StoreError> {
        self.ensure_open()?;
        ctx.run(async { Ok(self.entries.get(key).await.is_some()) })
            .await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        ctx.run(async {
            self.entries.invalidate(key).await;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.entries.invalidate_all();
        }
        Ok(())
    }

    async fn health_check(&self, _ctx: &Context) -> Result<(), StoreError> {
        self.ensure_open()
    }
}
