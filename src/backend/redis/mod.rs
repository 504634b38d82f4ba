//! Redis store implementation for relayq.
//!
//! This module provides a Redis-based implementation of the [`QueueStore`]
//! trait, which is the default store for relayq.
//!
//! # Features
//!
//! - Transactional push (`MULTI` / `INCR` / `LPUSH` / `EXEC`)
//! - Atomic handoff with `RPOPLPUSH`, optionally trimming the outbox in the
//!   same transaction
//! - Native blocking handoff with `BRPOPLPUSH`
//! - bb8 connection pool owned by each store, validated with `PING` on checkout
//!
//! # Usage
//!
//! ```rust,ignore
//! use relayq::backend::{RedisConfig, RedisStore};
//!
//! let store = RedisStore::connect("localhost:6379", None, RedisConfig::with_idle(3, 100)).await?;
//! ```
//!
//! # Valkey Compatibility
//!
//! Since Valkey is Redis-compatible, this store works with Valkey servers
//! by simply pointing the address to a Valkey instance.

mod commands;
mod pool;

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::{bb8::Pool, RedisConnectionManager};
use tracing::info;

pub use pool::create_redis_pool;
pub use pool::RedisConfig;

pub(crate) use pool::redacted;

use super::error::QueueResult;
use super::traits::*;

/// Redis-based store for relayq.
///
/// Each store owns its connection pool, so independently configured queues
/// can live side by side in one process.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool<RedisConnectionManager>,
}

impl RedisStore {
    /// Wrap an existing pool.
    pub fn new(pool: Pool<RedisConnectionManager>) -> Self {
        Self { pool }
    }

    /// Build a pool for `address`, authenticating with `credential` if given,
    /// and verify it with a liveness check.
    pub async fn connect(
        address: &str,
        credential: Option<&str>,
        config: RedisConfig,
    ) -> QueueResult<Self> {
        let pool = create_redis_pool(address, credential, config).await?;
        info!(address = %redacted(address), "Connected to Redis");
        Ok(Self::new(pool))
    }

    /// Get the Redis connection pool.
    pub fn pool(&self) -> &Pool<RedisConnectionManager> {
        &self.pool
    }
}

// ============================================================================
// QueueStore Implementation
// ============================================================================

#[async_trait]
impl QueueStore for RedisStore {
    async fn ping(&self) -> QueueResult<()> {
        commands::ping(self).await
    }

    async fn push(&self, keys: &QueueKeys, payload: String) -> QueueResult<i64> {
        commands::push(self, keys, payload).await
    }

    async fn try_move(
        &self,
        keys: &QueueKeys,
        retention: OutboxRetention,
    ) -> QueueResult<Option<String>> {
        commands::try_move(self, keys, retention).await
    }

    async fn blocking_move(
        &self,
        keys: &QueueKeys,
        retention: OutboxRetention,
        block: Duration,
    ) -> QueueResult<Option<String>> {
        commands::blocking_move(self, keys, retention, block).await
    }

    async fn restore(&self, keys: &QueueKeys, raw: String) -> QueueResult<()> {
        commands::restore(self, keys, raw).await
    }

    async fn len(&self, key: &str) -> QueueResult<i64> {
        commands::len(self, key).await
    }

    async fn counter(&self, key: &str) -> QueueResult<i64> {
        commands::counter(self, key).await
    }

    async fn trim(&self, key: &str, keep: usize) -> QueueResult<()> {
        commands::trim(self, key, keep).await
    }
}
