//! Redis list operations backing the queue protocol.

use std::time::Duration;

use bb8_redis::bb8::PooledConnection;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::RedisStore;
use crate::backend::error::{QueueError, QueueResult};
use crate::backend::traits::{OutboxRetention, QueueKeys};

// ============================================================================
// Internal helpers
// ============================================================================

async fn get_conn(
    store: &RedisStore,
) -> QueueResult<PooledConnection<'_, RedisConnectionManager>> {
    store
        .pool()
        .get()
        .await
        .map_err(|e| QueueError::Backend(format!("Failed to get Redis connection: {}", e)))
}

/// LTRIM bounds that keep the `keep` newest elements. LTRIM with start > stop
/// empties the list, which covers `keep == 0`.
fn trim_range(keep: usize) -> (isize, isize) {
    if keep == 0 {
        (1, 0)
    } else {
        (0, keep as isize - 1)
    }
}

// ============================================================================
// Queue Operations
// ============================================================================

pub async fn ping(store: &RedisStore) -> QueueResult<()> {
    let mut conn = get_conn(store).await?;
    let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
    Ok(())
}

pub async fn push(store: &RedisStore, keys: &QueueKeys, payload: String) -> QueueResult<i64> {
    let mut conn = get_conn(store).await?;

    // MULTI / INCR / LPUSH / EXEC
    let (counter, inbox_len): (i64, i64) = redis::pipe()
        .atomic()
        .incr(&keys.counter, 1)
        .lpush(&keys.inbox, payload)
        .query_async(&mut *conn)
        .await?;

    debug!(inbox = %keys.inbox, counter, inbox_len, "Pushed element");
    Ok(counter)
}

pub async fn try_move(
    store: &RedisStore,
    keys: &QueueKeys,
    retention: OutboxRetention,
) -> QueueResult<Option<String>> {
    let mut conn = get_conn(store).await?;

    let moved: Option<String> = match retention.limit() {
        None => conn.rpoplpush(&keys.inbox, &keys.outbox).await?,
        Some(keep) => {
            let (start, stop) = trim_range(keep);
            let (moved,): (Option<String>,) = redis::pipe()
                .atomic()
                .rpoplpush(&keys.inbox, &keys.outbox)
                .ltrim(&keys.outbox, start, stop)
                .ignore()
                .query_async(&mut *conn)
                .await?;
            moved
        }
    };

    if moved.is_some() {
        debug!(inbox = %keys.inbox, outbox = %keys.outbox, "Moved element");
    }
    Ok(moved)
}

pub async fn blocking_move(
    store: &RedisStore,
    keys: &QueueKeys,
    retention: OutboxRetention,
    block: Duration,
) -> QueueResult<Option<String>> {
    let mut conn = get_conn(store).await?;

    // Server-side timeout has one second granularity; 0 would block forever.
    let block_secs = block.as_secs().max(1);
    let moved: Option<String> = redis::cmd("BRPOPLPUSH")
        .arg(&keys.inbox)
        .arg(&keys.outbox)
        .arg(block_secs)
        .query_async(&mut *conn)
        .await?;

    if moved.is_some() {
        if let Some(keep) = retention.limit() {
            let (start, stop) = trim_range(keep);
            let _: () = conn.ltrim(&keys.outbox, start, stop).await?;
        }
        debug!(inbox = %keys.inbox, outbox = %keys.outbox, "Moved element (blocking)");
    }
    Ok(moved)
}

pub async fn restore(store: &RedisStore, keys: &QueueKeys, raw: String) -> QueueResult<()> {
    let mut conn = get_conn(store).await?;

    // RPUSH puts it back at the tail, which is the next element to move.
    let _: () = redis::pipe()
        .atomic()
        .lrem(&keys.outbox, 1, &raw)
        .ignore()
        .rpush(&keys.inbox, &raw)
        .ignore()
        .query_async(&mut *conn)
        .await?;
    Ok(())
}

pub async fn len(store: &RedisStore, key: &str) -> QueueResult<i64> {
    let mut conn = get_conn(store).await?;
    let len: i64 = conn.llen(key).await?;
    Ok(len)
}

pub async fn counter(store: &RedisStore, key: &str) -> QueueResult<i64> {
    let mut conn = get_conn(store).await?;
    let value: Option<i64> = conn.get(key).await?;
    Ok(value.unwrap_or(0))
}

pub async fn trim(store: &RedisStore, key: &str, keep: usize) -> QueueResult<()> {
    let mut conn = get_conn(store).await?;
    let (start, stop) = trim_range(keep);
    let _: () = conn.ltrim(key, start, stop).await?;
    Ok(())
}
