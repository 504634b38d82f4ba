//! Core traits for relayq queue stores.
//!
//! A store exposes the handful of atomic list primitives the queue protocol is
//! built on. Every method must be atomic at the store: correctness across
//! processes and hosts depends on it, never on local locking.
//!
//! # Example: Implementing a Custom Store
//!
//! ```rust,ignore
//! use relayq::backend::{QueueStore, QueueKeys, OutboxRetention, QueueResult};
//! use async_trait::async_trait;
//!
//! pub struct MyStore { /* ... */ }
//!
//! #[async_trait]
//! impl QueueStore for MyStore {
//!     // Implement the primitives...
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::{QueueError, QueueResult};

// ============================================================================
// Domain Types
// ============================================================================

/// The three store keys derived from a queue name.
///
/// No creation step exists: the keys come into existence the first time the
/// store writes to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    /// `<name>:inbox`, elements pushed but not yet delivered
    pub inbox: String,
    /// `<name>:outbox`, elements already handed to a consumer
    pub outbox: String,
    /// `<name>:stats:counter`, total number of successful pushes
    pub counter: String,
}

impl QueueKeys {
    /// Derive the keys for `name`. Empty names are rejected.
    pub fn new(name: &str) -> QueueResult<Self> {
        if name.is_empty() {
            return Err(QueueError::Configuration(
                "queue name must not be empty".into(),
            ));
        }
        Ok(Self {
            inbox: format!("{}:inbox", name),
            outbox: format!("{}:outbox", name),
            counter: format!("{}:stats:counter", name),
        })
    }
}

/// What happens to the outbox after each successful move.
///
/// The outbox doubles as a delivery audit log. Left `Unbounded` it grows
/// forever; `KeepLast(n)` keeps only the `n` most recently delivered elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutboxRetention {
    /// Never trim the outbox
    #[default]
    Unbounded,
    /// Keep the `n` newest delivered elements
    KeepLast(usize),
}

impl OutboxRetention {
    pub(crate) fn limit(&self) -> Option<usize> {
        match self {
            OutboxRetention::Unbounded => None,
            OutboxRetention::KeepLast(n) => Some(*n),
        }
    }
}

/// Point-in-time counts for a queue.
///
/// The values are read with separate round trips, so concurrent producers and
/// consumers may make them mutually inconsistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Elements waiting in the inbox
    pub inbox: i64,
    /// Elements delivered and still retained in the outbox
    pub outbox: i64,
    /// Total successful pushes ever made
    pub pushed_total: i64,
}

// ============================================================================
// QueueStore Trait
// ============================================================================

/// Atomic primitives backing a [`Queue`](crate::Queue).
///
/// # Implementation Notes
///
/// - Implementations handle their own connection pooling and must release
///   connections on every exit path
/// - `push` must increment the counter and append to the inbox as one
///   all-or-nothing unit
/// - `try_move` must remove the tail of the inbox and prepend it to the outbox
///   as one unit, so two concurrent callers never receive the same element
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Liveness check.
    async fn ping(&self) -> QueueResult<()>;

    /// Increment the stats counter and prepend `payload` to the inbox in one
    /// transaction. Returns the counter value after the increment.
    async fn push(&self, keys: &QueueKeys, payload: String) -> QueueResult<i64>;

    /// Move the oldest inbox element to the outbox and return it, or `None`
    /// if the inbox is empty. Applies `retention` to the outbox atomically
    /// with the move.
    async fn try_move(
        &self,
        keys: &QueueKeys,
        retention: OutboxRetention,
    ) -> QueueResult<Option<String>>;

    /// Like [`try_move`](Self::try_move), but waits up to `block` for an
    /// element to arrive using the store's native blocking primitive.
    async fn blocking_move(
        &self,
        keys: &QueueKeys,
        retention: OutboxRetention,
        block: Duration,
    ) -> QueueResult<Option<String>>;

    /// Undo a move whose consumer went away: remove one occurrence of `raw`
    /// from the outbox and append it at the oldest end of the inbox.
    async fn restore(&self, keys: &QueueKeys, raw: String) -> QueueResult<()>;

    /// Length of the list stored at `key` (0 when absent).
    async fn len(&self, key: &str) -> QueueResult<i64>;

    /// Current value of the counter at `key` (0 when absent).
    async fn counter(&self, key: &str) -> QueueResult<i64>;

    /// Keep only the `keep` newest elements of the list at `key`.
    async fn trim(&self, key: &str, keep: usize) -> QueueResult<()>;
}
