//! Store abstraction layer for relayq.
//!
//! This module provides the trait a queue is built on and its implementations.
//! The default store is Redis, but anything offering the same atomic list
//! primitives can back a queue.
//!
//! # Architecture
//!
//! - [`QueueStore`]: the atomic primitives (transactional push, move, length)
//! - [`QueueKeys`]: the store keys derived from a queue name
//! - [`QueueError`]: store-agnostic error type
//! - [`MemoryStore`]: in-process store for tests and single-process use
//! - [`RedisStore`]: pooled Redis store (feature `redis`)
//!
//! # Using a Custom Store
//!
//! ```rust,ignore
//! use relayq::Queue;
//! use std::sync::Arc;
//!
//! let queue = Queue::builder()
//!     .name("jobs")
//!     .store(Arc::new(MyStore::new()))
//!     .build()
//!     .await?;
//! ```

mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
mod traits;

pub use error::{QueueError, QueueResult};
pub use traits::{OutboxRetention, QueueKeys, QueueStats, QueueStore};

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConfig, RedisStore};
