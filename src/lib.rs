//! # relayq
//!
//! A FIFO work queue shared by any number of processes and hosts, coordinated
//! entirely through the atomic list primitives of a Redis server.
//!
//! - [`Queue::push`] encodes a value as JSON and, in one transaction, bumps the
//!   queue's push counter and prepends the value to `<name>:inbox`.
//! - [`Queue::pop`] atomically moves the oldest inbox element to
//!   `<name>:outbox` and returns it.
//! - [`Queue::bpop`] keeps attempting that move on a background task until an
//!   element shows up; bounded variants take a timeout or a cancel future.
//!
//! No local locks are involved: two consumers racing for one element can never
//! both receive it, because the move is atomic on the server.
//!
//! ```rust,ignore
//! use relayq::{Queue, RedisConfig};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Resize { image: String, width: u32 }
//!
//! let queue = Queue::connect("images", "localhost:6379", None, RedisConfig::with_idle(3, 100)).await?;
//! queue.push(&Resize { image: "cat.png".into(), width: 640 }).await?;
//!
//! let job: Resize = queue.bpop().await?;
//! ```
//!
//! The outbox is a delivery log and grows without bound unless an
//! [`OutboxRetention`] policy is set or [`Queue::trim_outbox`] is called.

pub mod backend;
pub mod config;
pub mod queue;

pub use backend::{
    MemoryStore, OutboxRetention, QueueError, QueueKeys, QueueResult, QueueStats, QueueStore,
};
#[cfg(feature = "redis")]
pub use backend::{RedisConfig, RedisStore};
#[cfg(feature = "redis")]
pub use config::QueueConfig;
pub use config::{PollStrategy, DEFAULT_POLL_INTERVAL};
pub use queue::{Queue, QueueBuilder};
