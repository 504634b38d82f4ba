//! Connection and consumption settings.

#[cfg(feature = "redis")]
use std::fmt;
use std::time::Duration;

use crate::backend::{QueueError, QueueResult};
#[cfg(feature = "redis")]
use crate::backend::{OutboxRetention, RedisConfig};

/// Interval between attempts of the default blocking consumer.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:6379";

/// How a blocking consumer waits for the inbox to become non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStrategy {
    /// Attempt a move, sleep a fixed interval, repeat.
    Fixed(Duration),
    /// Like `Fixed`, doubling the sleep after each empty attempt up to `max`.
    Backoff { base: Duration, max: Duration },
    /// Use the store's blocking move, waiting at most `block` per attempt.
    /// Cancellation is noticed between attempts. On Redis each waiting
    /// consumer holds a pooled connection for the whole attempt.
    Native { block: Duration },
}

impl PollStrategy {
    /// Reject waits that would turn a blocking pop into a busy loop.
    pub fn validate(&self) -> QueueResult<()> {
        match *self {
            PollStrategy::Fixed(interval) if interval.is_zero() => Err(
                QueueError::Configuration("poll interval must be greater than zero".into()),
            ),
            PollStrategy::Backoff { base, .. } if base.is_zero() => Err(
                QueueError::Configuration("backoff base must be greater than zero".into()),
            ),
            PollStrategy::Native { block } if block.is_zero() => Err(
                QueueError::Configuration("native block must be greater than zero".into()),
            ),
            _ => Ok(()),
        }
    }
}

impl Default for PollStrategy {
    fn default() -> Self {
        PollStrategy::Fixed(DEFAULT_POLL_INTERVAL)
    }
}

/// Everything needed to connect a queue to Redis.
#[cfg(feature = "redis")]
#[derive(Clone)]
pub struct QueueConfig {
    /// Queue name, prefix of every key
    pub name: String,
    /// `host:port` or a `redis://` URL
    pub address: String,
    /// Password sent with AUTH; `None` skips authentication
    pub credential: Option<String>,
    /// Connection pool settings
    pub pool: RedisConfig,
    /// Blocking consumer strategy
    pub poll: PollStrategy,
    /// Outbox retention policy
    pub retention: OutboxRetention,
}

#[cfg(feature = "redis")]
impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: DEFAULT_ADDRESS.to_string(),
            credential: None,
            pool: RedisConfig::default(),
            poll: PollStrategy::default(),
            retention: OutboxRetention::default(),
        }
    }

    /// Read connection settings from the environment:
    ///
    /// - `RELAYQ_ADDRESS` (default `127.0.0.1:6379`)
    /// - `RELAYQ_PASSWORD`
    /// - `RELAYQ_MAX_IDLE`
    /// - `RELAYQ_IDLE_TIMEOUT_SECS`
    /// - `RELAYQ_CONNECT_RETRIES`
    pub fn from_env(name: impl Into<String>) -> QueueResult<Self> {
        Self::from_lookup(name, |key| std::env::var(key).ok())
    }

    fn from_lookup<F>(name: impl Into<String>, lookup: F) -> QueueResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(name);
        if let Some(address) = lookup("RELAYQ_ADDRESS") {
            config.address = address;
        }
        config.credential = lookup("RELAYQ_PASSWORD").filter(|p| !p.is_empty());
        if let Some(max_idle) = lookup("RELAYQ_MAX_IDLE") {
            config.pool.max_size = parse_var("RELAYQ_MAX_IDLE", &max_idle)?;
        }
        if let Some(secs) = lookup("RELAYQ_IDLE_TIMEOUT_SECS") {
            let secs = parse_var("RELAYQ_IDLE_TIMEOUT_SECS", &secs)?;
            config.pool.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = lookup("RELAYQ_CONNECT_RETRIES") {
            config.pool.connect_retries = parse_var("RELAYQ_CONNECT_RETRIES", &retries)?;
        }
        Ok(config)
    }
}

#[cfg(feature = "redis")]
fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> QueueResult<T> {
    value.trim().parse().map_err(|_| {
        QueueError::Configuration(format!("{} is not a valid number: {:?}", key, value))
    })
}

#[cfg(feature = "redis")]
impl fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConfig")
            .field("name", &self.name)
            .field("address", &crate::backend::redis::redacted(&self.address))
            .field("credential", &self.credential.as_ref().map(|_| "***"))
            .field("pool", &self.pool)
            .field("poll", &self.poll)
            .field("retention", &self.retention)
            .finish()
    }
}
