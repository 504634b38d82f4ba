use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

#[cfg(feature = "redis")]
use crate::backend::{RedisConfig, RedisStore};
use crate::backend::{
    OutboxRetention, QueueError, QueueKeys, QueueResult, QueueStats, QueueStore,
};
#[cfg(feature = "redis")]
use crate::config::{QueueConfig, DEFAULT_ADDRESS};
use crate::config::PollStrategy;

use super::poller::BlockingPoller;

/// A named FIFO queue shared by every process pointing at the same store.
///
/// Producers [`push`](Queue::push) onto the inbox; consumers [`pop`](Queue::pop)
/// or [`bpop`](Queue::bpop), which atomically move the oldest inbox element to
/// the outbox and hand it over. All coordination happens in the store, so the
/// handle is cheap to clone and safe to share between tasks.
///
/// Redis keys used for queue `name`:
/// - `<name>:inbox`
/// - `<name>:outbox`
/// - `<name>:stats:counter`
#[derive(Clone)]
pub struct Queue {
    name: String,
    keys: QueueKeys,
    store: Arc<dyn QueueStore>,
    poll: PollStrategy,
    retention: OutboxRetention,
}

impl Queue {
    /// Connect to queue `name` on the Redis server at `address`.
    ///
    /// Builds a connection pool owned by this handle, authenticates with
    /// `credential` if given and checks the server once before returning.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use relayq::{Queue, RedisConfig};
    ///
    /// let queue = Queue::connect("jobs", "localhost:6379", None, RedisConfig::with_idle(3, 100)).await?;
    /// queue.push(&"hello").await?;
    /// ```
    #[cfg(feature = "redis")]
    pub async fn connect(
        name: &str,
        address: &str,
        credential: Option<&str>,
        pool: RedisConfig,
    ) -> QueueResult<Self> {
        let mut builder = Queue::builder().name(name).address(address).pool(pool);
        if let Some(credential) = credential {
            builder = builder.credential(credential);
        }
        builder.build().await
    }

    /// Connect using a [`QueueConfig`].
    #[cfg(feature = "redis")]
    pub async fn from_config(config: QueueConfig) -> QueueResult<Self> {
        let QueueConfig {
            name,
            address,
            credential,
            pool,
            poll,
            retention,
        } = config;
        let mut builder = Queue::builder()
            .name(name)
            .address(address)
            .pool(pool)
            .poll_strategy(poll)
            .outbox_retention(retention);
        if let Some(credential) = credential {
            builder = builder.credential(credential);
        }
        builder.build().await
    }

    /// Create a builder for configuring a queue.
    pub fn builder() -> QueueBuilder {
        QueueBuilder::new()
    }

    /// Open queue `name` on an existing store after a liveness check.
    pub async fn with_store(name: &str, store: Arc<dyn QueueStore>) -> QueueResult<Self> {
        Queue::builder().name(name).store(store).build().await
    }

    fn new(
        name: String,
        store: Arc<dyn QueueStore>,
        poll: PollStrategy,
        retention: OutboxRetention,
    ) -> QueueResult<Self> {
        let keys = QueueKeys::new(&name)?;
        Ok(Self {
            name,
            keys,
            store,
            poll,
            retention,
        })
    }

    /// Get the queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the store keys of this queue.
    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    /// Get the blocking consumer strategy.
    pub fn poll_strategy(&self) -> PollStrategy {
        self.poll
    }

    /// Get the outbox retention policy.
    pub fn outbox_retention(&self) -> OutboxRetention {
        self.retention
    }

    /// Append `payload` to the inbox.
    ///
    /// The payload is encoded as JSON; the stats counter increment and the
    /// append run in one transaction, so they never diverge. Not retried.
    pub async fn push<T>(&self, payload: &T) -> QueueResult<()>
    where
        T: Serialize + ?Sized,
    {
        let encoded = serde_json::to_string(payload).map_err(QueueError::serialization)?;
        let counter = self.store.push(&self.keys, encoded).await?;
        debug!(queue = %self.name, counter, "Pushed element");
        Ok(())
    }

    /// Move the oldest inbox element to the outbox and decode it.
    ///
    /// Returns `Ok(None)` when the inbox is empty. If decoding fails the
    /// element has already been moved to the outbox.
    pub async fn pop<T>(&self) -> QueueResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.store.try_move(&self.keys, self.retention).await? {
            Some(raw) => {
                debug!(queue = %self.name, "Popped element");
                decode(&raw).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Like [`pop`](Queue::pop), writing into `destination`.
    ///
    /// Returns `Ok(false)` and leaves `destination` untouched when the inbox
    /// is empty. A decoding error leaves it untouched as well.
    pub async fn pop_into<T>(&self, destination: &mut T) -> QueueResult<bool>
    where
        T: DeserializeOwned,
    {
        match self.pop::<T>().await? {
            Some(value) => {
                *destination = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Wait until an element is available, then pop it.
    ///
    /// Polls according to the queue's [`PollStrategy`] on a dedicated task and
    /// never gives up on an empty inbox; store errors end the wait at once.
    /// Use [`bpop_timeout`](Queue::bpop_timeout) or
    /// [`bpop_until`](Queue::bpop_until) for a bounded wait.
    pub async fn bpop<T>(&self) -> QueueResult<T>
    where
        T: DeserializeOwned,
    {
        let mut handle = self.poller().spawn();
        let raw = handle.outcome().await?;
        debug!(queue = %self.name, "Blocking pop received element");
        decode(&raw)
    }

    /// Blocking pop giving up after `timeout`. Returns `Ok(None)` on timeout.
    pub async fn bpop_timeout<T>(&self, timeout: Duration) -> QueueResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.bpop_until(tokio::time::sleep(timeout)).await
    }

    /// Blocking pop giving up when `cancel` completes. Returns `Ok(None)` if it
    /// was cancelled before an element arrived.
    ///
    /// ```rust,ignore
    /// let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    /// let job: Option<Job> = queue.bpop_until(async { let _ = stop_rx.await; }).await?;
    /// ```
    pub async fn bpop_until<T, F>(&self, cancel: F) -> QueueResult<Option<T>>
    where
        T: DeserializeOwned,
        F: Future,
    {
        let mut handle = self.poller().spawn();

        let outcome = tokio::select! {
            biased;
            outcome = handle.outcome() => Some(outcome),
            _ = cancel => None,
        };

        let raw = match outcome {
            Some(outcome) => outcome?,
            // An element may have been delivered just as we were cancelled.
            None => match handle.cancel() {
                Some(raw) => raw,
                None => {
                    debug!(queue = %self.name, "Blocking pop cancelled");
                    return Ok(None);
                }
            },
        };
        decode(&raw).map(Some)
    }

    /// Stream of elements obtained by repeated blocking pops.
    ///
    /// The stream ends after yielding the first error.
    pub fn messages<T>(&self) -> BoxStream<'static, QueueResult<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        stream::unfold(Some(self.clone()), |queue| async move {
            let queue = queue?;
            match queue.bpop::<T>().await {
                Ok(value) => Some((Ok(value), Some(queue))),
                Err(err) => Some((Err(err), None)),
            }
        })
        .boxed()
    }

    /// Number of elements waiting in the inbox.
    pub async fn inbox_length(&self) -> QueueResult<i64> {
        self.store.len(&self.keys.inbox).await
    }

    /// Number of delivered elements retained in the outbox.
    pub async fn outbox_length(&self) -> QueueResult<i64> {
        self.store.len(&self.keys.outbox).await
    }

    /// Total number of successful pushes ever made to this queue.
    pub async fn pushed_total(&self) -> QueueResult<i64> {
        self.store.counter(&self.keys.counter).await
    }

    /// Inbox, outbox and counter, read one after the other.
    pub async fn stats(&self) -> QueueResult<QueueStats> {
        Ok(QueueStats {
            inbox: self.inbox_length().await?,
            outbox: self.outbox_length().await?,
            pushed_total: self.pushed_total().await?,
        })
    }

    /// Keep only the `keep` most recently delivered elements in the outbox.
    pub async fn trim_outbox(&self, keep: usize) -> QueueResult<()> {
        self.store.trim(&self.keys.outbox, keep).await?;
        debug!(queue = %self.name, keep, "Trimmed outbox");
        Ok(())
    }

    fn poller(&self) -> BlockingPoller {
        BlockingPoller::new(
            self.store.clone(),
            self.keys.clone(),
            self.retention,
            self.poll,
        )
    }
}

fn decode<T: DeserializeOwned>(raw: &str) -> QueueResult<T> {
    serde_json::from_str(raw).map_err(QueueError::deserialization)
}

/// Builder for creating a queue with custom configuration.
pub struct QueueBuilder {
    name: Option<String>,
    address: Option<String>,
    credential: Option<String>,
    #[cfg(feature = "redis")]
    pool: Option<RedisConfig>,
    store: Option<Arc<dyn QueueStore>>,
    poll: PollStrategy,
    retention: OutboxRetention,
}

impl QueueBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: None,
            address: None,
            credential: None,
            #[cfg(feature = "redis")]
            pool: None,
            store: None,
            poll: PollStrategy::default(),
            retention: OutboxRetention::default(),
        }
    }

    /// Set the queue name (used as key prefix).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the Redis address, `host:port` or a `redis://` URL.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the password used to authenticate.
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Set the Redis pool configuration.
    #[cfg(feature = "redis")]
    pub fn pool(mut self, pool: RedisConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Use an existing store instead of connecting to Redis.
    pub fn store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set how blocking pops wait for elements.
    pub fn poll_strategy(mut self, poll: PollStrategy) -> Self {
        self.poll = poll;
        self
    }

    /// Set the outbox retention policy.
    pub fn outbox_retention(mut self, retention: OutboxRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Build the queue.
    pub async fn build(self) -> QueueResult<Queue> {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| "default".to_string());
        // Reject bad settings before touching the network.
        QueueKeys::new(&name)?;
        self.poll.validate()?;

        let store = match &self.store {
            Some(store) => {
                store.ping().await?;
                store.clone()
            }
            None => self.connect_redis().await?,
        };

        info!(
            queue = %name,
            poll = ?self.poll,
            retention = ?self.retention,
            "Queue ready"
        );
        Queue::new(name, store, self.poll, self.retention)
    }

    #[cfg(feature = "redis")]
    async fn connect_redis(&self) -> QueueResult<Arc<dyn QueueStore>> {
        let address = self.address.as_deref().unwrap_or(DEFAULT_ADDRESS);
        let store = RedisStore::connect(
            address,
            self.credential.as_deref(),
            self.pool.unwrap_or_default(),
        )
        .await?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "redis"))]
    async fn connect_redis(&self) -> QueueResult<Arc<dyn QueueStore>> {
        let _ = (&self.address, &self.credential);
        Err(QueueError::Configuration(
            "no store configured and the `redis` feature is disabled".into(),
        ))
    }
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}
