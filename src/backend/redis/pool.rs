//! Redis connection pool management.

use bb8_redis::bb8::{ManageConnection, Pool};
use bb8_redis::RedisConnectionManager;
use redis::{ConnectionInfo, IntoConnectionInfo};
use std::time::Duration;
use tokio::time::sleep;

use crate::backend::error::{QueueError, QueueResult};

/// Configuration for Redis connection pool.
#[derive(Debug, Clone, Copy)]
pub struct RedisConfig {
    /// Maximum number of connections the pool keeps open
    pub max_size: u32,
    /// Minimum number of idle connections (0 = open lazily)
    pub min_idle: u32,
    /// Connection timeout
    pub conn_timeout: Duration,
    /// Idle connection timeout
    pub idle_timeout: Duration,
    /// Maximum connection lifetime
    pub max_lifetime: Duration,
    /// PING every connection as it is borrowed from the pool
    pub test_on_check_out: bool,
    /// Extra liveness checks attempted on connect after a transient failure
    pub connect_retries: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: 0,
            conn_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(1800),
            test_on_check_out: true,
            connect_retries: 0,
        }
    }
}

impl RedisConfig {
    /// Pool sized by the number of connections kept around and how long an
    /// unused one survives.
    ///
    /// `max_idle` becomes the pool's `max_size`, a cap on all connections,
    /// busy ones included. A consumer using [`PollStrategy::Native`] holds a
    /// connection for a whole blocking slice, so leave room above the number
    /// of native consumers or pushes will wait for a slice to end.
    ///
    /// [`PollStrategy::Native`]: crate::PollStrategy::Native
    pub fn with_idle(max_idle: u32, idle_timeout_secs: u64) -> Self {
        Self {
            max_size: max_idle,
            idle_timeout: Duration::from_secs(idle_timeout_secs),
            ..Self::default()
        }
    }

    fn validate(&self) -> QueueResult<()> {
        if self.max_size == 0 {
            return Err(QueueError::Configuration("max_size must be > 0".into()));
        }
        if self.min_idle > self.max_size {
            return Err(QueueError::Configuration(format!(
                "min_idle ({}) must not exceed max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        Ok(())
    }
}

/// Resolve `address` (`host:port` or a `redis://` URL) and attach the
/// credential, if any. An empty credential means no authentication.
pub(crate) fn connection_info(
    address: &str,
    credential: Option<&str>,
) -> QueueResult<ConnectionInfo> {
    let url = if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    };

    let mut info = url.as_str().into_connection_info().map_err(|e| {
        QueueError::Configuration(format!("invalid redis address: {} - {}", redacted(&url), e))
    })?;

    if let Some(password) = credential.filter(|c| !c.is_empty()) {
        info.redis.password = Some(password.to_string());
    }
    Ok(info)
}

/// Check the server once (plus retries), then build a pool whose
/// connections are validated on every checkout.
pub async fn create_redis_pool(
    address: &str,
    credential: Option<&str>,
    config: RedisConfig,
) -> QueueResult<Pool<RedisConnectionManager>> {
    config.validate()?;

    tracing::info!(
        "Redis pool: address={}, max_size={}, min_idle={}, timeouts: conn={}s idle={}s life={}s",
        redacted(address),
        config.max_size,
        config.min_idle,
        config.conn_timeout.as_secs(),
        config.idle_timeout.as_secs(),
        config.max_lifetime.as_secs()
    );

    let info = connection_info(address, credential)?;
    let manager = RedisConnectionManager::new(info).map_err(|e| {
        QueueError::Configuration(format!("invalid redis address: {} - {}", redacted(address), e))
    })?;

    // A dedicated connection gives a precise error; a failed checkout from
    // the pool would only report a timeout.
    let checker = &manager;
    retry_async(config.connect_retries, Duration::from_millis(400), || async {
        let mut conn = checker.connect().await.map_err(classify_connect_error)?;
        checker
            .is_valid(&mut conn)
            .await
            .map_err(classify_connect_error)
    })
    .await?;

    let min_idle = if config.min_idle == 0 {
        None
    } else {
        Some(config.min_idle)
    };

    Pool::builder()
        .max_size(config.max_size)
        .min_idle(min_idle)
        .connection_timeout(config.conn_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
        .test_on_check_out(config.test_on_check_out)
        .build(manager)
        .await
        .map_err(classify_connect_error)
}

/// Map a failure seen while establishing connectivity.
fn classify_connect_error(err: redis::RedisError) -> QueueError {
    let rejected = err.kind() == redis::ErrorKind::AuthenticationFailed
        || matches!(err.code(), Some("WRONGPASS") | Some("NOAUTH"));
    if rejected {
        QueueError::Authentication(err.to_string())
    } else {
        QueueError::Connection(err.to_string())
    }
}

/// Async retry with exponential backoff. Non-retryable errors return at once.
async fn retry_async<F, Fut, T>(max_retries: u32, base_delay: Duration, mut f: F) -> QueueResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = QueueResult<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_retries && e.is_retryable() => {
                attempt += 1;
                let delay = base_delay.mul_f32(2f32.powi((attempt - 1) as i32));
                tracing::warn!(
                    "retry {}/{} after error: {e:#}. sleeping {:?}",
                    attempt,
                    max_retries,
                    delay
                );
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Redact credentials in logs
pub(crate) fn redacted(url: &str) -> String {
    if let Some(idx) = url.find('@') {
        let head = &url[..idx];
        if let Some(scheme_end) = head.find("://") {
            let scheme_end = scheme_end + 3;
            return format!("{}***:***{}", &url[..scheme_end], &url[idx..]);
        }
    }
    url.to_string()
}
