//! Error types shared by every queue store and the queue handle.
//!
//! Stores map their internal failures onto these variants so that the
//! [`Queue`](crate::Queue) can surface them uniformly regardless of where
//! the lists actually live.

use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur while connecting to or operating on a queue.
///
/// # Examples
///
/// ```rust
/// use relayq::QueueError;
///
/// fn handle_error(err: QueueError) {
///     match err {
///         QueueError::Authentication(msg) => {
///             // Credential rejected, retrying will not help
///             eprintln!("Bad credential: {}", msg);
///         }
///         err if err.is_retryable() => {
///             eprintln!("Transient failure, try again: {}", err);
///         }
///         _ => {
///             eprintln!("Error: {}", err);
///         }
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum QueueError {
    /// The store could not be reached while connecting.
    #[error("connection error: {0}")]
    Connection(String),

    /// The store rejected the supplied credential.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The payload could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A moved element could not be decoded into the requested type.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Transport failure or aborted transaction during an operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// Invalid queue name, address or pool settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal failure, e.g. a poll task that ended without reporting.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Returns true if this error is potentially recoverable with a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::Connection(_) | QueueError::Backend(_))
    }

    pub(crate) fn serialization(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }

    pub(crate) fn deserialization(err: serde_json::Error) -> Self {
        QueueError::Deserialization(err.to_string())
    }
}

// Operations on an established pool report every Redis failure as a backend
// error. Connect-time classification lives in the Redis pool module.
#[cfg(feature = "redis")]
impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Backend(err.to_string())
    }
}
