//! Blocking consumption by polling the atomic move.
//!
//! Every blocking pop spawns its own poll loop. The loop reports exactly one
//! outcome, either the moved element or the error that stopped it, over two
//! one-shot channels; the waiting side takes whichever arrives first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::backend::{OutboxRetention, QueueError, QueueKeys, QueueResult, QueueStore};
use crate::config::PollStrategy;

/// Exponential delay between empty attempts. A fixed interval is a backoff
/// whose base equals its max.
struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        Self { current: base, max: max.max(base) }
    }

    fn for_strategy(strategy: &PollStrategy) -> Self {
        match *strategy {
            PollStrategy::Fixed(interval) => Self::new(interval, interval),
            PollStrategy::Backoff { base, max } => Self::new(base, max),
            // The store already waited inside the blocking move.
            PollStrategy::Native { .. } => Self::new(Duration::ZERO, Duration::ZERO),
        }
    }

    fn next(&mut self) -> Duration {
        let next = self.current;
        self.current = self.current.mul_f32(2.0).min(self.max);
        next
    }
}

/// Result of a single attempt.
#[derive(Debug)]
enum PollState {
    Polling,
    Found(String),
    Failed(QueueError),
}

impl From<QueueResult<Option<String>>> for PollState {
    fn from(result: QueueResult<Option<String>>) -> Self {
        match result {
            Ok(Some(raw)) => PollState::Found(raw),
            Ok(None) => PollState::Polling,
            Err(err) => PollState::Failed(err),
        }
    }
}

pub(crate) struct BlockingPoller {
    store: Arc<dyn QueueStore>,
    keys: QueueKeys,
    retention: OutboxRetention,
    strategy: PollStrategy,
}

impl BlockingPoller {
    pub(crate) fn new(
        store: Arc<dyn QueueStore>,
        keys: QueueKeys,
        retention: OutboxRetention,
        strategy: PollStrategy,
    ) -> Self {
        Self {
            store,
            keys,
            retention,
            strategy,
        }
    }

    /// Start the poll loop on its own task.
    pub(crate) fn spawn(self) -> PollHandle {
        let (found_tx, found_rx) = oneshot::channel();
        let (failed_tx, failed_rx) = oneshot::channel();
        let store = self.store.clone();
        let keys = self.keys.clone();

        tokio::spawn(self.run(found_tx, failed_tx));

        PollHandle {
            found: found_rx,
            failed: failed_rx,
            store,
            keys,
        }
    }

    async fn attempt(&self) -> PollState {
        let result = match self.strategy {
            PollStrategy::Native { block } => {
                self.store
                    .blocking_move(&self.keys, self.retention, block)
                    .await
            }
            _ => self.store.try_move(&self.keys, self.retention).await,
        };
        result.into()
    }

    async fn run(
        self,
        mut found_tx: oneshot::Sender<String>,
        failed_tx: oneshot::Sender<QueueError>,
    ) {
        let mut backoff = Backoff::for_strategy(&self.strategy);
        let mut attempts: u64 = 0;

        loop {
            if found_tx.is_closed() {
                debug!(inbox = %self.keys.inbox, attempts, "Consumer gone, stopping poll loop");
                return;
            }
            attempts += 1;

            match self.attempt().await {
                PollState::Polling => {
                    let delay = backoff.next();
                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                        continue;
                    }
                    tokio::select! {
                        _ = found_tx.closed() => {
                            debug!(inbox = %self.keys.inbox, attempts, "Consumer gone, stopping poll loop");
                            return;
                        }
                        _ = sleep(delay) => {}
                    }
                }
                PollState::Found(raw) => {
                    debug!(inbox = %self.keys.inbox, attempts, "Poll loop found element");
                    if let Err(raw) = found_tx.send(raw) {
                        warn!(
                            inbox = %self.keys.inbox,
                            "Element moved after its consumer left, restoring it to the inbox"
                        );
                        if let Err(e) = self.store.restore(&self.keys, raw).await {
                            error!(inbox = %self.keys.inbox, error = %e, "Failed to restore element; it remains in the outbox");
                        }
                    }
                    return;
                }
                PollState::Failed(err) => {
                    error!(inbox = %self.keys.inbox, attempts, error = %err, "Poll loop failed");
                    let _ = failed_tx.send(err);
                    return;
                }
            }
        }
    }
}

/// Waiting side of a spawned poll loop.
///
/// Dropping the handle stops the loop at its next attempt. An element that
/// was delivered into the handle but never read is restored to the inbox.
pub(crate) struct PollHandle {
    found: oneshot::Receiver<String>,
    failed: oneshot::Receiver<QueueError>,
    store: Arc<dyn QueueStore>,
    keys: QueueKeys,
}

impl PollHandle {
    /// Wait for the loop to find an element or fail, whichever comes first.
    pub(crate) async fn outcome(&mut self) -> QueueResult<String> {
        tokio::select! {
            Ok(raw) = &mut self.found => Ok(raw),
            Ok(err) = &mut self.failed => Err(err),
            else => Err(QueueError::Internal(
                "poll task ended without an outcome".into(),
            )),
        }
    }

    /// Stop the loop. Returns an element it delivered in the meantime, if any;
    /// after this call the loop can no longer deliver.
    pub(crate) fn cancel(&mut self) -> Option<String> {
        self.found.close();
        self.found.try_recv().ok()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        let Some(raw) = self.cancel() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(inbox = %self.keys.inbox, "Dropped a delivered element outside a runtime; it remains in the outbox");
            return;
        };
        warn!(inbox = %self.keys.inbox, "Blocking pop abandoned with an element in hand, restoring it to the inbox");
        let store = self.store.clone();
        let keys = self.keys.clone();
        runtime.spawn(async move {
            if let Err(e) = store.restore(&keys, raw).await {
                error!(inbox = %keys.inbox, error = %e, "Failed to restore element; it remains in the outbox");
            }
        });
    }
}
