//! In-process store for tests and single-process deployments.
//!
//! Lists are kept as `VecDeque`s whose front is the head (where pushes land)
//! and whose back is the tail (where moves take from). A single lock guards
//! every list and counter, so each primitive is atomic just like its Redis
//! counterpart. Clones share state.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::error::QueueResult;
use super::traits::{OutboxRetention, QueueKeys, QueueStore};

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    counters: HashMap<String, i64>,
}

/// In-memory [`QueueStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    pushed: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn move_now(&self, keys: &QueueKeys, retention: OutboxRetention) -> Option<String> {
        let mut state = self.state.lock();
        let raw = state.lists.get_mut(&keys.inbox)?.pop_back()?;
        let outbox = state.lists.entry(keys.outbox.clone()).or_default();
        outbox.push_front(raw.clone());
        if let Some(keep) = retention.limit() {
            outbox.truncate(keep);
        }
        Some(raw)
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }

    async fn push(&self, keys: &QueueKeys, payload: String) -> QueueResult<i64> {
        let counter = {
            let mut state = self.state.lock();
            let counter = state.counters.entry(keys.counter.clone()).or_insert(0);
            *counter += 1;
            let counter = *counter;
            state
                .lists
                .entry(keys.inbox.clone())
                .or_default()
                .push_front(payload);
            counter
        };
        self.pushed.notify_waiters();
        Ok(counter)
    }

    async fn try_move(
        &self,
        keys: &QueueKeys,
        retention: OutboxRetention,
    ) -> QueueResult<Option<String>> {
        Ok(self.move_now(keys, retention))
    }

    async fn blocking_move(
        &self,
        keys: &QueueKeys,
        retention: OutboxRetention,
        block: Duration,
    ) -> QueueResult<Option<String>> {
        let deadline = Instant::now() + block;
        loop {
            // Register before checking so a push in between is not missed.
            let notified = self.pushed.notified();
            if let Some(raw) = self.move_now(keys, retention) {
                return Ok(Some(raw));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn restore(&self, keys: &QueueKeys, raw: String) -> QueueResult<()> {
        {
            let mut state = self.state.lock();
            if let Some(outbox) = state.lists.get_mut(&keys.outbox) {
                if let Some(pos) = outbox.iter().position(|v| *v == raw) {
                    outbox.remove(pos);
                }
            }
            state
                .lists
                .entry(keys.inbox.clone())
                .or_default()
                .push_back(raw);
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn len(&self, key: &str) -> QueueResult<i64> {
        let state = self.state.lock();
        Ok(state.lists.get(key).map_or(0, |list| list.len() as i64))
    }

    async fn counter(&self, key: &str) -> QueueResult<i64> {
        let state = self.state.lock();
        Ok(state.counters.get(key).copied().unwrap_or(0))
    }

    async fn trim(&self, key: &str, keep: usize) -> QueueResult<()> {
        let mut state = self.state.lock();
        if let Some(list) = state.lists.get_mut(key) {
            list.truncate(keep);
        }
        Ok(())
    }
}
