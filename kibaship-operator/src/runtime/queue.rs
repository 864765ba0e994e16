//! Keyed work queue
//!
//! A key is queued at most once and never handed to two workers at the
//! same time. An event for a key that is already running cancels that run
//! and marks the key dirty so it runs again once the worker finishes.

use kibaship_core::domain::meta::ObjectKey;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 60_000;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    active: HashMap<ObjectKey, CancellationToken>,
    dirty: HashSet<ObjectKey>,
    failures: HashMap<ObjectKey, u32>,
}

/// A unit of work handed to a worker
pub struct WorkItem {
    pub key: ObjectKey,
    /// Cancelled when a newer event arrives for the key or on shutdown
    pub cancel: CancellationToken,
}

pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    shutdown: CancellationToken,
}

impl WorkQueue {
    pub fn new(shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            shutdown,
        })
    }

    /// Enqueues a key, superseding any in-flight run for it
    pub async fn add(&self, key: ObjectKey) {
        let mut state = self.state.lock().await;

        if let Some(token) = state.active.get(&key) {
            token.cancel();
            state.dirty.insert(key);
            return;
        }

        if state.queued.insert(key.clone()) {
            state.pending.push_back(key);
            self.notify.notify_one();
        }
    }

    /// Enqueues a key after a delay unless the queue shuts down first
    pub fn add_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = queue.shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => queue.add(key).await,
            }
        });
    }

    /// Waits for the next key; returns `None` once shut down
    pub async fn next(&self) -> Option<WorkItem> {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(key) = state.pending.pop_front() {
                    state.queued.remove(&key);
                    let cancel = self.shutdown.child_token();
                    state.active.insert(key.clone(), cancel.clone());
                    return Some(WorkItem { key, cancel });
                }
            }

            tokio::select! {
                () = self.shutdown.cancelled() => return None,
                () = self.notify.notified() => {}
            }
        }
    }

    /// Releases a key; it is re-queued when events arrived while it ran
    pub async fn done(&self, key: &ObjectKey) {
        let mut state = self.state.lock().await;
        state.active.remove(key);

        if state.dirty.remove(key) && state.queued.insert(key.clone()) {
            state.pending.push_back(key.clone());
            self.notify.notify_one();
        }
    }

    /// Records a failure and returns the delay before the next attempt
    pub async fn backoff(&self, key: &ObjectKey) -> Duration {
        let mut state = self.state.lock().await;
        let failures = state.failures.entry(key.clone()).or_insert(0);
        *failures += 1;
        backoff_delay(*failures)
    }

    /// Clears the failure history of a key
    pub async fn forget(&self, key: &ObjectKey) {
        self.state.lock().await.failures.remove(key);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    #[cfg(test)]
    pub async fn failures(&self, key: &ObjectKey) -> u32 {
        self.state.lock().await.failures.get(key).copied().unwrap_or(0)
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// Exponential backoff starting at 500ms, capped at one minute
pub fn backoff_delay(failures: u32) -> Duration {
    let mut delay_ms = INITIAL_BACKOFF_MS;
    for _ in 1..failures {
        delay_ms = (delay_ms * 2).min(MAX_BACKOFF_MS);
    }
    Duration::from_millis(delay_ms)
}
