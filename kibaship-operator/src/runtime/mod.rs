//! Controller runtime
//!
//! Turns store change events into keyed reconcile calls. Each controller
//! owns a work queue, a set of triggers mapping events to keys, and a
//! semaphore bounding how many keys reconcile at once.

pub mod predicate;
pub mod queue;

use async_trait::async_trait;
use kibaship_core::domain::meta::ObjectKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast::error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::{ReconcileError, Result};
use crate::store::{Store, WatchEvent};
use queue::{WorkItem, WorkQueue};

/// What to do with a key after a successful reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Done,
    RequeueAfter(Duration),
}

#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn reconcile(&self, key: &ObjectKey) -> Result<Action>;

    /// Every key this controller should look at after startup or a missed event
    async fn resync(&self) -> Result<Vec<ObjectKey>>;
}

type Trigger = Box<dyn Fn(&WatchEvent) -> Vec<ObjectKey> + Send + Sync>;

pub struct Controller {
    reconciler: Arc<dyn Reconciler>,
    triggers: Vec<Trigger>,
    concurrency: usize,
    timeout: Duration,
    requeue_delay: Duration,
}

impl Controller {
    pub fn new(reconciler: Arc<dyn Reconciler>) -> Self {
        Self {
            reconciler,
            triggers: Vec::new(),
            concurrency: 1,
            timeout: Duration::from_secs(30),
            requeue_delay: Duration::from_secs(5),
        }
    }

    /// Adds a trigger mapping store events to keys
    pub fn watches<F>(mut self, trigger: F) -> Self
    where
        F: Fn(&WatchEvent) -> Vec<ObjectKey> + Send + Sync + 'static,
    {
        self.triggers.push(Box::new(trigger));
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay before retrying a key whose dependency is not available yet
    pub fn requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    /// Runs until `shutdown` is cancelled
    pub async fn run(self, store: Store, shutdown: CancellationToken) {
        let name = self.reconciler.name();
        let queue = WorkQueue::new(shutdown.clone());

        // Subscribe before the initial listing so nothing falls in between
        let events = store.watch();
        enqueue_resync(&*self.reconciler, &queue).await;

        let pump = tokio::spawn(pump_events(
            events,
            self.triggers,
            Arc::clone(&self.reconciler),
            Arc::clone(&queue),
        ));

        info!("Controller {} started (concurrency {})", name, self.concurrency);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        loop {
            let permit = tokio::select! {
                () = shutdown.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some(item) = queue.next().await else { break };

            let worker = Worker {
                reconciler: Arc::clone(&self.reconciler),
                queue: Arc::clone(&queue),
                timeout: self.timeout,
                requeue_delay: self.requeue_delay,
            };
            let span = info_span!("reconcile", controller = name, key = %item.key);
            tokio::spawn(
                async move {
                    worker.process(item).await;
                    drop(permit);
                }
                .instrument(span),
            );
        }

        pump.abort();
        info!("Controller {} stopped", name);
    }
}

async fn enqueue_resync(reconciler: &dyn Reconciler, queue: &Arc<WorkQueue>) {
    match reconciler.resync().await {
        Ok(keys) => {
            debug!("{}: enqueueing {} keys", reconciler.name(), keys.len());
            for key in keys {
                queue.add(key).await;
            }
        }
        Err(e) => error!("{}: resync failed: {}", reconciler.name(), e),
    }
}

async fn pump_events(
    mut events: tokio::sync::broadcast::Receiver<WatchEvent>,
    triggers: Vec<Trigger>,
    reconciler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue>,
) {
    loop {
        let event = tokio::select! {
            () = queue.shutdown_token().cancelled() => return,
            event = events.recv() => event,
        };

        match event {
            Ok(event) => {
                for trigger in &triggers {
                    for key in trigger(&event) {
                        queue.add(key).await;
                    }
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("{}: missed {} events, resyncing", reconciler.name(), missed);
                enqueue_resync(&*reconciler, &queue).await;
            }
            Err(RecvError::Closed) => return,
        }
    }
}

struct Worker {
    reconciler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue>,
    timeout: Duration,
    requeue_delay: Duration,
}

impl Worker {
    async fn process(&self, item: WorkItem) {
        let WorkItem { key, cancel } = item;

        let outcome = tokio::select! {
            () = cancel.cancelled() => None,
            result = tokio::time::timeout(self.timeout, self.reconciler.reconcile(&key)) => {
                Some(result.unwrap_or(Err(ReconcileError::Timeout(self.timeout))))
            }
        };

        match outcome {
            None => debug!("Reconcile of {} superseded", key),
            Some(Ok(Action::Done)) => self.queue.forget(&key).await,
            Some(Ok(Action::RequeueAfter(delay))) => {
                self.queue.forget(&key).await;
                self.queue.add_after(key.clone(), delay);
            }
            Some(Err(ReconcileError::NotReady(what))) => {
                debug!("{} not available for {}, requeueing", what, key);
                self.queue.add_after(key.clone(), self.requeue_delay);
            }
            Some(Err(e)) if e.is_transient() => {
                let delay = self.queue.backoff(&key).await;
                warn!("Reconcile of {} failed: {}. Retrying in {:?}", key, e, delay);
                self.queue.add_after(key.clone(), delay);
            }
            Some(Err(e)) => error!("Reconcile of {} failed permanently: {}", key, e),
        }

        self.queue.done(&key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use kibaship_core::domain::meta::{Kind, ObjectMeta};
    use kibaship_core::domain::secret::Secret;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        fail_first: usize,
        fail_with: fn() -> ReconcileError,
    }

    impl Counting {
        fn new(fail_first: usize, fail_with: fn() -> ReconcileError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_first,
                fail_with,
            })
        }
    }

    fn not_ready() -> ReconcileError {
        ReconcileError::not_ready("dependency")
    }

    fn conflict() -> ReconcileError {
        StoreError::Conflict {
            kind: Kind::Secret,
            key: ObjectKey::new("ns", "a"),
        }
        .into()
    }

    fn misconfigured() -> ReconcileError {
        ReconcileError::config("bad spec")
    }

    #[async_trait]
    impl Reconciler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn reconcile(&self, _key: &ObjectKey) -> Result<Action> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err((self.fail_with)());
            }
            Ok(Action::Done)
        }

        async fn resync(&self) -> Result<Vec<ObjectKey>> {
            Ok(Vec::new())
        }
    }

    fn secret_trigger(event: &WatchEvent) -> Vec<ObjectKey> {
        if event.kind == Kind::Secret {
            event.key().into_iter().collect()
        } else {
            Vec::new()
        }
    }

    async fn wait_for(counter: &AtomicUsize, expected: usize) {
        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} calls, saw {}", expected, counter.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_store_events_drive_reconciles() {
        let store = Store::memory();
        let shutdown = CancellationToken::new();
        let reconciler = Counting::new(0, not_ready);

        let controller = Controller::new(reconciler.clone())
            .watches(secret_trigger)
            .concurrency(2);
        let handle = tokio::spawn(controller.run(store.clone(), shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        store
            .create(&Secret {
                metadata: ObjectMeta::new("ns", "a"),
                data: BTreeMap::new(),
            })
            .await
            .unwrap();

        wait_for(&reconciler.calls, 1).await;
        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_not_ready_is_retried() {
        let store = Store::memory();
        let shutdown = CancellationToken::new();
        let reconciler = Counting::new(2, not_ready);

        let controller = Controller::new(reconciler.clone())
            .watches(secret_trigger)
            .requeue_delay(Duration::from_millis(10));
        let handle = tokio::spawn(controller.run(store.clone(), shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        store
            .create(&Secret {
                metadata: ObjectMeta::new("ns", "a"),
                data: BTreeMap::new(),
            })
            .await
            .unwrap();

        wait_for(&reconciler.calls, 3).await;
        shutdown.cancel();
        handle.await.unwrap();
    }

    fn worker(reconciler: Arc<Counting>, queue: &Arc<WorkQueue>) -> Worker {
        Worker {
            reconciler,
            queue: Arc::clone(queue),
            timeout: Duration::from_secs(1),
            requeue_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_conflict_backs_off_and_reruns() {
        let queue = WorkQueue::new(CancellationToken::new());
        let reconciler = Counting::new(1, conflict);
        let worker = worker(reconciler.clone(), &queue);
        let key = ObjectKey::new("ns", "a");

        queue.add(key.clone()).await;
        worker.process(queue.next().await.unwrap()).await;
        assert_eq!(queue.failures(&key).await, 1);
        assert_eq!(queue.len().await, 0);

        // Back in the queue after the first backoff step
        let item = tokio::time::timeout(Duration::from_secs(2), queue.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.key, key);
        worker.process(item).await;

        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(queue.failures(&key).await, 0);
    }

    #[tokio::test]
    async fn test_config_error_is_not_retried() {
        let queue = WorkQueue::new(CancellationToken::new());
        let reconciler = Counting::new(1, misconfigured);
        let worker = worker(reconciler.clone(), &queue);
        let key = ObjectKey::new("ns", "a");

        queue.add(key.clone()).await;
        worker.process(queue.next().await.unwrap()).await;
        tokio::time::sleep(Duration::from_millis(700)).await;

        assert_eq!(queue.len().await, 0);
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 1);
    }
}
