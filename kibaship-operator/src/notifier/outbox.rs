//! Ordered background delivery
//!
//! Reconciles can be cancelled or time out at any await point. Handing the
//! event to a channel is synchronous, so once a reconcile decides to notify
//! the event is never lost to cancellation. A single task drains the
//! channel in order and performs the (possibly slow) delivery.

use async_trait::async_trait;
use kibaship_core::dto::event::DeploymentEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Notifier, NotifyError, deliver};

pub struct Outbox {
    tx: mpsc::UnboundedSender<DeploymentEvent>,
}

impl Outbox {
    /// Starts the delivery task in front of `inner`
    ///
    /// On shutdown the task delivers what is already queued and exits.
    pub fn spawn(inner: Arc<dyn Notifier>, shutdown: CancellationToken) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(drain(inner, rx, shutdown));
        (Arc::new(Self { tx }), handle)
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn notify(&self, event: &DeploymentEvent) -> Result<(), NotifyError> {
        self.tx.send(event.clone()).map_err(|_| NotifyError::Closed)
    }
}

async fn drain(
    inner: Arc<dyn Notifier>,
    mut rx: mpsc::UnboundedReceiver<DeploymentEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => return,
            },
        };
        deliver(&*inner, &event).await;
    }

    rx.close();
    let mut flushed = 0;
    while let Ok(event) = rx.try_recv() {
        deliver(&*inner, &event).await;
        flushed += 1;
    }
    debug!("Notification outbox stopped ({} flushed)", flushed);
}
