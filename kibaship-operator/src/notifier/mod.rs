//! Lifecycle notifications
//!
//! Delivery is best-effort: callers log failures and carry on, a broken
//! webhook never blocks or fails a reconciliation.

pub mod http;
pub mod outbox;

use async_trait::async_trait;
use kibaship_core::dto::event::DeploymentEvent;
use thiserror::Error;

pub use http::HttpNotifier;
pub use outbox::Outbox;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook rejected event (status {0})")]
    Rejected(u16),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid signing key")]
    InvalidKey,

    #[error("notification outbox is closed")]
    Closed,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &DeploymentEvent) -> Result<(), NotifyError>;
}

/// Drops every event; used when no webhook is configured
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: &DeploymentEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Delivers and logs; never propagates failure
pub async fn deliver(notifier: &dyn Notifier, event: &DeploymentEvent) {
    if let Err(e) = notifier.notify(event).await {
        tracing::warn!(
            event_type = %event.event_type,
            deployment = %event.deployment_ref.name,
            "Failed to deliver notification: {}",
            e
        );
    }
}
