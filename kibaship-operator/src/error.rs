//! Error types for reconciliation

use std::time::Duration;
use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for reconcile operations
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors that can end a reconciliation
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Object store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The resource is misconfigured; retrying will not help
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A dependency the reconciler needs does not exist yet
    #[error("{0} not available yet")]
    NotReady(String),

    /// The reconciliation exceeded its time budget
    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),
}

impl ReconcileError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn not_ready(what: impl Into<String>) -> Self {
        Self::NotReady(what.into())
    }

    /// Check if a retry could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(StoreError::Serialization(_)) => false,
            Self::Store(_) => true,
            Self::Config(_) => false,
            Self::NotReady(_) => true,
            Self::Timeout(_) => true,
        }
    }
}
