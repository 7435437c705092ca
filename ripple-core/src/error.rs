//! Error types for the Ripple runtime.
//!
//! Most failures in a reactive graph are observed through notifications
//! rather than return values. The variants here cover the few places where
//! the runtime reports a failure directly to the caller: unrouted middleware
//! errors, writes to derived state, and work that needs a tokio runtime.

use std::sync::Arc;

use crate::reactive::EntityId;

/// Boxed error returned by middleware and other user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shareable error used as an event payload.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the crate.
pub type Result<T, E = RippleError> = std::result::Result<T, E>;

/// Errors reported by the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RippleError {
    /// A derived state was written to directly.
    #[error("state {id} is computed and cannot be written to")]
    ReadOnlyState { id: EntityId },

    /// A middleware failed and no error event was registered for it.
    #[error("middleware failed: {0}")]
    Middleware(#[source] SharedError),

    /// A timer or asynchronous run was requested outside a tokio runtime.
    #[error("no tokio runtime is available on this thread")]
    NoRuntime,

    /// A persisted value could not be decoded.
    #[error("invalid persisted value under key `{key}`")]
    InvalidPersistedValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded for persistence.
    #[error("failed to serialize value for key `{key}`")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<BoxError> for RippleError {
    fn from(error: BoxError) -> Self {
        Self::Middleware(Arc::from(error))
    }
}
