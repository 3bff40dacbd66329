//! Error types shared by the store adapters, the identity resolver, the
//! counter service and the queue consumer.
//!
//! ## Error Cases
//! - `StoreUnavailable`: the shared store could not be reached or rejected the
//!   command. Recoverable by the caller (retry, backoff or surface).
//! - `IdentityGeneration`: the operating system random source failed. Not
//!   recoverable for the request that triggered it.
//! - `ItemProcessing`: a queue item handler failed. Contained by the consumer
//!   loop; the item is dropped.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the coordination layer.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The shared store could not be reached or failed the command.
    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// No random bytes could be drawn for a new visitor identity.
    #[error("Identity generation failed: {reason}")]
    IdentityGeneration { reason: String },

    /// A handler failed while processing a popped queue item.
    #[error("Item processing failed: {reason}")]
    ItemProcessing { reason: String },
}

impl Error {
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Returns `true` for failures caused by the shared store.
    pub const fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreUnavailable {
            reason: err.to_string(),
        }
    }
}
