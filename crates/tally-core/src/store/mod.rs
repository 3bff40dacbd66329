//! Client contract for the shared key-value store.
//!
//! Every piece of durable state (visit counters and the work queue) lives in
//! the store. Serving and worker processes never talk to each other; they rely
//! on the store's primitives being atomic:
//!
//! - `incr` is serialized per key, so concurrent increments are never lost or
//!   duplicated.
//! - `blocking_pop` hands each queued element to at most one caller.
//!
//! ## Adapters
//!
//! - [`RedisStore`] - production adapter over a Redis connection manager.
//! - [`MemoryStore`] - in-process adapter with the same semantics, used by
//!   tests and benches.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use core::time::Duration;
use std::sync::Arc;

/// Atomic primitives consumed from the shared store.
///
/// Implementations must be safe to share across many concurrent request tasks.
#[async_trait]
pub trait Store: Send + Sync {
    /// Increments the integer at `key` by one and returns the new value.
    ///
    /// A missing key is treated as `0`, so the first increment returns `1`.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Sets or refreshes the time-to-live of `key`.
    ///
    /// Sub-second precision is not guaranteed; adapters may round to whole
    /// seconds.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Removes and returns the oldest element of `queue`.
    ///
    /// Suspends until an element is available or `timeout` elapses. A `None`
    /// timeout waits indefinitely. Returns `Ok(None)` on timeout.
    async fn blocking_pop(&self, queue: &str, timeout: Option<Duration>)
    -> Result<Option<Bytes>>;

    /// Appends `payload` to `queue`.
    async fn push(&self, queue: &str, payload: Bytes) -> Result<()>;

    /// Round-trips to the store to verify liveness.
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl<T: Store + ?Sized> Store for Arc<T> {
    async fn incr(&self, key: &str) -> Result<i64> {
        (**self).incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        (**self).expire(key, ttl).await
    }

    async fn blocking_pop(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Bytes>> {
        (**self).blocking_pop(queue, timeout).await
    }

    async fn push(&self, queue: &str, payload: Bytes) -> Result<()> {
        (**self).push(queue, payload).await
    }

    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }
}
