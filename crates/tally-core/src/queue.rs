//! Work-queue consumer.
//!
//! A [`QueueConsumer`] repeatedly pops items from a named queue in the shared
//! store and hands each one to a handler. Many consumers, in many processes,
//! may pop from the same queue; the store's atomic pop guarantees each item
//! reaches exactly one of them.
//!
//! ## Delivery
//!
//! An item is removed from the store the moment it is popped. If the handler
//! fails, the failure is logged and the item is dropped; it is never
//! requeued.
//!
//! ## Shutdown
//!
//! The loop checks its [`CancellationToken`] before every pop. Each pop is
//! bounded by the configured pop timeout, so a cancelled consumer exits within
//! one pop-timeout interval. A pop is never abandoned mid-call: the store may
//! already have removed the element, and dropping the call would lose it.
//! Backoff sleeps, which hold no item, are interrupted immediately.

use crate::{Error, Store};
use bytes::Bytes;
use core::{fmt, time::Duration};
use tokio_util::sync::CancellationToken;

/// Default bound on a single blocking pop.
pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_secs(1);

/// Exponential delay between retries after the store fails a pop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to wait now and doubles the next one, up to `max`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub const fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(5))
    }
}

/// Totals reported when a consumer loop exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Items the handler accepted.
    pub processed: u64,
    /// Items the handler rejected. These were dropped.
    pub failed: u64,
    /// Pops the store failed.
    pub store_errors: u64,
}

/// Pops and processes items from a queue until cancelled.
#[derive(Clone, Debug)]
pub struct QueueConsumer<S> {
    store: S,
    pop_timeout: Duration,
    backoff: Backoff,
    on_store_error: Option<fn(&Error)>,
}

impl<S: Store> QueueConsumer<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            pop_timeout: DEFAULT_POP_TIMEOUT,
            backoff: Backoff::default(),
            on_store_error: None,
        }
    }

    #[must_use]
    pub fn with_pop_timeout(mut self, pop_timeout: Duration) -> Self {
        self.pop_timeout = pop_timeout;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Registers a callback run on every failed pop, before backing off.
    #[must_use]
    pub fn with_store_error_hook(mut self, hook: fn(&Error)) -> Self {
        self.on_store_error = Some(hook);
        self
    }

    /// Runs the consumer loop over `queue` until `cancel` fires.
    ///
    /// `on_item` is called synchronously for every popped payload; an item in
    /// flight when `cancel` fires is finished before the loop exits. Handler
    /// errors and store errors never end the loop.
    pub async fn run<F, E>(
        &self,
        queue: &str,
        mut on_item: F,
        cancel: CancellationToken,
    ) -> ConsumerStats
    where
        F: FnMut(Bytes) -> Result<(), E>,
        E: fmt::Display,
    {
        let mut backoff = self.backoff;
        let mut stats = ConsumerStats::default();

        tracing::debug!(queue, pop_timeout = ?self.pop_timeout, "Consumer started");

        while !cancel.is_cancelled() {
            match self.store.blocking_pop(queue, Some(self.pop_timeout)).await {
                Ok(Some(payload)) => {
                    backoff.reset();
                    match on_item(payload) {
                        Ok(()) => stats.processed += 1,
                        Err(e) => {
                            stats.failed += 1;
                            let err = Error::ItemProcessing {
                                reason: e.to_string(),
                            };
                            tracing::warn!(queue, error = %err, "Dropping item");
                        }
                    }
                }
                // Timed out with the store reachable.
                Ok(None) => backoff.reset(),
                Err(e) => {
                    stats.store_errors += 1;
                    if let Some(hook) = self.on_store_error {
                        hook(&e);
                    }
                    let delay = backoff.next_delay();
                    tracing::warn!(queue, error = %e, ?delay, "Pop failed, backing off");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::debug!(
            queue,
            processed = stats.processed,
            failed = stats.failed,
            store_errors = stats.store_errors,
            "Consumer stopped"
        );
        stats
    }
}
