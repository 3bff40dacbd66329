//! Per-visitor and global visit counters.
//!
//! Both counters live in the shared store so that every serving process sees
//! the same values. The session counter expires after [`SESSION_TTL`] of
//! inactivity; the global counter never expires.
//!
//! The two increments are independent atomic operations. There is no
//! transaction spanning them: a failure between the two leaves the counters
//! out of step for that request, and callers must not rely on any
//! cross-counter consistency.

use crate::{Result, Store};
use core::time::Duration;

/// Key of the counter shared by every visitor and every serving process.
pub const GLOBAL_KEY: &str = "global:count";

/// Inactivity window after which a visitor's session counter is forgotten.
pub const SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Store key holding the session counter for `identity`.
pub fn session_key(identity: &str) -> String {
    format!("sess:{identity}:count")
}

/// Counter values observed by a single visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Visit {
    pub session_count: i64,
    pub global_count: i64,
}

/// Records visits against the shared store.
#[derive(Clone, Debug)]
pub struct CounterService<S> {
    store: S,
    session_ttl: Duration,
}

impl<S: Store> CounterService<S> {
    pub const fn new(store: S) -> Self {
        Self::with_session_ttl(store, SESSION_TTL)
    }

    pub const fn with_session_ttl(store: S, session_ttl: Duration) -> Self {
        Self { store, session_ttl }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Counts one visit by `identity`.
    ///
    /// 1. Increments the visitor's session counter.
    /// 2. Refreshes its expiry, so continued activity keeps it alive.
    /// 3. Increments the global counter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`](crate::Error::StoreUnavailable) as
    /// soon as any step fails. Earlier steps are not rolled back.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn record_visit(&self, identity: &str) -> Result<Visit> {
        let key = session_key(identity);
        let session_count = self.store.incr(&key).await?;
        self.store.expire(&key, self.session_ttl).await?;
        let global_count = self.store.incr(GLOBAL_KEY).await?;

        tracing::trace!(session_count, global_count, "Recorded visit");
        Ok(Visit {
            session_count,
            global_count,
        })
    }
}
