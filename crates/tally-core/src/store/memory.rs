use crate::{Error, Result, SystemClock, TimeSource, store::Store};
use async_trait::async_trait;
use bytes::Bytes;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Notify;

/// In-process [`Store`] with the same observable semantics as Redis.
///
/// - Increments are serialized by a single mutex.
/// - Expiry is evaluated lazily against the [`TimeSource`] on every access.
/// - Pushes go to the front of the queue and pops take from the back, giving
///   the same approximately-FIFO order as `LPUSH` + `BRPOP`.
/// - Blocked pops are woken on every push; each element is handed to exactly
///   one popper.
///
/// [`MemoryStore::set_available`] simulates an outage: while unavailable,
/// every call fails with [`Error::StoreUnavailable`] and blocked pops wake up
/// to report it.
pub struct MemoryStore<T: TimeSource = SystemClock> {
    clock: T,
    state: Mutex<State>,
    pushed: Notify,
    unavailable: AtomicBool,
}

#[derive(Default)]
struct State {
    counters: HashMap<String, Counter>,
    queues: HashMap<String, VecDeque<Bytes>>,
}

struct Counter {
    value: i64,
    expires_at: Option<u64>,
}

impl State {
    /// Returns the live counter at `key`, evicting it first if it expired.
    fn live_counter(&mut self, key: &str, now: u64) -> Option<&mut Counter> {
        let expired = self
            .counters
            .get(key)
            .and_then(|counter| counter.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            self.counters.remove(key);
        }
        self.counters.get_mut(key)
    }
}

impl MemoryStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for MemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeSource> MemoryStore<T> {
    pub fn with_clock(clock: T) -> Self {
        Self {
            clock,
            state: Mutex::new(State::default()),
            pushed: Notify::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Toggles the simulated outage.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
        // Blocked pops re-check availability when woken.
        self.pushed.notify_waiters();
    }

    /// Current value of `key`, or `None` if it is absent or expired.
    pub fn get(&self, key: &str) -> Option<i64> {
        let now = self.clock.current_millis();
        self.state
            .lock()
            .live_counter(key, now)
            .map(|counter| counter.value)
    }

    /// Remaining time-to-live of `key`, or `None` if it is absent, expired or
    /// has no expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.current_millis();
        self.state
            .lock()
            .live_counter(key, now)
            .and_then(|counter| counter.expires_at)
            .map(|at| Duration::from_millis(at - now))
    }

    /// Number of elements waiting in `queue`.
    pub fn queue_len(&self, queue: &str) -> usize {
        self.state.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::store_unavailable("memory store is offline"));
        }
        Ok(())
    }

    fn try_pop(&self, queue: &str) -> Option<Bytes> {
        let mut state = self.state.lock();
        state.queues.get_mut(queue).and_then(VecDeque::pop_back)
    }
}

#[async_trait]
impl<T: TimeSource> Store for MemoryStore<T> {
    async fn incr(&self, key: &str) -> Result<i64> {
        self.check_available()?;
        let now = self.clock.current_millis();
        let mut state = self.state.lock();
        // INCR keeps any TTL already set on the key.
        let value = match state.live_counter(key, now) {
            Some(counter) => {
                counter.value += 1;
                counter.value
            }
            None => {
                state.counters.insert(
                    key.to_string(),
                    Counter {
                        value: 1,
                        expires_at: None,
                    },
                );
                1
            }
        };
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.check_available()?;
        let now = self.clock.current_millis();
        let mut state = self.state.lock();
        // Like EXPIRE, a missing key is left missing.
        if let Some(counter) = state.live_counter(key, now) {
            counter.expires_at = Some(now + ttl.as_millis() as u64);
        }
        Ok(())
    }

    async fn blocking_pop(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Bytes>> {
        let deadline = timeout.map(|timeout| tokio::time::Instant::now() + timeout);

        loop {
            // Register interest before checking the queue so a push that lands
            // in between is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.check_available()?;
            if let Some(item) = self.try_pop(queue) {
                return Ok(Some(item));
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn push(&self, queue: &str, payload: Bytes) -> Result<()> {
        self.check_available()?;
        self.state
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_front(payload);
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU64;
    use std::sync::Arc;

    #[derive(Default)]
    struct ManualTime {
        millis: AtomicU64,
    }

    impl ManualTime {
        fn advance(&self, by: Duration) {
            self.millis
                .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl TimeSource for ManualTime {
        fn current_millis(&self) -> u64 {
            self.millis.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn incr_starts_at_one_and_counts_up() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("k").await, Ok(1));
        assert_eq!(store.incr("k").await, Ok(2));
        assert_eq!(store.incr("other").await, Ok(1));
        assert_eq!(store.get("k"), Some(2));
    }

    #[tokio::test]
    async fn expired_key_is_forgotten() {
        let time = Arc::new(ManualTime::default());
        let store = MemoryStore::with_clock(time.clone());

        store.incr("k").await.unwrap();
        store.expire("k", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(10)));

        time.advance(Duration::from_secs(10));
        assert_eq!(store.get("k"), None);
        assert_eq!(store.incr("k").await, Ok(1));
        // The fresh key carries no TTL until one is set again.
        assert_eq!(store.ttl("k"), None);
    }

    #[tokio::test]
    async fn expire_on_missing_key_is_a_no_op() {
        let store = MemoryStore::new();
        store.expire("missing", Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.get("missing"), None);
    }

    #[tokio::test]
    async fn pop_returns_items_in_push_order() {
        let store = MemoryStore::new();
        for item in ["a", "b", "c"] {
            store.push("q", Bytes::from(item)).await.unwrap();
        }
        let timeout = Some(Duration::from_millis(10));
        assert_eq!(store.blocking_pop("q", timeout).await, Ok(Some(Bytes::from("a"))));
        assert_eq!(store.blocking_pop("q", timeout).await, Ok(Some(Bytes::from("b"))));
        assert_eq!(store.blocking_pop("q", timeout).await, Ok(Some(Bytes::from("c"))));
        assert_eq!(store.blocking_pop("q", timeout).await, Ok(None));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocked_pop_wakes_on_push() {
        let store = Arc::new(MemoryStore::new());
        let popper = {
            let store = store.clone();
            tokio::spawn(async move { store.blocking_pop("q", None).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.push("q", Bytes::from("job")).await.unwrap();

        let popped = popper.await.unwrap();
        assert_eq!(popped, Ok(Some(Bytes::from("job"))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn outage_fails_every_call_and_wakes_blocked_pops() {
        let store = Arc::new(MemoryStore::new());
        let popper = {
            let store = store.clone();
            tokio::spawn(async move { store.blocking_pop("q", None).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.set_available(false);

        assert!(popper.await.unwrap().unwrap_err().is_store_unavailable());
        assert!(store.incr("k").await.unwrap_err().is_store_unavailable());
        assert!(store.ping().await.is_err());

        store.set_available(true);
        assert_eq!(store.ping().await, Ok(()));
    }
}
