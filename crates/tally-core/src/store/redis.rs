use crate::{Error, Result, store::Store};
use ::redis::{Client, aio::ConnectionManager};
use async_trait::async_trait;
use bytes::Bytes;
use core::time::Duration;

/// Redis-backed [`Store`].
///
/// Wraps a [`ConnectionManager`], which multiplexes commands over a single
/// connection and reconnects automatically. Cloning is cheap and every clone
/// shares the same underlying connection.
///
/// `BRPOP` holds the multiplexed connection until it returns, so processes
/// that pop should not share a `RedisStore` with latency-sensitive callers.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to the store at `addr`, selecting logical database `index`.
    ///
    /// `addr` is either a full `redis://` / `rediss://` URL (used verbatim) or
    /// a bare `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the URL is invalid or the
    /// initial connection fails.
    pub async fn connect(addr: &str, index: u32) -> Result<Self> {
        let url = connection_url(addr, index);
        let client = Client::open(url.as_str())?;
        let conn = ConnectionManager::new(client).await?;

        tracing::debug!(index, "Connected to store");
        Ok(Self { conn })
    }
}

fn connection_url(addr: &str, index: u32) -> String {
    if addr.starts_with("redis://") || addr.starts_with("rediss://") {
        addr.to_string()
    } else {
        format!("redis://{addr}/{index}")
    }
}

/// Converts a pop timeout to the seconds argument `BRPOP` expects, where `0`
/// blocks forever.
fn brpop_timeout_secs(timeout: Option<Duration>) -> f64 {
    match timeout {
        // A zero timeout would mean "forever" to the server; clamp to 1ms.
        Some(timeout) => timeout.as_secs_f64().max(0.001),
        None => 0.0,
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = ::redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        ::redis::cmd("EXPIRE")
            .arg(key)
            .arg(secs)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn blocking_pop(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Bytes>> {
        let mut conn = self.conn.clone();
        // BRPOP replies with `[queue, element]`, or nil once the timeout
        // expires.
        let reply: Option<(String, Vec<u8>)> = ::redis::cmd("BRPOP")
            .arg(queue)
            .arg(brpop_timeout_secs(timeout))
            .query_async(&mut conn)
            .await?;
        Ok(reply.map(|(_, payload)| Bytes::from(payload)))
    }

    async fn push(&self, queue: &str, payload: Bytes) -> Result<()> {
        let mut conn = self.conn.clone();
        ::redis::cmd("LPUSH")
            .arg(queue)
            .arg(payload.as_ref())
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(Error::store_unavailable(format!(
                "unexpected PING reply: {pong}"
            )));
        }
        Ok(())
    }
}
