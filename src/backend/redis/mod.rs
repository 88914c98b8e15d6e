//! Redis backend implementation for tierq.
//!
//! Each priority channel is an independent Redis list named after the
//! channel (`<id>_high`, `<id>`, `<id>_low`). Items are `LPUSH`ed and
//! `RPOP`ed, so every channel is FIFO.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tierq::backend::redis::{Pool, RedisBackend, RedisConnectionManager};
//! use tierq::{Queue, QueueConfig};
//!
//! let manager = RedisConnectionManager::new("redis://localhost:6379")?;
//! let pool = Pool::builder().max_size(8).build(manager).await?;
//! let mut queue = Queue::new(RedisBackend::new(pool), QueueConfig::with_id("mails"));
//! ```
//!
//! The backend only borrows a handle to the caller's pool. Connection
//! lifecycle stays with the caller, so `close` does nothing here.
//!
//! # Valkey Compatibility
//!
//! Since Valkey is Redis-compatible, this backend works with Valkey servers
//! by simply pointing the URL to a Valkey instance.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::bb8::PooledConnection;
use redis::AsyncCommands;
use tracing::trace;

pub use bb8_redis::bb8::Pool;
pub use bb8_redis::RedisConnectionManager;

use super::error::BackendError;
use super::traits::QueueBackend;
use crate::queue::Channel;

/// Redis-based backend.
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool<RedisConnectionManager>,
}

impl RedisBackend {
    pub const DRIVER: &'static str = "redis";

    /// Create a backend over an existing pool.
    pub fn new(pool: Pool<RedisConnectionManager>) -> Self {
        Self { pool }
    }

    /// Swap the pool used for subsequent calls.
    pub fn set_pool(&mut self, pool: Pool<RedisConnectionManager>) {
        self.pool = pool;
    }

    /// Get the Redis connection pool.
    pub fn pool(&self) -> &Pool<RedisConnectionManager> {
        &self.pool
    }

    async fn get_conn(
        &self,
    ) -> Result<PooledConnection<'_, RedisConnectionManager>, BackendError> {
        self.pool.get().await.map_err(|e| {
            BackendError::Unavailable(format!("Failed to get Redis connection: {}", e))
        })
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("state", &self.pool.state())
            .finish()
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    fn driver(&self) -> &'static str {
        Self::DRIVER
    }

    async fn enqueue(&self, payload: Vec<u8>, channel: &Channel) -> Result<bool, BackendError> {
        let mut conn = self.get_conn().await?;
        let len: usize = conn.lpush(channel.name(), payload).await?;
        trace!(key = channel.name(), len, "LPUSH");
        Ok(len > 0)
    }

    async fn dequeue(
        &self,
        channel: &Channel,
        blocking: bool,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        let mut conn = self.get_conn().await?;

        // BRPOP treats 0 as "wait forever"; fall back to RPOP instead
        if blocking && !timeout.is_zero() {
            let popped: Option<(String, Vec<u8>)> =
                conn.brpop(channel.name(), timeout.as_secs_f64()).await?;
            trace!(key = channel.name(), hit = popped.is_some(), "BRPOP");
            return Ok(popped.map(|(_, payload)| payload));
        }

        let popped: Option<Vec<u8>> = conn.rpop(channel.name(), None).await?;
        trace!(key = channel.name(), hit = popped.is_some(), "RPOP");
        Ok(popped)
    }

    fn close(&self) {}
}
