//! Core trait for tierq storage backends.
//!
//! The engine in [`crate::queue`] owns everything that is common to all
//! backends: priority coercion, channel derivation, payload encoding, hooks
//! and error capture. A backend only moves one already-encoded payload in or
//! out of one resolved [`Channel`].
//!
//! # Example: Implementing a Custom Backend
//!
//! ```rust,ignore
//! use tierq::backend::{BackendError, QueueBackend};
//! use tierq::Channel;
//! use async_trait::async_trait;
//! use std::time::Duration;
//!
//! pub struct MyBackend { /* ... */ }
//!
//! #[async_trait]
//! impl QueueBackend for MyBackend {
//!     fn driver(&self) -> &'static str { "mine" }
//!
//!     async fn enqueue(&self, payload: Vec<u8>, channel: &Channel) -> Result<bool, BackendError> {
//!         // put `payload` on `channel.name()` or `channel.key()`
//!     }
//!
//!     async fn dequeue(
//!         &self,
//!         channel: &Channel,
//!         blocking: bool,
//!         timeout: Duration,
//!     ) -> Result<Option<Vec<u8>>, BackendError> {
//!         // take one payload, waiting at most `timeout` when `blocking`
//!     }
//!
//!     fn close(&self) {}
//! }
//! ```

use async_trait::async_trait;
use std::time::Duration;

use super::error::BackendError;
use crate::queue::{Channel, QueueConfig, QueueId};

/// Storage contract consumed by [`Queue`](crate::Queue).
///
/// # Implementation Notes
///
/// - "Nothing to pop" is `Ok(None)`. Reserve errors for connectivity and
///   resource problems.
/// - A blocking `dequeue` must give up after `timeout`.
/// - `enqueue`/`dequeue` must be as safe under concurrent producers and
///   consumers as the underlying store is; the engine adds no locking.
/// - `close` must be idempotent and must not fail.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Short driver name, also the default queue id.
    fn driver(&self) -> &'static str;

    /// Pick the queue id given what the configuration supplied.
    ///
    /// Runs once while the engine is constructed, before channels are derived.
    fn resolve_id(&self, config: &QueueConfig) -> QueueId {
        config
            .id
            .clone()
            .unwrap_or_else(|| QueueId::Name(self.driver().to_string()))
    }

    /// Put one encoded payload on `channel`.
    async fn enqueue(&self, payload: Vec<u8>, channel: &Channel) -> Result<bool, BackendError>;

    /// Take one payload from `channel`.
    ///
    /// When `blocking` is set the call may wait for data, but never longer
    /// than `timeout`.
    async fn dequeue(
        &self,
        channel: &Channel,
        blocking: bool,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, BackendError>;

    /// Release resources owned by the backend.
    fn close(&self);
}
