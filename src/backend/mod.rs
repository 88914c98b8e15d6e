//! Backend abstraction layer for tierq.
//!
//! This module provides the storage contract the queue engine talks to and
//! the two reference implementations.
//!
//! # Architecture
//!
//! - [`QueueBackend`]: enqueue one payload, dequeue one payload, close
//! - [`BackendError`]: backend-agnostic error type
//! - [`RedisBackend`]: Redis lists, one key per priority channel
//! - [`ShmBackend`]: bounded shared-memory segments, one per priority channel
//!
//! # Using a Custom Backend
//!
//! ```rust,ignore
//! use tierq::{Queue, QueueConfig};
//!
//! // Your custom backend implementation
//! let backend = MyCustomBackend::new(client);
//!
//! let mut queue = Queue::new(backend, QueueConfig::with_id("jobs"));
//! queue.push(serde_json::json!({"task": "resize"}), tierq::Priority::Low).await;
//! ```
//!
//! # Using the Redis Backend
//!
//! ```rust,ignore
//! use tierq::backend::redis::{Pool, RedisConnectionManager};
//! use tierq::{Queue, QueueConfig};
//!
//! let pool = Pool::builder()
//!     .build(RedisConnectionManager::new("redis://localhost:6379")?)
//!     .await?;
//! let mut queue = Queue::redis(pool, QueueConfig::with_id("my_app"));
//! ```

mod error;
pub mod shm;
mod traits;

// Redis backend
#[cfg(feature = "redis")]
pub mod redis;

// Re-export error type
pub use error::BackendError;

pub use traits::QueueBackend;

pub use shm::{SegmentFactory, SegmentQueue, SharedSegment, ShmBackend, ShmOptions};

// Re-export Redis backend
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;
