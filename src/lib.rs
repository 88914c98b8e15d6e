//! # tierq
//!
//! A priority-aware work queue that pushes and pops items through an
//! interchangeable storage backend.
//!
//! Every logical queue is split into three channels, one per [`Priority`].
//! The [`Queue`] engine resolves the channel, encodes the payload and runs the
//! lifecycle hooks; a [`QueueBackend`] only has to put one payload on a
//! channel and take one off.
//!
//! Two backends ship with the crate:
//!
//! - [`backend::RedisBackend`]: Redis lists, one key per priority (feature `redis`)
//! - [`backend::ShmBackend`]: bounded shared-memory segments, one per priority
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use tierq::{Priority, Queue, QueueConfig};
//! use serde_json::json;
//!
//! use tierq::backend::redis::{Pool, RedisConnectionManager};
//!
//! let pool = Pool::builder()
//!     .build(RedisConnectionManager::new("redis://127.0.0.1:6379")?)
//!     .await?;
//! let mut queue = Queue::redis(pool, QueueConfig::with_id("orders"));
//!
//! queue.push(json!({"id": 1}), Priority::High).await;
//! let item = queue.pop_any().await;
//! ```
//!
//! ## Errors
//!
//! Backend failures never propagate out of `push`/`pop`. They are recorded in
//! the queue's error state ([`Queue::error_code`], [`Queue::error_message`])
//! and reported to the `ErrorPush`/`ErrorPop` hooks.

pub mod backend;
mod error;
mod priority;
pub mod queue;

pub use backend::{BackendError, QueueBackend};
pub use error::QueueError;
pub use priority::{is_priority, AsPriority, Priority};
pub use queue::{
    Channel, ChannelSet, ErrorState, Hook, HookContext, HookRegistry, Queue, QueueBuilder,
    QueueConfig, QueueEvent, QueueId,
};
