//! The backend-agnostic queue engine.
//!
//! - [`Queue`]: push/pop lifecycle, hooks, error capture
//! - [`ChannelSet`]: per-priority channel names and keys for a queue id
//! - [`HookRegistry`]: one optional callback per [`QueueEvent`]
//! - [`QueueConfig`]: engine options plus backend-specific extras

mod channels;
mod config;
mod events;
#[allow(clippy::module_inception)]
mod queue;

pub use channels::{Channel, ChannelSet};
pub use config::{QueueConfig, QueueId};
pub use events::{Hook, HookContext, HookRegistry, QueueEvent};
pub use queue::{ErrorState, Queue, QueueBuilder};
