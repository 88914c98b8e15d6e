//! Per-priority channel derivation.
//!
//! A queue id fans out into one channel per [`Priority`]. Each channel
//! carries both representations so a backend can use whichever addressing it
//! needs:
//!
//! | priority | name          | key        |
//! |----------|---------------|------------|
//! | High     | `<id>_high`   | `<id> + 0` |
//! | Normal   | `<id>`        | `<id> + 1` |
//! | Low      | `<id>_low`    | `<id> + 2` |

use super::config::QueueId;
use crate::Priority;

/// One backend-addressable location of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    priority: Priority,
    name: String,
    key: i64,
}

impl Channel {
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// String key, for stores addressed by name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Integer key, for stores addressed by number.
    pub fn key(&self) -> i64 {
        self.key
    }
}

/// The three channels of one queue, indexed by priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    channels: [Channel; 3],
}

impl ChannelSet {
    pub fn derive(id: &QueueId) -> Self {
        let base = id.as_int();
        let channels = Priority::ALL.map(|priority| Channel {
            priority,
            name: format!("{}{}", id, priority.suffix()),
            key: base.saturating_add(priority.as_raw()),
        });
        Self { channels }
    }

    pub fn get(&self, priority: Priority) -> &Channel {
        &self.channels[priority.index()]
    }

    /// Channels in scan order: High, Normal, Low.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn names(&self) -> [&str; 3] {
        [
            self.channels[0].name(),
            self.channels[1].name(),
            self.channels[2].name(),
        ]
    }

    pub fn keys(&self) -> [i64; 3] {
        [
            self.channels[0].key,
            self.channels[1].key,
            self.channels[2].key,
        ]
    }
}
