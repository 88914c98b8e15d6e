/*!
 * Shared Segment
 * Bounded byte FIFO addressed by an integer key
 */

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use tracing::info;

use super::ShmOptions;
use crate::backend::BackendError;

// Segments outlive the handles attached to them, like System V segments
static SEGMENTS: LazyLock<DashMap<i64, Arc<SegmentState>>> = LazyLock::new(DashMap::new);

/// Push/pop/close surface of one shared-memory queue.
pub trait SegmentQueue: Send + Sync {
    fn key(&self) -> i64;

    /// Append a payload. Fails when the segment has no room left.
    fn push(&self, payload: &[u8]) -> Result<bool, BackendError>;

    /// Take the oldest payload, `None` when empty.
    fn pop(&self) -> Result<Option<Vec<u8>>, BackendError>;

    /// Detach this handle. Idempotent.
    fn close(&self);
}

/// Opens (creating if needed) the segment for a key.
pub trait SegmentFactory: Send + Sync {
    fn open(&self, key: i64, options: &ShmOptions) -> Result<Arc<dyn SegmentQueue>, BackendError>;
}

struct SegmentState {
    capacity: usize,
    data: Mutex<SegmentData>,
}

#[derive(Default)]
struct SegmentData {
    items: VecDeque<Vec<u8>>,
    used: usize,
}

/// Handle to a process-shared segment.
///
/// Every handle opened for the same key sees the same data. Closing a handle
/// detaches it; the segment itself stays until [`SharedSegment::remove`].
pub struct SharedSegment {
    key: i64,
    state: Arc<SegmentState>,
    closed: AtomicBool,
}

impl SharedSegment {
    /// Attach to the segment for `key`, creating it with `capacity` bytes if
    /// it does not exist yet. An existing segment keeps its original size.
    pub fn attach(key: i64, capacity: usize) -> Result<Self, BackendError> {
        if capacity == 0 {
            return Err(BackendError::Configuration(
                "segment size cannot be zero".into(),
            ));
        }

        let state = SEGMENTS
            .entry(key)
            .or_insert_with(|| {
                info!(key, capacity, "Shared segment created");
                Arc::new(SegmentState {
                    capacity,
                    data: Mutex::new(SegmentData::default()),
                })
            })
            .clone();

        Ok(Self {
            key,
            state,
            closed: AtomicBool::new(false),
        })
    }

    /// Destroy the segment for `key`. Attached handles keep their data but
    /// new attachments start empty. Returns whether a segment existed.
    pub fn remove(key: i64) -> bool {
        SEGMENTS.remove(&key).is_some()
    }

    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    /// Bytes currently stored.
    pub fn used(&self) -> usize {
        self.state.data.lock().used
    }

    pub fn len(&self) -> usize {
        self.state.data.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.is_closed() {
            return Err(BackendError::Closed(format!(
                "shared segment {} is detached",
                self.key
            )));
        }
        Ok(())
    }
}

impl SegmentQueue for SharedSegment {
    fn key(&self) -> i64 {
        self.key
    }

    fn push(&self, payload: &[u8]) -> Result<bool, BackendError> {
        self.ensure_open()?;

        let mut data = self.state.data.lock();
        let available = self.state.capacity - data.used;
        if payload.len() > available {
            return Err(BackendError::CapacityExceeded {
                key: self.key,
                requested: payload.len(),
                available,
            });
        }

        data.used += payload.len();
        data.items.push_back(payload.to_vec());
        Ok(true)
    }

    fn pop(&self) -> Result<Option<Vec<u8>>, BackendError> {
        self.ensure_open()?;

        let mut data = self.state.data.lock();
        let item = data.items.pop_front();
        if let Some(item) = &item {
            data.used -= item.len();
        }
        Ok(item)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Factory for [`SharedSegment`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedSegmentFactory;

impl SegmentFactory for SharedSegmentFactory {
    fn open(&self, key: i64, options: &ShmOptions) -> Result<Arc<dyn SegmentQueue>, BackendError> {
        Ok(Arc::new(SharedSegment::attach(key, options.size)?))
    }
}
