//! Shared-memory backend implementation for tierq.
//!
//! Each priority channel maps to one bounded segment addressed by the
//! channel's integer key (`<id> + <priority>`). Segments are opened lazily
//! the first time a priority is used and kept in a fixed slot per priority
//! until the backend is closed.
//!
//! # Usage
//!
//! ```rust
//! use tierq::{Priority, Queue, QueueConfig};
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # rt.block_on(async {
//! let config = QueueConfig::with_id(4_200_000).option("size", 64 * 1024);
//! let mut queue = Queue::shm(config).unwrap();
//!
//! queue.push(serde_json::json!({"job": "thumbnail"}), Priority::High).await;
//! assert!(queue.pop_any().await.is_some());
//! # });
//! # }
//! ```
//!
//! Segment storage is pluggable through [`SegmentFactory`]; the default
//! [`SharedSegment`] keeps segments in a process-wide registry.

mod segment;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

pub use segment::{SegmentFactory, SegmentQueue, SharedSegment, SharedSegmentFactory};

use super::error::BackendError;
use super::traits::QueueBackend;
use crate::queue::{Channel, QueueConfig, QueueId};
use crate::Priority;

const POLL_START: Duration = Duration::from_millis(5);
const POLL_MAX: Duration = Duration::from_millis(100);

// Largest base key that still leaves room for `id + Low`
const MAX_BASE_KEY: i64 = i64::MAX - Priority::Low as i64;

/// Segment options, merged from [`QueueConfig::extra`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShmOptions {
    /// Bytes available to each segment
    pub size: usize,
    /// Project tag mixed into the derived queue key
    pub project: String,
    /// Directory mixed into the derived queue key
    pub tmp_dir: PathBuf,
}

impl Default for ShmOptions {
    fn default() -> Self {
        Self {
            size: 256_000,
            project: "tierq_shm".to_string(),
            tmp_dir: PathBuf::from("/tmp"),
        }
    }
}

impl ShmOptions {
    /// Defaults overridden by `size`, `project` and `tmpDir` (or `tmp_dir`).
    pub fn from_extra(extra: &HashMap<String, Value>) -> Result<Self, BackendError> {
        let mut options = Self::default();

        if let Some(size) = extra.get("size") {
            options.size = size
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    BackendError::Configuration(format!(
                        "shm size must be a positive integer, got {}",
                        size
                    ))
                })?;
        }

        if let Some(project) = extra.get("project") {
            options.project = project
                .as_str()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    BackendError::Configuration(format!(
                        "shm project must be a non-empty string, got {}",
                        project
                    ))
                })?
                .to_string();
        }

        if let Some(dir) = extra.get("tmpDir").or_else(|| extra.get("tmp_dir")) {
            options.tmp_dir = dir.as_str().map(PathBuf::from).ok_or_else(|| {
                BackendError::Configuration(format!("shm tmpDir must be a path, got {}", dir))
            })?;
        }

        Ok(options)
    }

    /// Queue key derived from the directory and project tag, for queues
    /// configured without a positive integer id.
    ///
    /// Layout follows `ftok(3)`: the project tag fills the top byte, the
    /// directory the low 24 bits. The result is always positive.
    pub fn derive_key(&self) -> i64 {
        let path_bits = fnv1a(path_bytes(&self.tmp_dir)) & 0x00ff_ffff;
        let project_bits = fnv1a(self.project.as_bytes()) & 0x7f;
        ((project_bits << 24) | path_bits) as i64
    }
}

fn path_bytes(path: &Path) -> &[u8] {
    path.as_os_str().as_encoded_bytes()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Shared-memory backend with one lazily opened segment per priority.
pub struct ShmBackend {
    options: ShmOptions,
    factory: Arc<dyn SegmentFactory>,
    slots: Mutex<[Option<Arc<dyn SegmentQueue>>; 3]>,
}

impl ShmBackend {
    pub const DRIVER: &'static str = "shm";

    pub fn new(options: ShmOptions) -> Self {
        Self::with_factory(options, Arc::new(SharedSegmentFactory))
    }

    /// Use a custom segment implementation.
    pub fn with_factory(options: ShmOptions, factory: Arc<dyn SegmentFactory>) -> Self {
        Self {
            options,
            factory,
            slots: Mutex::new([None, None, None]),
        }
    }

    /// Build from the backend-specific keys of a queue configuration.
    pub fn from_config(config: &QueueConfig) -> Result<Self, BackendError> {
        Ok(Self::new(ShmOptions::from_extra(&config.extra)?))
    }

    pub fn options(&self) -> &ShmOptions {
        &self.options
    }

    /// The segment currently open for `priority`, if any.
    pub fn queue(&self, priority: Priority) -> Option<Arc<dyn SegmentQueue>> {
        self.slots.lock()[priority.index()].clone()
    }

    /// Open segments in priority order; closed slots are `None`.
    pub fn queues(&self) -> [Option<Arc<dyn SegmentQueue>>; 3] {
        self.slots.lock().clone()
    }

    fn segment(&self, channel: &Channel) -> Result<Arc<dyn SegmentQueue>, BackendError> {
        let mut slots = self.slots.lock();
        let slot = &mut slots[channel.priority().index()];

        if let Some(segment) = slot {
            return Ok(segment.clone());
        }

        let segment = self.factory.open(channel.key(), &self.options)?;
        info!(
            key = channel.key(),
            priority = %channel.priority(),
            size = self.options.size,
            "Shared segment attached"
        );
        *slot = Some(segment.clone());
        Ok(segment)
    }
}

impl std::fmt::Debug for ShmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open: Vec<i64> = self
            .slots
            .lock()
            .iter()
            .flatten()
            .map(|segment| segment.key())
            .collect();
        f.debug_struct("ShmBackend")
            .field("options", &self.options)
            .field("open", &open)
            .finish()
    }
}

#[async_trait]
impl QueueBackend for ShmBackend {
    fn driver(&self) -> &'static str {
        Self::DRIVER
    }

    /// A positive integer id is used as-is; anything else is replaced by a
    /// key derived from the options. Ids too close to `i64::MAX` to give
    /// three distinct keys are replaced too.
    fn resolve_id(&self, config: &QueueConfig) -> QueueId {
        match &config.id {
            Some(id) if (1..=MAX_BASE_KEY).contains(&id.as_int()) => id.clone(),
            _ => QueueId::Number(self.options.derive_key()),
        }
    }

    async fn enqueue(&self, payload: Vec<u8>, channel: &Channel) -> Result<bool, BackendError> {
        self.segment(channel)?.push(&payload)
    }

    async fn dequeue(
        &self,
        channel: &Channel,
        blocking: bool,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        let segment = self.segment(channel)?;
        if !blocking || timeout.is_zero() {
            return segment.pop();
        }

        // Poll with exponential backoff until the deadline
        let deadline = Instant::now() + timeout;
        let mut delay = POLL_START;
        loop {
            if let Some(payload) = segment.pop()? {
                return Ok(Some(payload));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(POLL_MAX);
        }
    }

    fn close(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if let Some(segment) = slot.take() {
                segment.close();
                debug!(key = segment.key(), "Shared segment detached");
            }
        }
    }
}

impl Drop for ShmBackend {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ChannelSet;
    use crate::{HookContext, Queue, QueueEvent};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn channels(base: i64) -> ChannelSet {
        ChannelSet::derive(&QueueId::Number(base))
    }

    fn cleanup(base: i64) {
        for key in channels(base).keys() {
            SharedSegment::remove(key);
        }
    }

    #[test]
    fn test_options_from_extra() {
        let config = QueueConfig::default()
            .option("size", 1024)
            .option("project", "billing")
            .option("tmpDir", "/var/tmp");
        let options = ShmOptions::from_extra(&config.extra).unwrap();

        assert_eq!(options.size, 1024);
        assert_eq!(options.project, "billing");
        assert_eq!(options.tmp_dir, PathBuf::from("/var/tmp"));
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let config = QueueConfig::default().option("size", -1);
        assert!(matches!(
            ShmOptions::from_extra(&config.extra),
            Err(BackendError::Configuration(_))
        ));

        let config = QueueConfig::default().option("project", "");
        assert!(ShmOptions::from_extra(&config.extra).is_err());
    }

    #[test]
    fn test_derived_key_is_stable_and_positive() {
        let options = ShmOptions::default();
        assert_eq!(options.derive_key(), ShmOptions::default().derive_key());
        assert!(options.derive_key() > 0);

        let other = ShmOptions {
            project: "other".into(),
            ..ShmOptions::default()
        };
        assert_ne!(options.derive_key(), other.derive_key());
    }

    #[test]
    fn test_non_positive_id_uses_derived_key() {
        let backend = ShmBackend::new(ShmOptions::default());
        let expected = QueueId::Number(ShmOptions::default().derive_key());

        assert_eq!(backend.resolve_id(&QueueConfig::default()), expected);
        assert_eq!(backend.resolve_id(&QueueConfig::with_id("orders")), expected);
        assert_eq!(backend.resolve_id(&QueueConfig::with_id(-5)), expected);
        assert_eq!(
            backend.resolve_id(&QueueConfig::with_id(77)),
            QueueId::Number(77)
        );
    }

    #[test]
    fn test_ids_near_max_keep_distinct_keys() {
        let backend = ShmBackend::new(ShmOptions::default());
        let derived = QueueId::Number(ShmOptions::default().derive_key());

        let edge = i64::MAX - 2;
        let id = backend.resolve_id(&QueueConfig::with_id(edge));
        assert_eq!(ChannelSet::derive(&id).keys(), [edge, edge + 1, i64::MAX]);

        for id in [i64::MAX - 1, i64::MAX] {
            assert_eq!(backend.resolve_id(&QueueConfig::with_id(id)), derived);
        }
        let huge = QueueId::from(format!("{}", i64::MAX));
        assert_eq!(backend.resolve_id(&QueueConfig::with_id(huge)), derived);
    }

    #[tokio::test]
    async fn test_queue_with_id_at_max_does_not_mix_priorities() {
        let mut queue = Queue::shm(QueueConfig::with_id(i64::MAX - 1)).unwrap();
        let keys = queue.channels().keys();
        assert_eq!(keys[0], ShmOptions::default().derive_key());
        assert_ne!(keys[1], keys[2]);

        assert!(queue.push(json!("normal"), Priority::Normal).await);
        assert_eq!(queue.pop(Priority::Low, false).await, None);
        assert_eq!(queue.pop(Priority::Normal, false).await, Some(json!("normal")));

        drop(queue);
        for key in keys {
            SharedSegment::remove(key);
        }
    }

    #[tokio::test]
    async fn test_slots_are_lazy_and_memoized() {
        let base = 5_300_000;
        let set = channels(base);
        let backend = ShmBackend::new(ShmOptions::default());

        assert!(backend.queue(Priority::Low).is_none());
        backend
            .enqueue(b"a".to_vec(), set.get(Priority::Low))
            .await
            .unwrap();

        let first = backend.queue(Priority::Low).expect("slot opened");
        assert_eq!(first.key(), base + 2);
        backend
            .enqueue(b"b".to_vec(), set.get(Priority::Low))
            .await
            .unwrap();
        let second = backend.queue(Priority::Low).expect("slot opened");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(backend.queue(Priority::High).is_none());

        drop(backend);
        cleanup(base);
    }

    #[tokio::test]
    async fn test_close_releases_every_slot() {
        let base = 5_300_100;
        let set = channels(base);
        let backend = ShmBackend::new(ShmOptions::default());

        for channel in set.iter() {
            backend.enqueue(b"x".to_vec(), channel).await.unwrap();
        }
        let held = backend.queue(Priority::Normal).expect("slot opened");

        backend.close();
        assert!(backend.queues().iter().all(Option::is_none));
        assert!(matches!(held.pop(), Err(BackendError::Closed(_))));
        backend.close();

        // a fresh slot is opened on next use and sees the stored data
        assert_eq!(
            backend
                .dequeue(set.get(Priority::Normal), false, Duration::ZERO)
                .await
                .unwrap(),
            Some(b"x".to_vec())
        );

        drop(backend);
        cleanup(base);
    }

    #[tokio::test]
    async fn test_blocking_pop_waits_for_data() {
        let base = 5_300_200;
        let set = channels(base);
        let backend = Arc::new(ShmBackend::new(ShmOptions::default()));

        let producer = {
            let channel = set.get(Priority::High).clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(30)).await;
                let segment = SharedSegment::attach(channel.key(), 1024).unwrap();
                segment.push(b"late").unwrap();
            })
        };

        let popped = backend
            .dequeue(set.get(Priority::High), true, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(popped, Some(b"late".to_vec()));
        producer.await.unwrap();

        backend.close();
        cleanup(base);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_pop_is_bounded() {
        let base = 5_300_300;
        let set = channels(base);
        let backend = ShmBackend::new(ShmOptions::default());

        let started = Instant::now();
        let popped = backend
            .dequeue(set.get(Priority::Low), true, Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(popped, None);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));

        drop(backend);
        cleanup(base);
    }

    #[tokio::test]
    async fn test_queue_over_shared_memory() {
        let base = 5_300_400;
        let mut queue = Queue::shm(QueueConfig::with_id(base).option("size", 4096)).unwrap();
        assert_eq!(queue.driver(), "shm");
        assert_eq!(queue.channels().keys(), [base, base + 1, base + 2]);

        let after_pops = Arc::new(AtomicUsize::new(0));
        let counter = after_pops.clone();
        queue.on(
            QueueEvent::AfterPop,
            move |ctx| {
                if let HookContext::AfterPop { item: Some(_), .. } = ctx {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
            false,
        );

        assert!(queue.push(json!("low"), Priority::Low).await);
        assert!(queue.push(json!("normal"), 99).await);
        assert!(queue.push(json!({"id": 1}), Priority::High).await);

        assert_eq!(queue.pop_any().await, Some(json!({"id": 1})));
        assert_eq!(queue.pop(Priority::Low, false).await, Some(json!("low")));
        assert_eq!(queue.pop_any().await, Some(json!("normal")));
        assert_eq!(queue.pop_any().await, None);
        assert_eq!(after_pops.load(Ordering::SeqCst), 3);

        drop(queue);
        cleanup(base);
    }

    #[tokio::test]
    async fn test_full_segment_is_captured() {
        let base = 5_300_500;
        let mut queue = Queue::shm(QueueConfig::with_id(base).option("size", 16)).unwrap();

        assert!(queue.push(json!("0123456789"), Priority::Normal).await);
        assert!(!queue.push(json!("0123456789"), Priority::Normal).await);
        assert_eq!(queue.error_code(), 1003);
        assert!(queue.error_message().contains("capacity exceeded"));

        // other priorities have their own segment
        assert!(queue.push(json!("0123456789"), Priority::High).await);

        drop(queue);
        cleanup(base);
    }
}
