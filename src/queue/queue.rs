use serde_json::Value;
use tracing::{debug, warn};

use super::channels::{Channel, ChannelSet};
use super::config::{QueueConfig, QueueId};
use super::events::{Hook, HookContext, HookRegistry, QueueEvent};
use crate::backend::{BackendError, QueueBackend, ShmBackend};
use crate::priority::{self, AsPriority, Priority};
use crate::QueueError;

/// Last failure captured by a [`Queue`].
///
/// `code` is zero until the first failure and is not reset by later
/// successes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorState {
    pub code: i32,
    pub message: String,
}

impl ErrorState {
    pub fn is_clear(&self) -> bool {
        self.code == 0
    }
}

/// Priority queue engine over a pluggable [`QueueBackend`].
///
/// `push` and `pop` run a fixed template: fire the `Before*` hook, call the
/// backend on the channel resolved for the priority, encode or decode the
/// payload, then fire either the `Error*` hook or the `After*` hook.
///
/// # Sticky error state
///
/// The error code recorded by a failed call is not cleared by later
/// successful calls. While it is non-zero, `AfterPush` and `AfterPop` hooks
/// are skipped even for calls that succeed. Call [`Queue::clear_error`] after
/// handling a failure to re-enable them.
///
/// # Cleanup
///
/// [`Queue::close`] clears the hooks and releases backend-owned resources.
/// It also runs on drop, so every exit path releases shared-memory segments.
pub struct Queue {
    backend: Box<dyn QueueBackend>,
    config: QueueConfig,
    id: QueueId,
    channels: ChannelSet,
    hooks: HookRegistry,
    error: ErrorState,
}

impl Queue {
    /// Create an engine over `backend`.
    ///
    /// The queue id is taken from `config` or defaulted by the backend, and
    /// the channel set is derived immediately.
    pub fn new<B>(backend: B, config: QueueConfig) -> Self
    where
        B: QueueBackend + 'static,
    {
        Self::with_backend(Box::new(backend), config)
    }

    pub fn with_backend(backend: Box<dyn QueueBackend>, config: QueueConfig) -> Self {
        let id = backend.resolve_id(&config);
        let channels = ChannelSet::derive(&id);

        debug!(
            queue = %id,
            driver = backend.driver(),
            serialize = config.serialize,
            "Queue initialized"
        );

        Self {
            backend,
            config,
            id,
            channels,
            hooks: HookRegistry::new(),
            error: ErrorState::default(),
        }
    }

    /// Queue over a Redis pool the caller keeps ownership of.
    #[cfg(feature = "redis")]
    pub fn redis(
        pool: bb8_redis::bb8::Pool<bb8_redis::RedisConnectionManager>,
        config: QueueConfig,
    ) -> Self {
        Self::new(crate::backend::RedisBackend::new(pool), config)
    }

    /// Queue over shared-memory segments configured from `config.extra`.
    pub fn shm(config: QueueConfig) -> Result<Self, BackendError> {
        let backend = ShmBackend::from_config(&config)?;
        Ok(Self::new(backend, config))
    }

    pub fn builder() -> QueueBuilder {
        QueueBuilder::new()
    }

    // ------------------------------------------------------------------
    // push / pop
    // ------------------------------------------------------------------

    /// Push `item` onto the channel for `priority`.
    ///
    /// Invalid priorities are coerced to [`Priority::Normal`]. Returns the
    /// backend's status, or `false` if the call failed; the failure is kept
    /// in [`Queue::error`].
    pub async fn push<P: AsPriority>(&mut self, item: Value, priority: P) -> bool {
        let requested = priority.as_raw();
        self.hooks.fire(&HookContext::BeforePush {
            item: &item,
            priority: requested,
        });

        let resolved = Priority::resolve(requested);
        let status = match self.do_push(&item, resolved).await {
            Ok(status) => {
                debug!(
                    queue = %self.id,
                    channel = self.channels.get(resolved).name(),
                    priority = %resolved,
                    status,
                    "Item pushed"
                );
                status
            }
            Err(err) => {
                self.capture(&err);
                self.hooks.fire(&HookContext::ErrorPush { error: &err });
                false
            }
        };

        if self.error.is_clear() {
            self.hooks.fire(&HookContext::AfterPush {
                item: &item,
                priority: requested,
                status,
            });
        }

        status
    }

    async fn do_push(&self, item: &Value, priority: Priority) -> Result<bool, QueueError> {
        let payload = self.encode(item)?;
        let channel = self.channels.get(priority);
        Ok(self.backend.enqueue(payload, channel).await?)
    }

    /// Pop one item.
    ///
    /// With a valid `priority` only that channel is read, waiting up to
    /// [`QueueConfig::block_timeout`] when `blocking` is set. Otherwise the
    /// channels are scanned High, Normal, Low without blocking and the first
    /// item found is returned.
    pub async fn pop<P: AsPriority>(&mut self, priority: P, blocking: bool) -> Option<Value> {
        let requested = priority.as_raw();
        self.hooks
            .fire(&HookContext::BeforePop { priority: requested });

        let item = match self.do_pop(requested, blocking).await {
            Ok(item) => item,
            Err(err) => {
                self.capture(&err);
                self.hooks.fire(&HookContext::ErrorPop {
                    error: &err,
                    priority: requested,
                });
                None
            }
        };

        if self.error.is_clear() {
            self.hooks.fire(&HookContext::AfterPop {
                item: item.as_ref(),
                priority: requested,
            });
        }

        item
    }

    /// Non-blocking pop across all priorities.
    pub async fn pop_any(&mut self) -> Option<Value> {
        self.pop(None::<Priority>, false).await
    }

    async fn do_pop(
        &self,
        requested: Option<i64>,
        blocking: bool,
    ) -> Result<Option<Value>, QueueError> {
        let timeout = self.config.block_timeout;

        let raw = match requested.and_then(Priority::from_raw) {
            Some(priority) => {
                let channel = self.channels.get(priority);
                self.backend
                    .dequeue(channel, blocking, timeout)
                    .await?
                    .map(|raw| (channel, raw))
            }
            None => {
                let mut found = None;
                for channel in self.channels.iter() {
                    if let Some(raw) = self.backend.dequeue(channel, false, timeout).await? {
                        found = Some((channel, raw));
                        break;
                    }
                }
                found
            }
        };

        match raw {
            Some((channel, raw)) => {
                debug!(
                    queue = %self.id,
                    channel = channel.name(),
                    priority = %channel.priority(),
                    "Item popped"
                );
                self.decode(raw).map(Some)
            }
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // encoding
    // ------------------------------------------------------------------

    fn encode(&self, item: &Value) -> Result<Vec<u8>, QueueError> {
        if self.config.serialize {
            return Ok(serde_json::to_vec(item)?);
        }

        match item {
            Value::String(s) => Ok(s.clone().into_bytes()),
            other => Err(QueueError::Serialization(format!(
                "serialization is disabled and only string items can be sent raw, got {}",
                value_kind(other)
            ))),
        }
    }

    fn decode(&self, raw: Vec<u8>) -> Result<Value, QueueError> {
        if self.config.serialize {
            return Ok(serde_json::from_slice(&raw)?);
        }

        String::from_utf8(raw)
            .map(Value::String)
            .map_err(|e| QueueError::Serialization(format!("raw payload is not UTF-8: {}", e)))
    }

    fn capture(&mut self, err: &QueueError) {
        self.error = ErrorState {
            code: err.code(),
            message: err.to_string(),
        };
        warn!(queue = %self.id, code = self.error.code, error = %err, "Queue operation failed");
    }

    // ------------------------------------------------------------------
    // hooks
    // ------------------------------------------------------------------

    /// Register a hook for `event`.
    ///
    /// A hook already registered for the event is kept unless `replace` is
    /// set.
    pub fn on<F>(&mut self, event: QueueEvent, hook: F, replace: bool) -> &mut Self
    where
        F: Fn(&HookContext<'_>) + Send + Sync + 'static,
    {
        self.hooks.on(event, Box::new(hook), replace);
        self
    }

    /// Remove the hook for `event`, returning it.
    pub fn off(&mut self, event: QueueEvent) -> Option<Hook> {
        self.hooks.off(event)
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    // ------------------------------------------------------------------
    // accessors
    // ------------------------------------------------------------------

    /// The three levels in scan order.
    pub fn priorities(&self) -> [Priority; 3] {
        Priority::ALL
    }

    pub fn is_priority<P: AsPriority>(&self, priority: P) -> bool {
        priority::is_priority(priority)
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn channel(&self, priority: Priority) -> &Channel {
        self.channels.get(priority)
    }

    pub fn id(&self) -> &QueueId {
        &self.id
    }

    pub fn driver(&self) -> &'static str {
        self.backend.driver()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn QueueBackend {
        self.backend.as_ref()
    }

    pub fn error(&self) -> &ErrorState {
        &self.error
    }

    pub fn error_code(&self) -> i32 {
        self.error.code
    }

    pub fn error_message(&self) -> &str {
        &self.error.message
    }

    /// Forget the last failure so `After*` hooks fire again.
    pub fn clear_error(&mut self) {
        self.error = ErrorState::default();
    }

    /// Drop all hooks and release backend resources. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.hooks.clear();
        self.backend.close();
        debug!(queue = %self.id, "Queue closed");
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("driver", &self.backend.driver())
            .field("id", &self.id)
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("error", &self.error)
            .finish()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Builder for a [`Queue`].
pub struct QueueBuilder {
    backend: Option<Box<dyn QueueBackend>>,
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            config: QueueConfig::default(),
        }
    }

    pub fn backend<B: QueueBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(mut self, id: impl Into<QueueId>) -> Self {
        self.config.id = Some(id.into());
        self
    }

    pub fn serialize(mut self, serialize: bool) -> Self {
        self.config.serialize = serialize;
        self
    }

    pub fn block_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.block_timeout = timeout;
        self
    }

    /// Set a backend-specific option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.extra.insert(key.into(), value.into());
        self
    }

    /// Build the queue. Without an explicit backend, shared memory is used.
    pub fn build(self) -> Result<Queue, BackendError> {
        match self.backend {
            Some(backend) => Ok(Queue::with_backend(backend, self.config)),
            None => Queue::shm(self.config),
        }
    }
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}
