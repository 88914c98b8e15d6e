//! Backend-agnostic error types for queue backends.
//!
//! Every backend maps its internal failures onto [`BackendError`] so the
//! engine can capture them uniformly. An empty channel is never an error;
//! backends report it as `Ok(None)`.

use thiserror::Error;

/// Errors that can occur during backend operations.
///
/// # Examples
///
/// ```rust
/// use tierq::BackendError;
///
/// fn handle_error(err: BackendError) {
///     match err {
///         BackendError::Unavailable(msg) => {
///             // Connection lost, retry later
///             eprintln!("Backend unavailable: {}", msg);
///         }
///         BackendError::CapacityExceeded { .. } => {
///             eprintln!("Segment full: {}", err);
///         }
///         _ => {
///             eprintln!("Error: {}", err);
///         }
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum BackendError {
    /// Backend is unavailable (connection lost, service down, etc.)
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Timeout while talking to the backend
    #[error("operation timeout: {0}")]
    Timeout(String),

    /// A bounded resource has no room left for the payload
    #[error("capacity exceeded on key {key}: {requested} bytes requested, {available} available")]
    CapacityExceeded {
        key: i64,
        requested: usize,
        available: usize,
    },

    /// The resource was closed and can no longer be used
    #[error("resource closed: {0}")]
    Closed(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BackendError {
    /// Returns true if this error is potentially recoverable with a retry.
    ///
    /// The engine itself never retries; this is a hint for callers that
    /// inspect the captured error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Unavailable(_)
                | BackendError::Timeout(_)
                | BackendError::CapacityExceeded { .. }
        )
    }

    /// Stable numeric code recorded in the queue's error state.
    pub fn code(&self) -> i32 {
        match self {
            BackendError::Unavailable(_) => 1001,
            BackendError::Timeout(_) => 1002,
            BackendError::CapacityExceeded { .. } => 1003,
            BackendError::Closed(_) => 1004,
            BackendError::Configuration(_) => 1005,
        }
    }
}

// Conversion from Redis errors
#[cfg(feature = "redis")]
impl From<redis::RedisError> for BackendError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(err.to_string())
        } else {
            BackendError::Unavailable(err.to_string())
        }
    }
}
