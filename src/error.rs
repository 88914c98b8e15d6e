use thiserror::Error;

use crate::backend::BackendError;

/// Failure captured by the queue engine during a push or pop.
///
/// These never escape `push`/`pop`; they are stored in the queue's error
/// state and handed to the error hooks.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The storage call itself failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl QueueError {
    /// Non-zero numeric code stored in [`ErrorState`](crate::ErrorState).
    pub fn code(&self) -> i32 {
        match self {
            QueueError::Backend(err) => err.code(),
            QueueError::Serialization(_) => 2001,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}
