use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::priority::leading_int;

/// Name of a logical queue: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueueId {
    Number(i64),
    Name(String),
}

impl QueueId {
    /// Integer form used for numeric channel keys.
    ///
    /// Names follow leading-integer coercion: `"42"` and `"42abc"` become 42,
    /// `"orders"` becomes 0.
    pub fn as_int(&self) -> i64 {
        match self {
            QueueId::Number(n) => *n,
            QueueId::Name(name) => leading_int(name),
        }
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueId::Number(n) => write!(f, "{}", n),
            QueueId::Name(name) => f.write_str(name),
        }
    }
}

impl From<&str> for QueueId {
    fn from(name: &str) -> Self {
        QueueId::Name(name.to_string())
    }
}

impl From<String> for QueueId {
    fn from(name: String) -> Self {
        QueueId::Name(name)
    }
}

impl From<i64> for QueueId {
    fn from(n: i64) -> Self {
        QueueId::Number(n)
    }
}

impl From<i32> for QueueId {
    fn from(n: i32) -> Self {
        QueueId::Number(n.into())
    }
}

/// Engine configuration.
///
/// Keys other than `id`, `serialize` and `blockTimeout` are kept in
/// [`extra`](Self::extra) for backends to consume; the engine ignores them.
///
/// ```rust
/// use serde_json::json;
/// use tierq::QueueConfig;
///
/// let config = QueueConfig::from_value(json!({
///     "id": 42,
///     "serialize": false,
///     "size": 1024,
/// }))
/// .unwrap();
///
/// assert!(!config.serialize);
/// assert_eq!(config.extra["size"], json!(1024));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Queue identity; the backend picks a default when absent
    #[serde(default)]
    pub id: Option<QueueId>,
    /// Encode payloads as JSON before they reach the backend
    #[serde(default = "default_serialize")]
    pub serialize: bool,
    /// Upper bound on a blocking pop, in seconds on the wire
    #[serde(default = "default_block_timeout", with = "duration_secs")]
    pub block_timeout: Duration,
    /// Backend-specific options
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

fn default_serialize() -> bool {
    true
}

fn default_block_timeout() -> Duration {
    Duration::from_secs(3)
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            id: None,
            serialize: default_serialize(),
            block_timeout: default_block_timeout(),
            extra: HashMap::new(),
        }
    }
}

impl QueueConfig {
    /// Default configuration with an explicit queue id.
    pub fn with_id(id: impl Into<QueueId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Parse a configuration object, filling in defaults for missing keys.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn serialize(mut self, serialize: bool) -> Self {
        self.serialize = serialize;
        self
    }

    pub fn block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    /// Set a backend-specific option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert!(config.id.is_none());
        assert!(config.serialize);
        assert_eq!(config.block_timeout, Duration::from_secs(3));
        assert!(config.extra.is_empty());
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        let config = QueueConfig::from_value(json!({
            "id": "orders",
            "blockTimeout": 0.5,
            "tmpDir": "/var/tmp",
            "project": "billing",
        }))
        .unwrap();

        assert_eq!(config.id, Some(QueueId::from("orders")));
        assert!(config.serialize);
        assert_eq!(config.block_timeout, Duration::from_millis(500));
        assert_eq!(config.extra.len(), 2);
        assert_eq!(config.extra["tmpDir"], json!("/var/tmp"));
    }

    #[test]
    fn test_numeric_id() {
        let config = QueueConfig::from_value(json!({ "id": 7 })).unwrap();
        assert_eq!(config.id, Some(QueueId::Number(7)));
    }

    #[test]
    fn test_id_integer_coercion() {
        assert_eq!(QueueId::from(12).as_int(), 12);
        assert_eq!(QueueId::from("12").as_int(), 12);
        assert_eq!(QueueId::from("12jobs").as_int(), 12);
        assert_eq!(QueueId::from("orders").as_int(), 0);
    }
}
