//! Redis-backed gate store

use super::GateStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

/// [`GateStore`] over a shared Redis database
///
/// Every call opens its own connection and drops it when done, so a Redis
/// restart never leaves a worker holding a dead handle.
pub struct RedisGateStore {
    client: redis::Client,
}

impl RedisGateStore {
    /// Prepare a client for `url` (e.g. `redis://127.0.0.1:6379/11`)
    ///
    /// No connection is made until the first command.
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Gate(format!("invalid redis url {}: {}", url, e)))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Gate(format!("connection to redis failed: {}", e)))
    }
}

#[async_trait]
impl GateStore for RedisGateStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(|e| Error::Gate(format!("SETEX {} failed: {}", key, e)))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: redis::Value = conn
            .get(key)
            .await
            .map_err(|e| Error::Gate(format!("GET {} failed: {}", key, e)))?;
        Ok(canonical_value(value))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Canonical string form of a Redis reply
///
/// Nil is absent; integers and doubles print in decimal; booleans become `1`
/// or `0`; byte strings decode as (lossy) UTF-8; aggregates are rendered as
/// JSON text.
pub fn canonical_value(value: redis::Value) -> Option<String> {
    match value {
        redis::Value::Nil => None,
        redis::Value::Int(i) => Some(i.to_string()),
        redis::Value::Double(d) => Some(d.to_string()),
        redis::Value::Boolean(b) => Some(if b { "1" } else { "0" }.to_string()),
        redis::Value::BulkString(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        redis::Value::SimpleString(s) => Some(s),
        redis::Value::Okay => Some("OK".to_string()),
        other => Some(to_json(other).to_string()),
    }
}

fn to_json(value: redis::Value) -> serde_json::Value {
    match value {
        redis::Value::Nil => serde_json::Value::Null,
        redis::Value::Int(i) => serde_json::Value::from(i),
        redis::Value::Boolean(b) => serde_json::Value::Bool(b),
        redis::Value::Array(items) | redis::Value::Set(items) => {
            serde_json::Value::Array(items.into_iter().map(to_json).collect())
        }
        redis::Value::Map(pairs) => {
            let object = pairs
                .into_iter()
                .map(|(k, v)| (canonical_value(k).unwrap_or_default(), to_json(v)))
                .collect::<serde_json::Map<_, _>>();
            serde_json::Value::Object(object)
        }
        other => match canonical_value_scalar(other) {
            Some(s) => serde_json::Value::String(s),
            None => serde_json::Value::Null,
        },
    }
}

fn canonical_value_scalar(value: redis::Value) -> Option<String> {
    match value {
        redis::Value::Double(d) => Some(d.to_string()),
        redis::Value::BulkString(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        redis::Value::SimpleString(s) => Some(s),
        redis::Value::Okay => Some("OK".to_string()),
        redis::Value::Nil => None,
        other => Some(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_scalars() {
        assert_eq!(canonical_value(redis::Value::Nil), None);
        assert_eq!(
            canonical_value(redis::Value::BulkString(b"busy".to_vec())).as_deref(),
            Some("busy")
        );
        assert_eq!(
            canonical_value(redis::Value::SimpleString("free".to_string())).as_deref(),
            Some("free")
        );
        assert_eq!(canonical_value(redis::Value::Int(0)).as_deref(), Some("0"));
        assert_eq!(canonical_value(redis::Value::Boolean(true)).as_deref(), Some("1"));
        assert_eq!(canonical_value(redis::Value::Boolean(false)).as_deref(), Some("0"));
    }

    #[test]
    fn test_canonical_aggregates_render_as_json() {
        let value = redis::Value::Array(vec![
            redis::Value::BulkString(b"a".to_vec()),
            redis::Value::Int(2),
            redis::Value::Nil,
        ]);
        assert_eq!(canonical_value(value).as_deref(), Some(r#"["a",2,null]"#));

        let value = redis::Value::Map(vec![(
            redis::Value::SimpleString("state".to_string()),
            redis::Value::BulkString(b"busy".to_vec()),
        )]);
        assert_eq!(canonical_value(value).as_deref(), Some(r#"{"state":"busy"}"#));
    }

    #[test]
    fn test_open_rejects_bad_url() {
        assert!(matches!(RedisGateStore::open("not a url"), Err(Error::Gate(_))));
        assert!(RedisGateStore::open("redis://127.0.0.1:6379/11").is_ok());
    }
}
