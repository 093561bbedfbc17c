//! Redis-backed failure list (the `<namespace>:failed` list workers append to).

use std::sync::Arc;

use tracing::instrument;

use super::store::{FailureList, FailureStoreError, RawFailure};

/// Default key namespace used by the job system.
pub const DEFAULT_NAMESPACE: &str = "resque";

#[derive(Debug, Clone)]
pub struct RedisFailureList {
    client: Arc<redis::Client>,
    key: String,
}

impl RedisFailureList {
    /// Open a failure list.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `namespace` - key namespace (default: "resque"); the list lives at `<namespace>:failed`
    pub fn new(redis_url: impl AsRef<str>, namespace: Option<&str>) -> Result<Self, FailureStoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| FailureStoreError::Connection(e.to_string()))?;

        Ok(Self::with_client(Arc::new(client), namespace))
    }

    /// Share an existing client.
    pub fn with_client(client: Arc<redis::Client>, namespace: Option<&str>) -> Self {
        let namespace = namespace.unwrap_or(DEFAULT_NAMESPACE);
        Self {
            client,
            key: format!("{namespace}:failed"),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn connection(&self) -> Result<redis::Connection, FailureStoreError> {
        self.client
            .get_connection()
            .map_err(|e| FailureStoreError::Connection(e.to_string()))
    }
}

/// LRANGE stop index for reading `count` entries from `start`.
fn lrange_stop(start: isize, count: usize) -> isize {
    let count = isize::try_from(count).unwrap_or(isize::MAX);
    let stop = start.saturating_add(count).saturating_sub(1);
    // A window reaching past the tail must not wrap around to the head.
    if start < 0 && stop >= 0 { -1 } else { stop }
}

/// Coerce a range reply into a sequence: nil reads as empty, a lone bulk
/// string as a single entry.
fn normalize_range_reply(reply: redis::Value) -> Result<Vec<RawFailure>, FailureStoreError> {
    match reply {
        redis::Value::Nil => Ok(Vec::new()),
        redis::Value::Data(bytes) => Ok(vec![utf8_entry(bytes)?]),
        redis::Value::Status(s) => Ok(vec![s]),
        redis::Value::Bulk(items) => items
            .into_iter()
            .filter_map(|item| match item {
                redis::Value::Nil => None,
                redis::Value::Data(bytes) => Some(utf8_entry(bytes)),
                redis::Value::Status(s) => Some(Ok(s)),
                other => Some(Err(FailureStoreError::Command(format!(
                    "unexpected list entry: {other:?}"
                )))),
            })
            .collect(),
        other => Err(FailureStoreError::Command(format!("unexpected range reply: {other:?}"))),
    }
}

/// Entries are later deleted by exact value, so they must decode without loss.
fn utf8_entry(bytes: Vec<u8>) -> Result<RawFailure, FailureStoreError> {
    String::from_utf8(bytes)
        .map_err(|e| FailureStoreError::Command(format!("list entry is not valid UTF-8: {e}")))
}

impl FailureList for RedisFailureList {
    fn len(&self) -> Result<usize, FailureStoreError> {
        let mut conn = self.connection()?;
        redis::cmd("LLEN")
            .arg(&self.key)
            .query(&mut conn)
            .map_err(|e| FailureStoreError::Command(format!("LLEN failed: {}", e)))
    }

    #[instrument(skip(self), fields(key = %self.key), err)]
    fn range(&self, start: isize, count: usize) -> Result<Vec<RawFailure>, FailureStoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.connection()?;
        let reply: redis::Value = redis::cmd("LRANGE")
            .arg(&self.key)
            .arg(start)
            .arg(lrange_stop(start, count))
            .query(&mut conn)
            .map_err(|e| FailureStoreError::Command(format!("LRANGE failed: {}", e)))?;

        normalize_range_reply(reply)
    }

    fn get(&self, index: usize) -> Result<Option<RawFailure>, FailureStoreError> {
        let mut conn = self.connection()?;
        let reply: redis::Value = redis::cmd("LINDEX")
            .arg(&self.key)
            .arg(index)
            .query(&mut conn)
            .map_err(|e| FailureStoreError::Command(format!("LINDEX failed: {}", e)))?;

        Ok(normalize_range_reply(reply)?.into_iter().next())
    }

    fn remove_one(&self, raw: &str) -> Result<usize, FailureStoreError> {
        let mut conn = self.connection()?;
        redis::cmd("LREM")
            .arg(&self.key)
            .arg(1)
            .arg(raw)
            .query(&mut conn)
            .map_err(|e| FailureStoreError::Command(format!("LREM failed: {}", e)))
    }

    fn set(&self, index: usize, raw: RawFailure) -> Result<(), FailureStoreError> {
        let mut conn = self.connection()?;
        redis::cmd("LSET")
            .arg(&self.key)
            .arg(index)
            .arg(raw)
            .query::<()>(&mut conn)
            .map_err(|e| FailureStoreError::Command(format!("LSET failed: {}", e)))
    }

    #[instrument(skip(self), fields(key = %self.key), err)]
    fn trim_to_last(&self, n: usize) -> Result<(), FailureStoreError> {
        let mut conn = self.connection()?;

        // LTRIM key -0 -1 would keep everything.
        if n == 0 {
            return redis::cmd("DEL")
                .arg(&self.key)
                .query::<()>(&mut conn)
                .map_err(|e| FailureStoreError::Command(format!("DEL failed: {}", e)));
        }

        let start = -isize::try_from(n).unwrap_or(isize::MAX);
        redis::cmd("LTRIM")
            .arg(&self.key)
            .arg(start)
            .arg(-1)
            .query::<()>(&mut conn)
            .map_err(|e| FailureStoreError::Command(format!("LTRIM failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_index_covers_requested_count() {
        assert_eq!(lrange_stop(0, 10), 9);
        assert_eq!(lrange_stop(5, 1), 5);
        assert_eq!(lrange_stop(-10, 10), -1);
        assert_eq!(lrange_stop(-3, 2), -2);
        assert_eq!(lrange_stop(-2, 5), -1);
    }

    #[test]
    fn range_replies_are_always_sequences() {
        assert!(normalize_range_reply(redis::Value::Nil).unwrap().is_empty());

        let single = normalize_range_reply(redis::Value::Data(b"{\"a\":1}".to_vec())).unwrap();
        assert_eq!(single, vec!["{\"a\":1}".to_string()]);

        let many = normalize_range_reply(redis::Value::Bulk(vec![
            redis::Value::Data(b"x".to_vec()),
            redis::Value::Data(b"y".to_vec()),
        ]))
        .unwrap();
        assert_eq!(many, vec!["x".to_string(), "y".to_string()]);

        assert!(normalize_range_reply(redis::Value::Int(3)).is_err());
    }

    #[test]
    fn non_utf8_entries_are_errors_not_replacements() {
        let single = normalize_range_reply(redis::Value::Data(vec![b'{', 0xFF, b'}']));
        assert!(matches!(single, Err(FailureStoreError::Command(_))));

        let many = normalize_range_reply(redis::Value::Bulk(vec![
            redis::Value::Data(b"ok".to_vec()),
            redis::Value::Data(vec![0xC3, 0x28]),
        ]));
        assert!(matches!(many, Err(FailureStoreError::Command(_))));
    }

    #[test]
    fn key_uses_namespace() {
        let list = RedisFailureList::new("redis://127.0.0.1:6379", None).unwrap();
        assert_eq!(list.key(), "resque:failed");

        let list = RedisFailureList::new("redis://127.0.0.1:6379", Some("app")).unwrap();
        assert_eq!(list.key(), "app:failed");
    }
}
