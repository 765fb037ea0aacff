use async_trait::async_trait;
use ferrylink_core::{CacheError, KeyRecord, Result, ShortKey, UrlRecord, UrlStore};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Prefix of the reverse slot, which maps an original URL back to its key.
pub const REVERSE_PREFIX: &str = "original:";

/// Forward slot payload. Anonymous owners are written as an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CachedUrl {
    original_url: String,
    #[serde(default)]
    user_id: String,
}

impl CachedUrl {
    fn new(original_url: &str, owner_id: Option<&str>) -> Self {
        Self {
            original_url: original_url.to_string(),
            user_id: owner_id.unwrap_or_default().to_string(),
        }
    }

    fn owner_id(&self) -> Option<String> {
        (!self.user_id.is_empty()).then(|| self.user_id.clone())
    }
}

fn reverse_slot(original_url: &str) -> String {
    format!("{REVERSE_PREFIX}{original_url}")
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CacheError {
    let message = format!("{operation}: {err}");
    if message.to_ascii_lowercase().contains("timed out") {
        CacheError::Timeout(message)
    } else {
        CacheError::Operation(message)
    }
}

/// A Redis-backed cache tier implementing [`UrlStore`].
///
/// Every mapping occupies two slots that share one TTL, fixed at
/// construction:
///
/// * forward: `key` holds JSON `{"original_url": .., "user_id": ..}`
/// * reverse: `original:<url>` holds the bare key
///
/// Both slots are always written, and removed, in one `MULTI` block. A
/// half-present pair is a miss: reverse lookups only trust a pointer whose
/// forward slot still names the same URL.
///
/// A `put` never fails on a URL claimed by another key; the older entry is
/// evicted instead.
#[derive(Debug, Clone)]
pub struct RedisStore {
    conn: redis::aio::MultiplexedConnection,
    ttl: Duration,
    closed: Arc<AtomicBool>,
}

impl RedisStore {
    /// Creates a store over an existing multiplexed connection.
    ///
    /// # Arguments
    ///
    /// * `conn` - A multiplexed Redis connection
    /// * `ttl` - Time-to-live applied to both slots on every write
    pub fn new(conn: redis::aio::MultiplexedConnection, ttl: Duration) -> Self {
        Self {
            conn,
            ttl,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Opens a connection to `redis_url` and checks it with a `PING`.
    pub async fn connect(redis_url: &str, ttl: Duration) -> std::result::Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            CacheError::Initialization(format!("failed to create Redis client: {e}"))
        })?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Unavailable(format!("failed to connect to Redis: {e}")))?;

        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Unavailable(format!("Redis PING failed: {e}")))?;

        info!(ttl = ?ttl, "Connected to Redis");
        Ok(Self::new(conn, ttl))
    }

    /// Returns the underlying connection handle, e.g. for session storage.
    pub fn connection(&self) -> redis::aio::MultiplexedConnection {
        self.conn.clone()
    }

    /// Returns the TTL applied to every write.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn ttl_millis(&self) -> u64 {
        u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX).max(1)
    }

    fn live_conn(&self) -> std::result::Result<redis::aio::MultiplexedConnection, CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Unavailable("redis store is shut down".to_string()));
        }
        Ok(self.conn.clone())
    }

    async fn read_forward(
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str,
    ) -> std::result::Result<Option<CachedUrl>, CacheError> {
        let raw = conn
            .get::<_, Option<String>>(key)
            .await
            .map_err(|e| map_redis_error("failed to read forward slot", e))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        serde_json::from_str::<CachedUrl>(&raw).map(Some).map_err(|e| {
            warn!(key, error = %e, "Failed to deserialize cached record");
            CacheError::InvalidData(format!("invalid cached value for key '{key}': {e}"))
        })
    }

    async fn read_reverse(
        conn: &mut redis::aio::MultiplexedConnection,
        original_url: &str,
    ) -> std::result::Result<Option<String>, CacheError> {
        conn.get::<_, Option<String>>(reverse_slot(original_url))
            .await
            .map_err(|e| map_redis_error("failed to read reverse slot", e))
    }
}

fn encode(record: &CachedUrl) -> std::result::Result<String, CacheError> {
    serde_json::to_string(record)
        .map_err(|e| CacheError::Serialization(format!("failed to serialize cache value: {e}")))
}

#[async_trait]
impl UrlStore for RedisStore {
    async fn put(&self, key: &ShortKey, original_url: &str, owner_id: Option<&str>) -> Result<()> {
        trace!(key = %key, "Storing mapping in Redis");
        let mut conn = self.live_conn()?;
        let ttl = self.ttl_millis();
        let record = CachedUrl::new(original_url, owner_id);
        let json = encode(&record)?;

        let previous = Self::read_forward(&mut conn, key.as_str()).await.ok().flatten();
        let claimed_by = Self::read_reverse(&mut conn, original_url).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(previous) = previous.filter(|p| p.original_url != original_url) {
            pipe.del(reverse_slot(&previous.original_url)).ignore();
        }
        if let Some(other) = claimed_by.filter(|other| other != key.as_str()) {
            debug!(key = %key, evicted = %other, "Evicting cache entry that claimed the same url");
            pipe.del(other).ignore();
        }
        pipe.pset_ex(key.as_str(), json, ttl).ignore();
        pipe.pset_ex(reverse_slot(original_url), key.as_str(), ttl)
            .ignore();

        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("failed to write mapping to Redis", e))?;

        debug!(key = %key, "Cached mapping in Redis");
        Ok(())
    }

    async fn resolve_by_key(&self, key: &ShortKey) -> Result<Option<UrlRecord>> {
        trace!(key = %key, "Resolving key in Redis");
        let mut conn = self.live_conn()?;

        let record = Self::read_forward(&mut conn, key.as_str()).await?;
        Ok(record.map(|record| UrlRecord {
            owner_id: record.owner_id(),
            original_url: record.original_url,
        }))
    }

    async fn resolve_by_url(&self, original_url: &str) -> Result<Option<KeyRecord>> {
        trace!("Resolving original url in Redis");
        let mut conn = self.live_conn()?;

        let Some(key) = Self::read_reverse(&mut conn, original_url).await? else {
            return Ok(None);
        };

        match Self::read_forward(&mut conn, &key).await? {
            Some(record) if record.original_url == original_url => Ok(Some(KeyRecord {
                owner_id: record.owner_id(),
                key: ShortKey::new_unchecked(key),
            })),
            _ => {
                debug!(key = %key, "Reverse slot points at a missing or stale forward slot");
                Ok(None)
            }
        }
    }

    async fn exists(&self, key: &ShortKey) -> Result<bool> {
        let mut conn = self.live_conn()?;

        let exists = conn
            .exists::<_, bool>(key.as_str())
            .await
            .map_err(|e| map_redis_error("failed to check key in Redis", e))?;
        Ok(exists)
    }

    async fn update(&self, key: &ShortKey, new_url: &str) -> Result<bool> {
        trace!(key = %key, "Updating mapping in Redis");
        let mut conn = self.live_conn()?;

        let Some(mut record) = Self::read_forward(&mut conn, key.as_str()).await? else {
            return Ok(false);
        };

        if record.original_url == new_url {
            return Ok(true);
        }

        if let Some(other) = Self::read_reverse(&mut conn, new_url).await? {
            if other != key.as_str() {
                let still_bound = Self::read_forward(&mut conn, &other)
                    .await?
                    .is_some_and(|r| r.original_url == new_url);
                if still_bound {
                    debug!(key = %key, bound_to = %other, "Target url already cached for another key");
                    return Ok(false);
                }
            }
        }

        let old_url = std::mem::replace(&mut record.original_url, new_url.to_string());
        let json = encode(&record)?;
        let ttl = self.ttl_millis();

        redis::pipe()
            .atomic()
            .del(reverse_slot(&old_url))
            .ignore()
            .pset_ex(key.as_str(), json, ttl)
            .ignore()
            .pset_ex(reverse_slot(new_url), key.as_str(), ttl)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("failed to update mapping in Redis", e))?;

        Ok(true)
    }

    async fn delete(&self, key: &ShortKey) -> Result<bool> {
        trace!(key = %key, "Deleting mapping from Redis");
        let mut conn = self.live_conn()?;

        let Some(record) = Self::read_forward(&mut conn, key.as_str()).await? else {
            return Ok(false);
        };

        redis::pipe()
            .atomic()
            .del(key.as_str())
            .ignore()
            .del(reverse_slot(&record.original_url))
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("failed to delete mapping from Redis", e))?;

        debug!(key = %key, "Removed mapping from Redis");
        Ok(true)
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Redis store shut down");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_slot_format() {
        assert_eq!(
            reverse_slot("https://example.com"),
            "original:https://example.com"
        );
    }

    #[test]
    fn wire_format_matches_layout() {
        let record = CachedUrl::new("https://example.com", Some("user-1"));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"original_url": "https://example.com", "user_id": "user-1"})
        );
    }

    #[test]
    fn anonymous_owner_is_empty_string_on_the_wire() {
        let record = CachedUrl::new("https://example.com", None);

        assert_eq!(record.user_id, "");
        assert_eq!(record.owner_id(), None);
    }

    #[test]
    fn missing_user_id_reads_as_anonymous() {
        let record: CachedUrl =
            serde_json::from_str(r#"{"original_url":"https://example.com"}"#).unwrap();

        assert_eq!(record.owner_id(), None);
    }
}
