use async_trait::async_trait;
use ferrylink_core::{CacheError, KeyRecord, Result, ShortKey, UrlRecord, UrlStore};
use moka::future::Cache;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

/// An in-process cache tier built on Moka.
///
/// Mirrors the two-slot layout of [`RedisStore`](crate::RedisStore): a
/// forward cache from key to record and a reverse cache from URL to key,
/// both expiring after the same TTL. Mutations are serialized so the two
/// caches never disagree about a live pair.
#[derive(Debug, Clone)]
pub struct MokaStore {
    forward: Cache<String, UrlRecord>,
    reverse: Cache<String, String>,
    writes: Arc<Mutex<()>>,
    closed: Arc<AtomicBool>,
}

impl MokaStore {
    /// Creates a cache holding up to 10,000 mappings that expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        MokaSettings::builder().ttl(ttl).build().into()
    }

    /// Returns a builder for a custom configuration.
    pub fn builder() -> MokaSettingsBuilder {
        MokaSettings::builder()
    }

    fn ensure_open(&self) -> std::result::Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Unavailable("moka store is shut down".to_string()));
        }
        Ok(())
    }

    /// Returns the key the reverse slot points at, if its forward slot agrees.
    async fn live_owner_of(&self, original_url: &str) -> Option<String> {
        let key = self.reverse.get(original_url).await?;
        match self.forward.get(&key).await {
            Some(record) if record.original_url == original_url => Some(key),
            _ => None,
        }
    }
}

/// Configuration for a [`MokaStore`].
#[derive(Debug, TypedBuilder)]
pub struct MokaSettings {
    /// Maximum number of mappings held in each direction.
    #[builder(default = 10_000)]
    max_capacity: u64,
    /// Time-to-live for both slots of a mapping.
    #[builder(default = Duration::from_secs(3600))]
    ttl: Duration,
}

impl From<MokaSettings> for MokaStore {
    fn from(settings: MokaSettings) -> Self {
        let forward = Cache::builder()
            .max_capacity(settings.max_capacity)
            .time_to_live(settings.ttl)
            .build();
        let reverse = Cache::builder()
            .max_capacity(settings.max_capacity)
            .time_to_live(settings.ttl)
            .build();

        MokaStore {
            forward,
            reverse,
            writes: Arc::new(Mutex::new(())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl UrlStore for MokaStore {
    async fn put(&self, key: &ShortKey, original_url: &str, owner_id: Option<&str>) -> Result<()> {
        trace!(key = %key, "Storing mapping in Moka");
        self.ensure_open()?;
        let _guard = self.writes.lock().await;

        if let Some(previous) = self.forward.get(key.as_str()).await {
            if previous.original_url != original_url {
                self.reverse.invalidate(&previous.original_url).await;
            }
        }

        if let Some(other) = self.reverse.get(original_url).await {
            if other != key.as_str() {
                debug!(key = %key, evicted = %other, "Evicting cache entry that claimed the same url");
                self.forward.invalidate(&other).await;
            }
        }

        let record = UrlRecord {
            original_url: original_url.to_string(),
            owner_id: owner_id.map(str::to_string),
        };
        self.forward.insert(key.as_str().to_string(), record).await;
        self.reverse
            .insert(original_url.to_string(), key.as_str().to_string())
            .await;

        debug!(key = %key, "Cached mapping in Moka");
        Ok(())
    }

    async fn resolve_by_key(&self, key: &ShortKey) -> Result<Option<UrlRecord>> {
        self.ensure_open()?;

        match self.forward.get(key.as_str()).await {
            Some(record) => {
                debug!(key = %key, "Cache hit in Moka");
                Ok(Some(record))
            }
            None => {
                trace!(key = %key, "Cache miss in Moka");
                Ok(None)
            }
        }
    }

    async fn resolve_by_url(&self, original_url: &str) -> Result<Option<KeyRecord>> {
        self.ensure_open()?;

        let Some(key) = self.reverse.get(original_url).await else {
            return Ok(None);
        };

        match self.forward.get(&key).await {
            Some(record) if record.original_url == original_url => Ok(Some(KeyRecord {
                key: ShortKey::new_unchecked(key),
                owner_id: record.owner_id,
            })),
            _ => Ok(None),
        }
    }

    async fn exists(&self, key: &ShortKey) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.forward.contains_key(key.as_str()))
    }

    async fn update(&self, key: &ShortKey, new_url: &str) -> Result<bool> {
        trace!(key = %key, "Updating mapping in Moka");
        self.ensure_open()?;
        let _guard = self.writes.lock().await;

        let Some(mut record) = self.forward.get(key.as_str()).await else {
            return Ok(false);
        };

        if record.original_url == new_url {
            return Ok(true);
        }

        if let Some(other) = self.live_owner_of(new_url).await {
            if other != key.as_str() {
                debug!(key = %key, bound_to = %other, "Target url already cached for another key");
                return Ok(false);
            }
        }

        let old_url = std::mem::replace(&mut record.original_url, new_url.to_string());
        self.reverse.invalidate(&old_url).await;
        self.forward.insert(key.as_str().to_string(), record).await;
        self.reverse
            .insert(new_url.to_string(), key.as_str().to_string())
            .await;

        Ok(true)
    }

    async fn delete(&self, key: &ShortKey) -> Result<bool> {
        trace!(key = %key, "Deleting mapping from Moka");
        self.ensure_open()?;
        let _guard = self.writes.lock().await;

        let Some(record) = self.forward.remove(key.as_str()).await else {
            return Ok(false);
        };

        if self.reverse.get(&record.original_url).await.as_deref() == Some(key.as_str()) {
            self.reverse.invalidate(&record.original_url).await;
        }

        debug!(key = %key, "Removed mapping from Moka");
        Ok(true)
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.forward.invalidate_all();
            self.reverse.invalidate_all();
            debug!("Moka store shut down");
        }
        Ok(())
    }
}
