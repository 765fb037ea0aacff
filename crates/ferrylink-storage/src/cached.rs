use async_trait::async_trait;
use ferrylink_core::{
    KeyRecord, Mapping, NewUser, Result, ShortKey, UrlRecord, UrlStore, User, UserStore,
};
use tracing::{debug, trace, warn};

/// A store that fronts a durable tier with a cache tier.
///
/// Reads are cache-aside: the cache is consulted first and, on a miss, the
/// durable store answers and the cache is populated on the way out.
/// Mutations are write-through: the durable store is written first and its
/// outcome decides the result; the cache only mirrors a change the durable
/// store has already committed.
///
/// Cache failures on the read path are logged and treated as misses. On the
/// write path they are returned to the caller, even though the durable copy
/// is already committed at that point.
///
/// There is no cross-tier atomicity. A concurrent reader may see the durable
/// value before the cache mirror catches up; staleness is bounded by the
/// cache TTL.
#[derive(Debug, Clone)]
pub struct CachedStore<C, D> {
    cache: C,
    durable: D,
}

impl<C: UrlStore, D: UrlStore> CachedStore<C, D> {
    /// Creates a new cached store.
    ///
    /// # Arguments
    ///
    /// * `cache` - The volatile tier (e.g. a Redis- or moka-backed store)
    /// * `durable` - The system of record (e.g. [`PostgresStore`](crate::PostgresStore))
    pub fn new(cache: C, durable: D) -> Self {
        Self { cache, durable }
    }

    /// Returns a reference to the cache tier.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Returns a reference to the durable tier.
    pub fn durable(&self) -> &D {
        &self.durable
    }

    /// Mirrors a durable read into the cache.
    ///
    /// The read itself already succeeded, so a failure here is logged and
    /// dropped rather than turned into a caller-visible error.
    async fn populate_best_effort(&self, key: &ShortKey, original_url: &str, owner_id: Option<&str>) {
        match self.cache.put(key, original_url, owner_id).await {
            Ok(()) => debug!(key = %key, "Populated cache from durable store"),
            Err(e) => warn!(key = %key, error = %e, "Failed to populate cache, ignoring"),
        }
    }
}

#[async_trait]
impl<C: UrlStore, D: UrlStore> UrlStore for CachedStore<C, D> {
    async fn put(&self, key: &ShortKey, original_url: &str, owner_id: Option<&str>) -> Result<()> {
        trace!(key = %key, "Writing mapping through to durable store");
        self.durable.put(key, original_url, owner_id).await?;

        if let Err(e) = self.cache.put(key, original_url, owner_id).await {
            warn!(key = %key, error = %e, "Durable write committed but cache write failed");
            return Err(e);
        }

        Ok(())
    }

    async fn resolve_by_key(&self, key: &ShortKey) -> Result<Option<UrlRecord>> {
        match self.cache.resolve_by_key(key).await {
            Ok(Some(record)) => {
                debug!(key = %key, "Cache hit for key");
                return Ok(Some(record));
            }
            Ok(None) => debug!(key = %key, "Cache miss for key"),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache error on resolve, falling back to durable store")
            }
        }

        let record = self.durable.resolve_by_key(key).await?;
        match &record {
            Some(record) => {
                self.populate_best_effort(key, &record.original_url, record.owner_id.as_deref())
                    .await
            }
            None => debug!(key = %key, "Key not found in durable store"),
        }

        Ok(record)
    }

    async fn resolve_by_url(&self, original_url: &str) -> Result<Option<KeyRecord>> {
        match self.cache.resolve_by_url(original_url).await {
            Ok(Some(record)) => {
                debug!(key = %record.key, "Cache hit for original url");
                return Ok(Some(record));
            }
            Ok(None) => debug!("Cache miss for original url"),
            Err(e) => {
                warn!(error = %e, "Cache error on reverse resolve, falling back to durable store")
            }
        }

        let record = self.durable.resolve_by_url(original_url).await?;
        match &record {
            Some(record) => {
                self.populate_best_effort(&record.key, original_url, record.owner_id.as_deref())
                    .await
            }
            None => debug!("Original url not found in durable store"),
        }

        Ok(record)
    }

    async fn exists(&self, key: &ShortKey) -> Result<bool> {
        match self.cache.exists(key).await {
            Ok(true) => {
                debug!(key = %key, "Cache indicates key exists");
                return Ok(true);
            }
            Ok(false) => trace!(key = %key, "Cache miss for existence check"),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache error on existence check, falling back to durable store")
            }
        }

        self.durable.exists(key).await
    }

    async fn update(&self, key: &ShortKey, new_url: &str) -> Result<bool> {
        if !self.durable.update(key, new_url).await? {
            trace!(key = %key, "Durable store rejected update");
            return Ok(false);
        }

        // The cache may not hold the key, or a stale entry for another key
        // may still claim `new_url`. Both sides are dropped so the next read
        // repopulates them from the durable store.
        if !self.cache.update(key, new_url).await? {
            if let Some(stale) = self.cache.resolve_by_url(new_url).await? {
                if stale.key != *key {
                    debug!(key = %key, stale = %stale.key, "Evicting stale claimant of updated url");
                    self.cache.delete(&stale.key).await?;
                }
            }
            debug!(key = %key, "Cache could not mirror update, evicting key");
            self.cache.delete(key).await?;
        }

        Ok(true)
    }

    async fn delete(&self, key: &ShortKey) -> Result<bool> {
        let deleted = self.durable.delete(key).await?;
        if deleted {
            self.cache.delete(key).await?;
        }
        Ok(deleted)
    }

    async fn shutdown(&self) -> Result<()> {
        let durable = self.durable.shutdown().await;
        if let Err(e) = &durable {
            warn!(error = %e, "Failed to shut down durable store");
        }

        let cache = self.cache.shutdown().await;
        if let Err(e) = &cache {
            warn!(error = %e, "Failed to shut down cache store");
        }

        durable.and(cache)
    }
}

#[async_trait]
impl<C: UrlStore, D: UrlStore + UserStore> UserStore for CachedStore<C, D> {
    async fn get_or_create_user(&self, user: NewUser) -> Result<User> {
        self.durable.get_or_create_user(user).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Mapping>> {
        self.durable.list_by_owner(owner_id).await
    }
}
