use async_trait::async_trait;
use ferrylink_core::{
    KeyRecord, Mapping, NewUser, Result, ShortKey, StorageError, UrlRecord, UrlStore, User,
    UserStore,
};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounds every call on the wrapped store by a deadline.
///
/// A call that overruns is dropped and reported as
/// [`StorageError::Timeout`]. Dropping a [`CachedStore`](crate::CachedStore)
/// call midway can leave the durable write committed without its cache
/// mirror, never the reverse.
#[derive(Debug, Clone)]
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: UrlStore> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Returns a reference to the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn within<T>(&self, operation: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout = ?self.timeout, "Storage operation timed out");
                Err(StorageError::Timeout(format!(
                    "{operation} did not finish within {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl<S: UrlStore> UrlStore for TimeoutStore<S> {
    async fn put(&self, key: &ShortKey, original_url: &str, owner_id: Option<&str>) -> Result<()> {
        self.within("put", self.inner.put(key, original_url, owner_id))
            .await
    }

    async fn resolve_by_key(&self, key: &ShortKey) -> Result<Option<UrlRecord>> {
        self.within("resolve_by_key", self.inner.resolve_by_key(key))
            .await
    }

    async fn resolve_by_url(&self, original_url: &str) -> Result<Option<KeyRecord>> {
        self.within("resolve_by_url", self.inner.resolve_by_url(original_url))
            .await
    }

    async fn exists(&self, key: &ShortKey) -> Result<bool> {
        self.within("exists", self.inner.exists(key)).await
    }

    async fn update(&self, key: &ShortKey, new_url: &str) -> Result<bool> {
        self.within("update", self.inner.update(key, new_url)).await
    }

    async fn delete(&self, key: &ShortKey) -> Result<bool> {
        self.within("delete", self.inner.delete(key)).await
    }

    async fn shutdown(&self) -> Result<()> {
        // Releasing resources is never cut short.
        self.inner.shutdown().await
    }
}

#[async_trait]
impl<S: UrlStore + UserStore> UserStore for TimeoutStore<S> {
    async fn get_or_create_user(&self, user: NewUser) -> Result<User> {
        self.within("get_or_create_user", self.inner.get_or_create_user(user))
            .await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Mapping>> {
        self.within("list_by_owner", self.inner.list_by_owner(owner_id))
            .await
    }
}
