use crate::error::Result;
use crate::key::ShortKey;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A stored key to URL binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub key: ShortKey,
    /// The redirect target.
    pub original_url: String,
    /// The user who created the mapping; `None` in anonymous mode.
    pub owner_id: Option<String>,
    /// Set once on creation, never mutated.
    pub created_at: Timestamp,
}

/// Result of a forward (key to URL) lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub original_url: String,
    pub owner_id: Option<String>,
}

/// Result of a reverse (URL to key) lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key: ShortKey,
    pub owner_id: Option<String>,
}

/// The capability set shared by every storage backend.
///
/// Implementations keep the forward (key to URL) and reverse (URL to key)
/// indices pairwise consistent: whenever `key -> url` resolves, `url -> key`
/// resolves too, and every mutation updates both.
///
/// Every method may block on backend I/O. Callers must not hold their own
/// locks across these calls.
#[async_trait]
pub trait UrlStore: Send + Sync + 'static {
    /// Inserts or overwrites the mapping for `key` and (re)establishes the
    /// reverse entry for `original_url`.
    async fn put(&self, key: &ShortKey, original_url: &str, owner_id: Option<&str>) -> Result<()>;

    /// Looks up the URL bound to `key`. Returns `None` if the key is absent.
    async fn resolve_by_key(&self, key: &ShortKey) -> Result<Option<UrlRecord>>;

    /// Looks up the key bound to `original_url`. Returns `None` if no key maps to it.
    async fn resolve_by_url(&self, original_url: &str) -> Result<Option<KeyRecord>>;

    /// Checks whether `key` is currently bound.
    ///
    /// An expired or deleted key reports `false`.
    async fn exists(&self, key: &ShortKey) -> Result<bool>;

    /// Rebinds an existing key to `new_url`.
    ///
    /// Returns `false` if the key does not exist or if `new_url` is already
    /// bound to a different key. Rebinding to the current URL succeeds.
    async fn update(&self, key: &ShortKey, new_url: &str) -> Result<bool>;

    /// Removes both the forward and the reverse entry for `key`.
    /// Returns `true` if a mapping existed and was removed.
    async fn delete(&self, key: &ShortKey) -> Result<bool>;

    /// Releases backend resources. Calling it more than once is harmless.
    async fn shutdown(&self) -> Result<()>;
}
