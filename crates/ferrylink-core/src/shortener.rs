use crate::key::ShortKey;
use crate::store::UrlRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Parameters for creating a shortened URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortenParams {
    /// The original URL to be shortened.
    pub original_url: String,
    /// The creating user, if any.
    pub owner_id: Option<String>,
}

impl ShortenParams {
    pub fn anonymous(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            owner_id: None,
        }
    }

    pub fn owned(original_url: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            owner_id: Some(owner_id.into()),
        }
    }
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the key for `params.original_url`, minting one if the URL is
    /// not mapped yet.
    async fn shorten(&self, params: ShortenParams) -> Result<ShortKey, Self::Error>;

    /// Resolves a key to its stored URL record.
    async fn resolve(&self, key: &ShortKey) -> Result<Option<UrlRecord>, Self::Error>;

    /// Rebinds a key to a new URL. Returns `false` on a missing key or when
    /// the URL already belongs to another key.
    async fn update(&self, key: &ShortKey, new_url: &str) -> Result<bool, Self::Error>;

    /// Deletes a mapping. Returns `true` if it existed.
    async fn delete(&self, key: &ShortKey) -> Result<bool, Self::Error>;
}
