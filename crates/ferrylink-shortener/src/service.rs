use crate::error::ShortenerError;
use crate::policy::MintPolicy;
use async_trait::async_trait;
use ferrylink_core::{
    KeyRecord, Mapping, NewUser, ShortKey, ShortenParams, Shortener, StorageError, UrlRecord,
    UrlStore, User, UserStore,
};
use ferrylink_generator::Generator;
use std::sync::Arc;
use tracing::{debug, info, trace};
use url::Url;

/// Parses user input into a [`ShortKey`].
pub fn parse_key(raw: &str) -> Result<ShortKey, ShortenerError> {
    Ok(ShortKey::new(raw)?)
}

/// A concrete implementation of the `Shortener` trait.
///
/// Wraps a [`UrlStore`] and a [`Generator`]:
/// - a URL that is already mapped gets its existing key back
/// - otherwise candidates are drawn until one is free, within the
///   [`MintPolicy`] attempt budget
/// - a `put` that loses a race on the same URL yields the winner's key
#[derive(Debug, Clone)]
pub struct ShortenerService<S, G> {
    store: Arc<S>,
    generator: Arc<G>,
    policy: MintPolicy,
}

impl<S: UrlStore, G: Generator> ShortenerService<S, G> {
    /// Creates a service with the default [`MintPolicy`].
    pub fn new(store: S, generator: G) -> Self {
        Self::with_policy(store, generator, MintPolicy::default())
    }

    pub fn with_policy(store: S, generator: G, policy: MintPolicy) -> Self {
        Self {
            store: Arc::new(store),
            generator: Arc::new(generator),
            policy,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &MintPolicy {
        &self.policy
    }

    /// Finds the key already bound to `original_url`, if any.
    pub async fn lookup(&self, original_url: &str) -> Result<Option<KeyRecord>, ShortenerError> {
        Ok(self.store.resolve_by_url(original_url).await?)
    }

    /// Validates that the URL is an absolute http(s) URL with a host.
    fn validate_url(url: &str) -> Result<(), ShortenerError> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }

        let parsed = Url::parse(url)
            .map_err(|e| ShortenerError::InvalidUrl(format!("{url}: {e}")))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL scheme must be http or https: {}",
                parsed.scheme()
            )));
        }

        match parsed.host_str() {
            Some(host) if !host.is_empty() => {}
            _ => {
                return Err(ShortenerError::InvalidUrl(format!(
                    "URL must have a host: {url}"
                )))
            }
        }

        Ok(())
    }

    /// Draws candidates until one can be committed.
    async fn mint(
        &self,
        original_url: &str,
        owner_id: Option<&str>,
    ) -> Result<ShortKey, ShortenerError> {
        let max_attempts = self.policy.max_attempts;

        for failed in 0..max_attempts {
            let length = self.policy.key_length_for(failed);
            let candidate = self.generator.generate(length);

            if self.store.exists(&candidate).await? {
                debug!(key = %candidate, attempt = failed + 1, "Candidate key taken, retrying");
                continue;
            }

            match self.store.put(&candidate, original_url, owner_id).await {
                Ok(()) => {
                    info!(key = %candidate, attempts = failed + 1, "Minted new key");
                    return Ok(candidate);
                }
                Err(StorageError::Conflict(_)) => {
                    // A concurrent shorten bound the same URL first.
                    if let Some(winner) = self.store.resolve_by_url(original_url).await? {
                        debug!(key = %winner.key, "Lost race on url, returning existing key");
                        return Ok(winner.key);
                    }
                    debug!(key = %candidate, "Conflicting mapping vanished, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ShortenerError::ExhaustedKeyspace {
            attempts: max_attempts,
        })
    }
}

impl<S: UrlStore + UserStore, G: Generator> ShortenerService<S, G> {
    /// Lists the mappings created by `owner_id`, newest first.
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Mapping>, ShortenerError> {
        Ok(self.store.list_by_owner(owner_id).await?)
    }

    pub async fn get_or_create_user(&self, user: NewUser) -> Result<User, ShortenerError> {
        Ok(self.store.get_or_create_user(user).await?)
    }
}

#[async_trait]
impl<S: UrlStore, G: Generator> Shortener for ShortenerService<S, G> {
    type Error = ShortenerError;

    async fn shorten(&self, params: ShortenParams) -> Result<ShortKey, ShortenerError> {
        Self::validate_url(&params.original_url)?;
        trace!("Shortening url");

        if let Some(existing) = self.store.resolve_by_url(&params.original_url).await? {
            debug!(key = %existing.key, "Url already mapped, reusing key");
            return Ok(existing.key);
        }

        self.mint(&params.original_url, params.owner_id.as_deref())
            .await
    }

    async fn resolve(&self, key: &ShortKey) -> Result<Option<UrlRecord>, ShortenerError> {
        Ok(self.store.resolve_by_key(key).await?)
    }

    async fn update(&self, key: &ShortKey, new_url: &str) -> Result<bool, ShortenerError> {
        Self::validate_url(new_url)?;
        Ok(self.store.update(key, new_url).await?)
    }

    async fn delete(&self, key: &ShortKey) -> Result<bool, ShortenerError> {
        Ok(self.store.delete(key).await?)
    }
}
