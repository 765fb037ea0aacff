use async_trait::async_trait;
use dashmap::DashMap;
use ferrylink_core::{
    KeyRecord, Mapping, NewUser, Result, ShortKey, StorageError, UrlRecord, UrlStore, User,
    UserStore,
};
use jiff::Timestamp;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// In-memory storage entry for a mapping.
#[derive(Debug, Clone)]
struct Entry {
    original_url: String,
    owner_id: Option<String>,
    created_at: Timestamp,
}

impl Entry {
    fn to_record(&self) -> UrlRecord {
        UrlRecord {
            original_url: self.original_url.clone(),
            owner_id: self.owner_id.clone(),
        }
    }
}

/// Forward and reverse indices. Only ever touched together under one lock.
#[derive(Debug, Default)]
struct Indices {
    forward: HashMap<ShortKey, Entry>,
    reverse: HashMap<String, ShortKey>,
}

/// Self-contained [`UrlStore`] with no persistence and no expiry.
///
/// Both indices sit behind a single reader/writer lock, so every mutation
/// updates forward and reverse entries together and readers never observe a
/// half-applied change. A URL already bound to another key is rejected on
/// `put` with [`StorageError::Conflict`], matching the durable store's
/// unique constraint.
///
/// Clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    indices: Arc<RwLock<Indices>>,
    users: Arc<DashMap<String, User>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mappings currently stored.
    pub fn len(&self) -> usize {
        self.indices.read().forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UrlStore for InMemoryStore {
    async fn put(&self, key: &ShortKey, original_url: &str, owner_id: Option<&str>) -> Result<()> {
        trace!(key = %key, "Storing mapping in memory");
        let mut guard = self.indices.write();
        let indices = &mut *guard;

        if let Some(bound) = indices.reverse.get(original_url) {
            if bound != key {
                return Err(StorageError::Conflict(original_url.to_string()));
            }
        }

        let previous_url = match indices.forward.get_mut(key) {
            Some(entry) => Some(std::mem::replace(
                &mut entry.original_url,
                original_url.to_string(),
            )),
            None => {
                indices.forward.insert(
                    key.clone(),
                    Entry {
                        original_url: original_url.to_string(),
                        owner_id: owner_id.map(str::to_string),
                        created_at: Timestamp::now(),
                    },
                );
                None
            }
        };

        if let Some(previous_url) = previous_url {
            indices.reverse.remove(&previous_url);
        }
        indices
            .reverse
            .insert(original_url.to_string(), key.clone());

        Ok(())
    }

    async fn resolve_by_key(&self, key: &ShortKey) -> Result<Option<UrlRecord>> {
        let indices = self.indices.read();
        Ok(indices.forward.get(key).map(Entry::to_record))
    }

    async fn resolve_by_url(&self, original_url: &str) -> Result<Option<KeyRecord>> {
        let indices = self.indices.read();

        let Some(key) = indices.reverse.get(original_url) else {
            return Ok(None);
        };

        Ok(indices.forward.get(key).map(|entry| KeyRecord {
            key: key.clone(),
            owner_id: entry.owner_id.clone(),
        }))
    }

    async fn exists(&self, key: &ShortKey) -> Result<bool> {
        Ok(self.indices.read().forward.contains_key(key))
    }

    async fn update(&self, key: &ShortKey, new_url: &str) -> Result<bool> {
        trace!(key = %key, "Updating mapping in memory");
        let mut guard = self.indices.write();
        let indices = &mut *guard;

        if let Some(bound) = indices.reverse.get(new_url) {
            // Already pointing there: a no-op update succeeds.
            return Ok(bound == key);
        }

        let Some(entry) = indices.forward.get_mut(key) else {
            return Ok(false);
        };

        let previous_url = std::mem::replace(&mut entry.original_url, new_url.to_string());
        indices.reverse.remove(&previous_url);
        indices.reverse.insert(new_url.to_string(), key.clone());

        Ok(true)
    }

    async fn delete(&self, key: &ShortKey) -> Result<bool> {
        trace!(key = %key, "Deleting mapping from memory");
        let mut guard = self.indices.write();
        let indices = &mut *guard;

        let Some(entry) = indices.forward.remove(key) else {
            return Ok(false);
        };

        if indices.reverse.get(&entry.original_url) == Some(key) {
            indices.reverse.remove(&entry.original_url);
        }

        Ok(true)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get_or_create_user(&self, user: NewUser) -> Result<User> {
        let stored = self
            .users
            .entry(user.id.clone())
            .or_insert_with(|| User {
                id: user.id,
                email: user.email,
                name: user.name,
                picture: user.picture,
                created_at: Timestamp::now(),
            });

        Ok(stored.clone())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Mapping>> {
        let indices = self.indices.read();

        let mut mappings: Vec<Mapping> = indices
            .forward
            .iter()
            .filter(|(_, entry)| entry.owner_id.as_deref() == Some(owner_id))
            .map(|(key, entry)| Mapping {
                key: key.clone(),
                original_url: entry.original_url.clone(),
                owner_id: entry.owner_id.clone(),
                created_at: entry.created_at,
            })
            .collect();

        mappings.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.key.cmp(&b.key))
        });

        Ok(mappings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ShortKey {
        ShortKey::new_unchecked(s)
    }

    fn assert_bidirectional(store: &InMemoryStore) {
        let indices = store.indices.read();
        assert_eq!(indices.forward.len(), indices.reverse.len());
        for (k, entry) in &indices.forward {
            assert_eq!(indices.reverse.get(&entry.original_url), Some(k));
        }
    }

    #[tokio::test]
    async fn put_and_resolve() {
        let store = InMemoryStore::new();

        store
            .put(&key("abc123"), "https://example.com", None)
            .await
            .unwrap();

        let record = store.resolve_by_key(&key("abc123")).await.unwrap().unwrap();
        assert_eq!(record.original_url, "https://example.com");
        assert_eq!(record.owner_id, None);

        let reverse = store
            .resolve_by_url("https://example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reverse.key, key("abc123"));
    }

    #[tokio::test]
    async fn resolve_nonexistent() {
        let store = InMemoryStore::new();

        assert!(store.resolve_by_key(&key("nope")).await.unwrap().is_none());
        assert!(store
            .resolve_by_url("https://nowhere.example")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn put_keeps_owner() {
        let store = InMemoryStore::new();

        store
            .put(&key("abc123"), "https://example.com", Some("user-1"))
            .await
            .unwrap();

        let record = store.resolve_by_key(&key("abc123")).await.unwrap().unwrap();
        assert_eq!(record.owner_id.as_deref(), Some("user-1"));
        let reverse = store
            .resolve_by_url("https://example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reverse.owner_id.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn put_overwrite_moves_reverse_entry() {
        let store = InMemoryStore::new();

        store.put(&key("abc123"), "https://old.example", None).await.unwrap();
        store.put(&key("abc123"), "https://new.example", None).await.unwrap();

        let record = store.resolve_by_key(&key("abc123")).await.unwrap().unwrap();
        assert_eq!(record.original_url, "https://new.example");
        assert!(store
            .resolve_by_url("https://old.example")
            .await
            .unwrap()
            .is_none());
        assert_bidirectional(&store);
    }

    #[tokio::test]
    async fn put_rejects_url_bound_to_other_key() {
        let store = InMemoryStore::new();

        store.put(&key("aaaa11"), "https://example.com", None).await.unwrap();
        let err = store
            .put(&key("bbbb22"), "https://example.com", None)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Conflict(_)));
        assert!(!store.exists(&key("bbbb22")).await.unwrap());
        assert_bidirectional(&store);
    }

    #[tokio::test]
    async fn put_same_pair_twice_is_idempotent() {
        let store = InMemoryStore::new();

        store.put(&key("abc123"), "https://example.com", None).await.unwrap();
        store.put(&key("abc123"), "https://example.com", None).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_bidirectional(&store);
    }

    #[tokio::test]
    async fn update_rebinds_both_indices() {
        let store = InMemoryStore::new();

        store.put(&key("abc123"), "https://example.com", None).await.unwrap();
        assert!(store
            .update(&key("abc123"), "https://example.org")
            .await
            .unwrap());

        let record = store.resolve_by_key(&key("abc123")).await.unwrap().unwrap();
        assert_eq!(record.original_url, "https://example.org");
        assert!(store
            .resolve_by_url("https://example.com")
            .await
            .unwrap()
            .is_none());
        assert_bidirectional(&store);
    }

    #[tokio::test]
    async fn update_missing_key() {
        let store = InMemoryStore::new();

        assert!(!store
            .update(&key("abc123"), "https://example.org")
            .await
            .unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn update_conflict_leaves_both_mappings() {
        let store = InMemoryStore::new();

        store.put(&key("aaaa11"), "https://x.example", None).await.unwrap();
        store.put(&key("bbbb22"), "https://y.example", None).await.unwrap();

        assert!(!store
            .update(&key("aaaa11"), "https://y.example")
            .await
            .unwrap());

        let a = store.resolve_by_key(&key("aaaa11")).await.unwrap().unwrap();
        let b = store.resolve_by_key(&key("bbbb22")).await.unwrap().unwrap();
        assert_eq!(a.original_url, "https://x.example");
        assert_eq!(b.original_url, "https://y.example");
        assert_bidirectional(&store);
    }

    #[tokio::test]
    async fn update_to_same_url_succeeds() {
        let store = InMemoryStore::new();

        store.put(&key("abc123"), "https://example.com", None).await.unwrap();
        assert!(store
            .update(&key("abc123"), "https://example.com")
            .await
            .unwrap());
        assert_bidirectional(&store);
    }

    #[tokio::test]
    async fn delete_removes_both_indices() {
        let store = InMemoryStore::new();

        store.put(&key("abc123"), "https://example.com", None).await.unwrap();
        assert!(store.delete(&key("abc123")).await.unwrap());

        assert!(store.resolve_by_key(&key("abc123")).await.unwrap().is_none());
        assert!(store
            .resolve_by_url("https://example.com")
            .await
            .unwrap()
            .is_none());
        assert!(!store.exists(&key("abc123")).await.unwrap());
        assert!(!store.delete(&key("abc123")).await.unwrap());
    }

    #[tokio::test]
    async fn concrete_lifecycle() {
        let store = InMemoryStore::new();
        let k = key("abc123");

        store.put(&k, "https://example.com", None).await.unwrap();
        assert_eq!(
            store.resolve_by_key(&k).await.unwrap(),
            Some(UrlRecord {
                original_url: "https://example.com".to_string(),
                owner_id: None,
            })
        );
        assert_eq!(
            store.resolve_by_url("https://example.com").await.unwrap(),
            Some(KeyRecord {
                key: k.clone(),
                owner_id: None,
            })
        );

        assert!(store.update(&k, "https://example.org").await.unwrap());
        assert_eq!(
            store.resolve_by_key(&k).await.unwrap().unwrap().original_url,
            "https://example.org"
        );
        assert!(store
            .resolve_by_url("https://example.com")
            .await
            .unwrap()
            .is_none());

        assert!(store.delete(&k).await.unwrap());
        assert!(store.resolve_by_key(&k).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_by_owner_newest_first() {
        let store = InMemoryStore::new();

        store.put(&key("first1"), "https://1.example", Some("owner")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.put(&key("other1"), "https://2.example", Some("someone")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.put(&key("second"), "https://3.example", Some("owner")).await.unwrap();
        store.put(&key("anon11"), "https://4.example", None).await.unwrap();

        let listed: Vec<String> = store
            .list_by_owner("owner")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.key.into_inner())
            .collect();

        assert_eq!(listed, vec!["second".to_string(), "first1".to_string()]);
    }

    #[tokio::test]
    async fn get_or_create_user_keeps_first_profile() {
        let store = InMemoryStore::new();
        let user = NewUser {
            id: "user-1".to_string(),
            email: "one@example.com".to_string(),
            name: Some("One".to_string()),
            picture: None,
        };

        let created = store.get_or_create_user(user.clone()).await.unwrap();
        let again = store
            .get_or_create_user(NewUser {
                email: "changed@example.com".to_string(),
                ..user
            })
            .await
            .unwrap();

        assert_eq!(created, again);
        assert_eq!(again.email, "one@example.com");
    }

    #[tokio::test]
    async fn concurrent_access_keeps_indices_consistent() {
        let store = InMemoryStore::new();
        let mut handles = vec![];

        for i in 0..20u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let k = ShortKey::new_unchecked(format!("key{:03}", i));
                store
                    .put(&k, &format!("https://example{}.com", i), None)
                    .await
                    .unwrap();
                if i % 2 == 0 {
                    store
                        .update(&k, &format!("https://moved{}.com", i))
                        .await
                        .unwrap();
                }
                if i % 5 == 0 {
                    store.delete(&k).await.unwrap();
                }
            }));
        }

        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let _ = store.resolve_by_url("https://example1.com").await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 16);
        assert_bidirectional(&store);
    }
}
