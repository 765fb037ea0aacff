//! Runs against a disposable Postgres container started through testcontainers.

use std::time::Duration;

use ferrylink_core::{NewUser, ShortKey};
use ferrylink_storage::{PostgresStore, StorageError, UrlStore, UserStore};
use ferrylink_test_infra::postgres::{PostgresConfig, PostgresServer};
use sqlx::postgres::PgPoolOptions;

struct Fixture {
    _postgres: PostgresServer,
    store: PostgresStore,
}

impl Fixture {
    async fn start() -> Self {
        let postgres = PostgresServer::new(PostgresConfig::builder().build())
            .await
            .expect("start postgres");
        let url = postgres.database_url().await.expect("postgres url");
        let pool = connect_with_retry(&url).await;

        let store = PostgresStore::new(pool);
        store.migrate().await.expect("create schema");

        Self {
            _postgres: postgres,
            store,
        }
    }
}

async fn connect_with_retry(url: &str) -> sqlx::PgPool {
    let mut last_error = None;

    for _ in 0..20 {
        match PgPoolOptions::new().max_connections(5).connect(url).await {
            Ok(pool) => return pool,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect postgres: {last_error:?}");
}

fn key(value: &str) -> ShortKey {
    ShortKey::new_unchecked(value)
}

#[tokio::test]
async fn put_and_resolve_both_directions() {
    let fixture = Fixture::start().await;
    let k = key("abc123");

    fixture
        .store
        .put(&k, "https://example.com", Some("user-1"))
        .await
        .unwrap();

    let forward = fixture.store.resolve_by_key(&k).await.unwrap().unwrap();
    assert_eq!(forward.original_url, "https://example.com");
    assert_eq!(forward.owner_id.as_deref(), Some("user-1"));

    let reverse = fixture
        .store
        .resolve_by_url("https://example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reverse.key, k);
    assert!(fixture.store.exists(&k).await.unwrap());
}

#[tokio::test]
async fn put_upserts_on_key() {
    let fixture = Fixture::start().await;
    let k = key("abc123");

    fixture.store.put(&k, "https://one.example", None).await.unwrap();
    fixture.store.put(&k, "https://two.example", None).await.unwrap();

    let got = fixture.store.resolve_by_key(&k).await.unwrap().unwrap();
    assert_eq!(got.original_url, "https://two.example");
    assert!(fixture
        .store
        .resolve_by_url("https://one.example")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn put_conflicts_when_url_is_taken() {
    let fixture = Fixture::start().await;

    fixture
        .store
        .put(&key("aaaa11"), "https://example.com", None)
        .await
        .unwrap();

    let err = fixture
        .store
        .put(&key("bbbb22"), "https://example.com", None)
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Conflict(_)));
    assert!(!fixture.store.exists(&key("bbbb22")).await.unwrap());
}

#[tokio::test]
async fn update_lifecycle() {
    let fixture = Fixture::start().await;

    fixture
        .store
        .put(&key("aaaa11"), "https://x.example", None)
        .await
        .unwrap();
    fixture
        .store
        .put(&key("bbbb22"), "https://y.example", None)
        .await
        .unwrap();

    assert!(!fixture
        .store
        .update(&key("aaaa11"), "https://y.example")
        .await
        .unwrap());
    assert!(!fixture
        .store
        .update(&key("nope11"), "https://z.example")
        .await
        .unwrap());
    assert!(fixture
        .store
        .update(&key("aaaa11"), "https://x.example")
        .await
        .unwrap());
    assert!(fixture
        .store
        .update(&key("aaaa11"), "https://z.example")
        .await
        .unwrap());

    let a = fixture
        .store
        .resolve_by_key(&key("aaaa11"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.original_url, "https://z.example");
    assert!(fixture
        .store
        .resolve_by_url("https://x.example")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn delete_removes_row() {
    let fixture = Fixture::start().await;
    let k = key("abc123");

    fixture.store.put(&k, "https://example.com", None).await.unwrap();

    assert!(fixture.store.delete(&k).await.unwrap());
    assert!(fixture.store.resolve_by_key(&k).await.unwrap().is_none());
    assert!(fixture
        .store
        .resolve_by_url("https://example.com")
        .await
        .unwrap()
        .is_none());
    assert!(!fixture.store.delete(&k).await.unwrap());
}

#[tokio::test]
async fn list_by_owner_newest_first() {
    let fixture = Fixture::start().await;

    fixture
        .store
        .put(&key("first1"), "https://1.example", Some("owner"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    fixture
        .store
        .put(&key("second"), "https://2.example", Some("owner"))
        .await
        .unwrap();
    fixture
        .store
        .put(&key("other1"), "https://3.example", Some("someone-else"))
        .await
        .unwrap();

    let listed: Vec<String> = fixture
        .store
        .list_by_owner("owner")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.key.into_inner())
        .collect();

    assert_eq!(listed, vec!["second".to_string(), "first1".to_string()]);
}

#[tokio::test]
async fn get_or_create_user_is_idempotent() {
    let fixture = Fixture::start().await;
    let user = NewUser {
        id: "user-1".to_string(),
        email: "one@example.com".to_string(),
        name: Some("One".to_string()),
        picture: None,
    };

    let created = fixture.store.get_or_create_user(user.clone()).await.unwrap();
    let again = fixture.store.get_or_create_user(user).await.unwrap();

    assert_eq!(created, again);
    assert_eq!(again.name.as_deref(), Some("One"));
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let fixture = Fixture::start().await;

    fixture.store.shutdown().await.unwrap();
    fixture.store.shutdown().await.unwrap();

    let err = fixture.store.exists(&key("abc123")).await.unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)));
}
