use async_trait::async_trait;
use ferrylink_core::{
    KeyRecord, Mapping, NewUser, Result, ShortKey, StorageError, UrlRecord, UrlStore, User,
    UserStore,
};
use jiff::Timestamp;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{info, trace};

/// Idempotent DDL for the `users` and `mappings` tables.
pub const SCHEMA: &str = include_str!("../ddl/postgres/schema.sql");

/// Postgres implementation of the storage contract; the system of record.
///
/// `original_url` carries a unique constraint, so the reverse lookup is
/// always unambiguous. A `put` that would bind a URL to a second key fails
/// with [`StorageError::Conflict`]; an `update` into a taken URL reports
/// `false`. Timestamps are stored as microseconds since the Unix epoch.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store from an existing Postgres connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a store by opening a new Postgres connection pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        info!(max_connections, "Connected to Postgres");
        Ok(Self::new(pool))
    }

    /// Creates the tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        info!("Postgres schema is up to date");
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn now_micros() -> i64 {
    Timestamp::now().as_microsecond()
}

fn parse_created_at(micros: i64) -> Result<Timestamp> {
    Timestamp::from_microsecond(micros).map_err(|e| {
        StorageError::InvalidData(format!("invalid created_at timestamp '{}': {e}", micros))
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn mapping_from_row(row: &PgRow) -> Result<Mapping> {
    let key: String = row.try_get("key").map_err(map_sqlx_error)?;
    let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
    let owner_id: Option<String> = row.try_get("owner_id").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;

    Ok(Mapping {
        key: ShortKey::new_unchecked(key),
        original_url,
        owner_id,
        created_at: parse_created_at(created_at)?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;

    Ok(User {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        email: row.try_get("email").map_err(map_sqlx_error)?,
        name: row.try_get("name").map_err(map_sqlx_error)?,
        picture: row.try_get("picture").map_err(map_sqlx_error)?,
        created_at: parse_created_at(created_at)?,
    })
}

#[async_trait]
impl UrlStore for PostgresStore {
    async fn put(&self, key: &ShortKey, original_url: &str, owner_id: Option<&str>) -> Result<()> {
        trace!(key = %key, "Upserting mapping in Postgres");

        let result = sqlx::query(
            r#"
            INSERT INTO mappings (key, original_url, owner_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO UPDATE
            SET original_url = EXCLUDED.original_url
            "#,
        )
        .bind(key.as_str())
        .bind(original_url)
        .bind(owner_id)
        .bind(now_micros())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::Conflict(original_url.to_string()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn resolve_by_key(&self, key: &ShortKey) -> Result<Option<UrlRecord>> {
        trace!(key = %key, "Resolving key in Postgres");

        let row = sqlx::query(
            r#"
            SELECT original_url, owner_id
            FROM mappings
            WHERE key = $1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(UrlRecord {
            original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
            owner_id: row.try_get("owner_id").map_err(map_sqlx_error)?,
        }))
    }

    async fn resolve_by_url(&self, original_url: &str) -> Result<Option<KeyRecord>> {
        trace!("Resolving original url in Postgres");

        let row = sqlx::query(
            r#"
            SELECT key, owner_id
            FROM mappings
            WHERE original_url = $1
            LIMIT 1
            "#,
        )
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let key: String = row.try_get("key").map_err(map_sqlx_error)?;
        Ok(Some(KeyRecord {
            key: ShortKey::new_unchecked(key),
            owner_id: row.try_get("owner_id").map_err(map_sqlx_error)?,
        }))
    }

    async fn exists(&self, key: &ShortKey) -> Result<bool> {
        let exists = sqlx::query(
            r#"
            SELECT 1
            FROM mappings
            WHERE key = $1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .is_some();

        Ok(exists)
    }

    async fn update(&self, key: &ShortKey, new_url: &str) -> Result<bool> {
        trace!(key = %key, "Updating mapping in Postgres");

        let result = sqlx::query(
            r#"
            UPDATE mappings
            SET original_url = $2
            WHERE key = $1
            "#,
        )
        .bind(key.as_str())
        .bind(new_url)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            // Another key already owns `new_url`.
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn delete(&self, key: &ShortKey) -> Result<bool> {
        trace!(key = %key, "Deleting mapping from Postgres");

        let result = sqlx::query(
            r#"
            DELETE FROM mappings
            WHERE key = $1
            "#,
        )
        .bind(key.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("Closed Postgres pool");
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn get_or_create_user(&self, user: NewUser) -> Result<User> {
        trace!(user_id = %user.id, "Getting or creating user in Postgres");

        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, picture, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.picture)
        .bind(now_micros())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let row = sqlx::query(
            r#"
            SELECT id, email, name, picture, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(&user.id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        user_from_row(&row)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Mapping>> {
        trace!(owner_id, "Listing mappings by owner in Postgres");

        let rows = sqlx::query(
            r#"
            SELECT key, original_url, owner_id, created_at
            FROM mappings
            WHERE owner_id = $1
            ORDER BY created_at DESC, key ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(mapping_from_row).collect()
    }
}
