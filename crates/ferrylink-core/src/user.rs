use crate::error::Result;
use crate::store::Mapping;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// An account known to the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub created_at: Timestamp,
}

/// Profile data supplied by the identity provider at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Owner-scoped operations offered by durable backends.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Returns the stored user with `user.id`, inserting it first if absent.
    ///
    /// An existing row is returned as stored; the supplied profile does not
    /// overwrite it.
    async fn get_or_create_user(&self, user: NewUser) -> Result<User>;

    /// Lists every mapping created by `owner_id`, newest first.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Mapping>>;
}
