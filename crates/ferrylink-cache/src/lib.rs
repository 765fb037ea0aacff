//! Cache tiers for ferrylink.
//!
//! Both stores implement [`UrlStore`](ferrylink_core::UrlStore) so they can
//! sit in front of a durable backend inside a `CachedStore`.

pub mod moka;
pub mod redis;

pub use moka::{MokaSettings, MokaStore};
pub use redis::{RedisStore, REVERSE_PREFIX};
