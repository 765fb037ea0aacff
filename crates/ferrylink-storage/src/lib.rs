//! Storage backends for ferrylink.
//!
//! [`PostgresStore`] is the system of record, [`InMemoryStore`] is the
//! self-contained backend used standalone and as a test double, and
//! [`CachedStore`] puts any cache tier in front of a durable tier.

pub mod cached;
pub mod memory;
pub mod postgres;
pub mod timeout;

pub use cached::CachedStore;
pub use ferrylink_core::{KeyRecord, StorageError, UrlRecord, UrlStore, UserStore};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use timeout::TimeoutStore;
