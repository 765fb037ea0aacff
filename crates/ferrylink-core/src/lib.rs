//! Core types and traits for the ferrylink URL shortener.
//!
//! This crate provides the storage contract shared by every backend and
//! the data types that flow through it.

pub mod error;
pub mod key;
pub mod shortener;
pub mod store;
pub mod user;

pub use error::{CacheError, CoreError, Result, StorageError};
pub use key::ShortKey;
pub use shortener::{ShortenParams, Shortener};
pub use store::{KeyRecord, Mapping, UrlRecord, UrlStore};
pub use user::{NewUser, User, UserStore};
