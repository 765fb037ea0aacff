//! Key minting on top of the ferrylink storage contract.
//!
//! [`ShortenerService`] turns a URL into a short key, reusing the existing
//! key when the URL is already mapped. Core types are re-exported from
//! `ferrylink_core`.

pub mod error;
pub mod policy;
pub mod service;

pub use error::ShortenerError;
pub use ferrylink_core::{ShortKey, ShortenParams, Shortener, UrlRecord};
pub use policy::MintPolicy;
pub use service::{parse_key, ShortenerService};
