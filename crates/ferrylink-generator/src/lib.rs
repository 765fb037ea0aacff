pub mod random;

pub use random::RandomGenerator;

use ferrylink_core::ShortKey;

/// The 62 characters a generated key is drawn from.
pub const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Default length of a generated key.
pub const DEFAULT_KEY_LENGTH: usize = 6;

/// Trait for generating candidate keys.
///
/// Implementations are pure generators that don't interact with storage.
/// Collision avoidance is the caller's job, so `generate` must be cheap
/// enough to call repeatedly in a retry loop.
pub trait Generator: Send + Sync + 'static {
    /// Produces a key of exactly `length` characters.
    fn generate(&self, length: usize) -> ShortKey;
}
