use ferrylink_core::key::{MAX_LENGTH, MIN_LENGTH};
use ferrylink_generator::DEFAULT_KEY_LENGTH;
use typed_builder::TypedBuilder;

/// Bounds on the key minting retry loop.
///
/// Every candidate that turns out to be taken counts as one failed attempt.
/// After each `growth_interval` failed attempts the candidate length doubles,
/// up to `max_key_length`. Once `max_attempts` candidates have failed, minting
/// gives up with [`ShortenerError::ExhaustedKeyspace`](crate::ShortenerError::ExhaustedKeyspace).
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct MintPolicy {
    /// Length of the first candidates.
    #[builder(default = DEFAULT_KEY_LENGTH)]
    pub key_length: usize,
    /// Total number of candidates tried before giving up.
    #[builder(default = 16)]
    pub max_attempts: u32,
    /// Failed attempts between two length doublings; `0` disables growth.
    #[builder(default = 4)]
    pub growth_interval: u32,
    #[builder(default = MAX_LENGTH)]
    pub max_key_length: usize,
}

impl Default for MintPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MintPolicy {
    /// Returns the candidate length to use after `failed` failed attempts.
    ///
    /// The result always lies within the valid key length range.
    pub fn key_length_for(&self, failed: u32) -> usize {
        let doublings = match self.growth_interval {
            0 => 0,
            interval => failed / interval,
        };
        let factor = 1usize.checked_shl(doublings).unwrap_or(usize::MAX);
        let ceiling = self.max_key_length.min(MAX_LENGTH);

        self.key_length
            .saturating_mul(factor)
            .min(ceiling)
            .max(MIN_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let policy = MintPolicy::default();

        assert_eq!(policy.key_length, 6);
        assert_eq!(policy.max_attempts, 16);
        assert_eq!(policy.growth_interval, 4);
        assert_eq!(policy.max_key_length, 32);
    }

    #[test]
    fn length_doubles_every_interval() {
        let policy = MintPolicy::default();

        let lengths: Vec<usize> = (0..16).map(|n| policy.key_length_for(n)).collect();

        assert_eq!(&lengths[0..4], &[6, 6, 6, 6]);
        assert_eq!(&lengths[4..8], &[12, 12, 12, 12]);
        assert_eq!(&lengths[8..12], &[24, 24, 24, 24]);
        assert_eq!(&lengths[12..16], &[32, 32, 32, 32]);
    }

    #[test]
    fn zero_interval_never_grows() {
        let policy = MintPolicy::builder().growth_interval(0).build();

        assert_eq!(policy.key_length_for(0), 6);
        assert_eq!(policy.key_length_for(1_000), 6);
    }

    #[test]
    fn length_is_clamped_to_valid_range() {
        let short = MintPolicy::builder().key_length(1).growth_interval(0).build();
        assert_eq!(short.key_length_for(0), MIN_LENGTH);

        let long = MintPolicy::builder()
            .key_length(20)
            .max_key_length(100)
            .build();
        assert_eq!(long.key_length_for(4), MAX_LENGTH);

        let huge = MintPolicy::builder().growth_interval(1).build();
        assert_eq!(huge.key_length_for(u32::MAX), MAX_LENGTH);
    }
}
