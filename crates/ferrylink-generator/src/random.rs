use crate::{Generator, ALPHABET};
use ferrylink_core::ShortKey;
use rand::Rng;

/// Draws every character independently and uniformly from [`ALPHABET`](crate::ALPHABET).
///
/// Stateless: each call pulls from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomGenerator;

impl RandomGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Generator for RandomGenerator {
    fn generate(&self, length: usize) -> ShortKey {
        let mut rng = rand::rng();

        let key: String = (0..length)
            .map(|_| {
                let idx = rng.random_range(0..ALPHABET.len());
                ALPHABET[idx] as char
            })
            .collect();
        ShortKey::new_unchecked(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_KEY_LENGTH;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn generates_requested_length() {
        let generator = RandomGenerator::new();

        assert_eq!(generator.generate(DEFAULT_KEY_LENGTH).as_str().len(), 6);
        assert_eq!(generator.generate(12).as_str().len(), 12);
        assert_eq!(generator.generate(32).as_str().len(), 32);
    }

    #[test]
    fn uses_only_alphabet_characters() {
        let generator = RandomGenerator::new();

        for _ in 0..200 {
            let key = generator.generate(DEFAULT_KEY_LENGTH);
            assert!(key.as_str().bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn generated_keys_pass_validation() {
        let generator = RandomGenerator::new();
        let key = generator.generate(DEFAULT_KEY_LENGTH);

        assert!(ShortKey::new(key.as_str()).is_ok());
    }

    #[test]
    fn draws_are_spread_over_the_alphabet() {
        let generator = RandomGenerator::new();
        let mut counts: HashMap<u8, usize> = HashMap::new();

        for _ in 0..2_000 {
            for b in generator.generate(DEFAULT_KEY_LENGTH).as_str().bytes() {
                *counts.entry(b).or_default() += 1;
            }
        }

        // 12_000 draws over 62 symbols: roughly 194 each.
        assert_eq!(counts.len(), ALPHABET.len());
        assert!(counts.values().all(|&n| n > 80 && n < 350));
    }

    #[test]
    fn collisions_are_rare() {
        let generator = RandomGenerator::new();
        let keys: HashSet<String> = (0..1_000)
            .map(|_| generator.generate(DEFAULT_KEY_LENGTH).into_inner())
            .collect();

        assert!(keys.len() >= 999);
    }

    #[test]
    fn alphabet_is_exactly_the_ascii_alphanumerics() {
        let unique: HashSet<u8> = ALPHABET.iter().copied().collect();

        assert_eq!(unique.len(), 62);
        assert!(ALPHABET.iter().all(u8::is_ascii_alphanumeric));
    }

    #[test]
    fn generator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RandomGenerator>();
    }
}
