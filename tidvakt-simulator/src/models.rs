//! # Delivery condition models
//!
//! Each simulated reader owns its models, seeded from the scenario seed, so
//! a run is reproducible for a given scenario.
//!
//! ## Models:
//! - `ReadJitter`: Random extra delay before a buffer is read.
//! - `LossModel`: Drops records on the kernel side with a given probability.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Seeded RNG for one simulated source. Distinct `stream` values give
/// independent sequences from the same scenario seed.
pub fn seeded_rng(seed: u64, stream: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Uniform random delay from 0 up to a maximum magnitude.
#[derive(Debug)]
pub struct ReadJitter {
    magnitude_ms: u64,
    rng: SmallRng,
}

impl ReadJitter {
    pub fn new(magnitude_ms: u64, rng: SmallRng) -> Self {
        Self { magnitude_ms, rng }
    }

    #[inline]
    pub fn apply(&mut self, base: Duration) -> Duration {
        if self.magnitude_ms == 0 {
            return base;
        }
        base + Duration::from_millis(self.rng.random_range(0..=self.magnitude_ms))
    }
}

#[derive(Debug)]
pub enum LossModel {
    None,
    Probabilistic { probability: f64, rng: SmallRng },
}

impl LossModel {
    /// A probability of zero yields [`LossModel::None`]. Values outside
    /// `0.0..=1.0` are clamped.
    pub fn new(probability: f64, rng: SmallRng) -> Self {
        if probability <= 0.0 {
            Self::None
        } else {
            Self::Probabilistic {
                probability: probability.min(1.0),
                rng,
            }
        }
    }

    #[inline]
    pub fn should_drop(&mut self) -> bool {
        match self {
            Self::None => false,
            Self::Probabilistic { probability, rng } => rng.random_bool(*probability),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_range() {
        let mut model = ReadJitter::new(50, seeded_rng(1, 0));
        let base = Duration::from_millis(100);
        for _ in 0..100 {
            let jittered = model.apply(base);
            assert!(jittered >= base);
            assert!(jittered <= base + Duration::from_millis(50));
        }
        assert_eq!(ReadJitter::new(0, seeded_rng(1, 0)).apply(base), base);
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = ReadJitter::new(1000, seeded_rng(7, 3));
        let mut b = ReadJitter::new(1000, seeded_rng(7, 3));
        let mut c = ReadJitter::new(1000, seeded_rng(7, 4));
        let base = Duration::ZERO;
        let seq_a: Vec<_> = (0..16).map(|_| a.apply(base)).collect();
        let seq_b: Vec<_> = (0..16).map(|_| b.apply(base)).collect();
        let seq_c: Vec<_> = (0..16).map(|_| c.apply(base)).collect();
        assert_eq!(seq_a, seq_b);
        assert_ne!(seq_a, seq_c);
    }

    #[test]
    fn loss_rate_matches_probability() {
        let mut model = LossModel::new(0.5, seeded_rng(9, 0));
        let drops = (0..10_000).filter(|_| model.should_drop()).count();
        let rate = drops as f64 / 10_000.0;
        assert!((rate - 0.5).abs() < 0.05);

        let mut none = LossModel::new(0.0, seeded_rng(9, 0));
        assert!(matches!(none, LossModel::None));
        assert!((0..100).all(|_| !none.should_drop()));
    }
}
