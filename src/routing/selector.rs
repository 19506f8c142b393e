//! Specialist selectors used for the moderator's random handoff.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::traits::SpecialistSelector;

/// Uniform random choice. Seedable so handoffs can be replayed.
pub struct RandomSelector {
    rng: Mutex<StdRng>,
}

impl RandomSelector {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl SpecialistSelector for RandomSelector {
    fn select(&self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        self.rng.lock().gen_range(0..count)
    }

    fn name(&self) -> &str {
        "random"
    }
}

/// Always picks the same index (modulo `count`).
pub struct FixedSelector(pub usize);

impl SpecialistSelector for FixedSelector {
    fn select(&self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        self.0 % count
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_selector_stays_in_range() {
        let selector = RandomSelector::from_entropy();
        for _ in 0..200 {
            assert!(selector.select(10) < 10);
        }
        assert_eq!(selector.select(0), 0);
        assert_eq!(selector.name(), "random");
    }

    #[test]
    fn seeded_selectors_agree() {
        let a = RandomSelector::seeded(42);
        let b = RandomSelector::seeded(42);
        let left: Vec<usize> = (0..32).map(|_| a.select(10)).collect();
        let right: Vec<usize> = (0..32).map(|_| b.select(10)).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn random_selector_covers_candidates() {
        let selector = RandomSelector::seeded(7);
        let mut seen = [false; 4];
        for _ in 0..500 {
            seen[selector.select(4)] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn fixed_selector_wraps() {
        let selector = FixedSelector(12);
        assert_eq!(selector.select(10), 2);
        assert_eq!(selector.select(0), 0);
        assert_eq!(selector.name(), "fixed");
    }
}
