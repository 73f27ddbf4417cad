//! Search strategies: where each trial's random draws come from.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use crate::sampler::{DrawSource, RandomDraws};
use crate::search::ParameterValue;

/// Common trait for all search strategies.
///
/// The study keeps its strategy behind a mutex: `draw_source` and `report`
/// are never called concurrently, and the returned draw source is owned by a
/// single trial so no lock is held while that trial trains.
pub trait SearchStrategy: Send {
    /// Hand out the draw source for the next trial.
    fn draw_source(&mut self) -> Box<dyn DrawSource + Send>;

    /// Report a completed trial so adaptive strategies can learn.
    fn report(&mut self, _params: &BTreeMap<String, ParameterValue>, _objective: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

pub(crate) fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: make_rng(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn draw_source(&mut self) -> Box<dyn DrawSource + Send> {
        Box::new(RandomDraws::seeded(self.rng.random()))
    }

    fn name(&self) -> &str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_search_respects_bounds() {
        let mut rs = RandomSearch::new(Some(7));
        for _ in 0..50 {
            let mut draws = rs.draw_source();
            let lr = draws.float("lr", 1e-5, 1e-1, true);
            assert!((1e-5..=1e-1).contains(&lr), "lr out of bounds: {lr}");
            let batch = draws.int("batch_size", 100, 300);
            assert!((100..=300).contains(&batch));
        }
    }

    #[test]
    fn seeded_random_search_is_reproducible() {
        let mut a = RandomSearch::new(Some(42));
        let mut b = RandomSearch::new(Some(42));
        for _ in 0..5 {
            let x = a.draw_source().float("x", 0.0, 1.0, false);
            let y = b.draw_source().float("x", 0.0, 1.0, false);
            assert_eq!(x, y);
        }
    }
}
