//! Tree-structured Parzen Estimator.
//!
//! Completed trials are split into a "good" group (the best `gamma(n)`
//! trials) and a "bad" group. For every parameter a Gaussian KDE is fitted to
//! each group, `l(x)` and `g(x)`, and the next value is the candidate drawn
//! from `l(x)` that maximizes `l(x) / g(x)`. Log-scale parameters are modelled
//! in log space. Until `n_startup_trials` trials have completed, draws are
//! independent and uniform.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rt_types::ObjectiveDirection;
use std::collections::BTreeMap;

use crate::sampler::{uniform_float, DrawSource, RandomDraws};
use crate::search::ParameterValue;
use crate::strategy::{make_rng, SearchStrategy};

/// Candidates drawn from `l(x)` per parameter.
pub const DEFAULT_EI_CANDIDATES: usize = 24;

/// Upper bound on the size of the good group.
const MAX_GOOD_TRIALS: usize = 25;

/// Kernel width never shrinks below this fraction of the parameter range.
const MIN_BANDWIDTH_FRACTION: f64 = 0.01;

type Observation = BTreeMap<String, ParameterValue>;

/// TPE search strategy.
#[derive(Debug, Clone)]
pub struct TpeSearch {
    direction: ObjectiveDirection,
    n_startup_trials: usize,
    n_ei_candidates: usize,
    rng: StdRng,
    observations: Vec<(Observation, f64)>,
}

impl TpeSearch {
    pub fn new(direction: ObjectiveDirection, seed: Option<u64>) -> Self {
        Self {
            direction,
            n_startup_trials: 10,
            n_ei_candidates: DEFAULT_EI_CANDIDATES,
            rng: make_rng(seed),
            observations: Vec::new(),
        }
    }

    #[must_use]
    pub fn n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    #[must_use]
    pub fn n_ei_candidates(mut self, n: usize) -> Self {
        self.n_ei_candidates = n.max(1);
        self
    }

    pub fn n_observations(&self) -> usize {
        self.observations.len()
    }

    /// Size of the good group for `n` observations: `min(ceil(0.1 n), 25)`.
    fn n_good(n: usize) -> usize {
        n.div_ceil(10).clamp(1, MAX_GOOD_TRIALS)
    }
}

impl SearchStrategy for TpeSearch {
    fn draw_source(&mut self) -> Box<dyn DrawSource + Send> {
        let seed: u64 = self.rng.random();
        if self.observations.len() < self.n_startup_trials.max(1) {
            return Box::new(RandomDraws::seeded(seed));
        }

        let direction = self.direction;
        let mut ranked: Vec<&(Observation, f64)> = self.observations.iter().collect();
        ranked.sort_by(|a, b| match direction {
            ObjectiveDirection::Maximize => b.1.total_cmp(&a.1),
            ObjectiveDirection::Minimize => a.1.total_cmp(&b.1),
        });

        let n_good = Self::n_good(ranked.len());
        let (good, bad) = ranked.split_at(n_good);
        Box::new(TpeDraws {
            good: good.iter().map(|(p, _)| p.clone()).collect(),
            bad: bad.iter().map(|(p, _)| p.clone()).collect(),
            n_ei_candidates: self.n_ei_candidates,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    fn report(&mut self, params: &Observation, objective: f64) {
        if objective.is_nan() {
            return;
        }
        self.observations.push((params.clone(), objective));
    }

    fn name(&self) -> &str {
        "tpe"
    }
}

/// Draw source conditioned on a snapshot of the good/bad split.
#[derive(Debug)]
pub struct TpeDraws {
    good: Vec<Observation>,
    bad: Vec<Observation>,
    n_ei_candidates: usize,
    rng: StdRng,
}

impl TpeDraws {
    fn observed(group: &[Observation], name: &str) -> Vec<f64> {
        group
            .iter()
            .filter_map(|p| p.get(name))
            .map(ParameterValue::as_f64)
            .filter(|v| v.is_finite())
            .collect()
    }

    fn sample(&mut self, low: f64, high: f64, log: bool, good: Vec<f64>, bad: Vec<f64>) -> f64 {
        let to_internal = |v: f64| if log { v.ln() } else { v };
        let (internal_low, internal_high) = (to_internal(low), to_internal(high));
        let range = internal_high - internal_low;

        let l = KernelDensity::new(good.into_iter().map(to_internal).collect(), range);
        let g = KernelDensity::new(bad.into_iter().map(to_internal).collect(), range);

        let mut best_candidate = internal_low;
        let mut best_ratio = f64::NEG_INFINITY;
        for _ in 0..self.n_ei_candidates {
            let candidate = l.sample(&mut self.rng).clamp(internal_low, internal_high);
            let l_density = l.pdf(candidate);
            let g_density = g.pdf(candidate);
            let ratio = if g_density < f64::EPSILON {
                if l_density > f64::EPSILON {
                    f64::INFINITY
                } else {
                    0.0
                }
            } else {
                l_density / g_density
            };
            if ratio > best_ratio {
                best_ratio = ratio;
                best_candidate = candidate;
            }
        }

        let value = if log { best_candidate.exp() } else { best_candidate };
        value.clamp(low, high)
    }
}

impl DrawSource for TpeDraws {
    fn float(&mut self, name: &str, low: f64, high: f64, log: bool) -> f64 {
        if low >= high {
            return low;
        }
        let good = Self::observed(&self.good, name);
        let bad = Self::observed(&self.bad, name);
        if good.is_empty() || bad.is_empty() {
            return uniform_float(&mut self.rng, low, high, log);
        }
        self.sample(low, high, log, good, bad)
    }

    fn int(&mut self, name: &str, low: i64, high: i64) -> i64 {
        if low >= high {
            return low;
        }
        let good = Self::observed(&self.good, name);
        let bad = Self::observed(&self.bad, name);
        if good.is_empty() || bad.is_empty() {
            return self.rng.random_range(low..=high);
        }
        // Widen by half a unit so both end points get a full bucket.
        let value = self.sample(low as f64 - 0.5, high as f64 + 0.5, false, good, bad);
        (value.round() as i64).clamp(low, high)
    }
}

/// Gaussian kernel density estimate with Scott's-rule bandwidth.
#[derive(Debug, Clone)]
struct KernelDensity {
    samples: Vec<f64>,
    bandwidth: f64,
}

impl KernelDensity {
    /// `samples` must be non-empty and `range` positive.
    fn new(samples: Vec<f64>, range: f64) -> Self {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let std_dev = (samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
        let bandwidth = (n.powf(-0.2) * std_dev).max(range * MIN_BANDWIDTH_FRACTION);
        Self { samples, bandwidth }
    }

    fn pdf(&self, x: f64) -> f64 {
        let inv_bandwidth = 1.0 / self.bandwidth;
        let normalization = inv_bandwidth / (2.0 * std::f64::consts::PI).sqrt();
        let density: f64 = self
            .samples
            .iter()
            .map(|&xi| {
                let z = (x - xi) * inv_bandwidth;
                normalization * (-0.5 * z * z).exp()
            })
            .sum();
        density / self.samples.len() as f64
    }

    /// Pick a kernel uniformly, then add Box-Muller Gaussian noise.
    fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let center = self.samples[rng.random_range(0..self.samples.len())];
        let u1: f64 = 1.0 - rng.random::<f64>();
        let u2: f64 = rng.random();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        center + z * self.bandwidth
    }
}
