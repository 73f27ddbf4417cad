//! Built-in synthetic trainer.
//!
//! Stands in for a real RL algorithm: each call advances a noisy learning
//! curve whose plateau depends on how close the learning rates, the discount
//! factor and the soft-update rate are to a fixed sweet spot. Learning rates
//! far above the sweet spot blow up the way real actor-critic training does.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rt_optimizer::{AgentState, ResolvedConfig, Trainer};
use rt_types::TrainingError;
use std::collections::BTreeMap;

const ACTOR_LR_OPTIMUM: f64 = 3e-4;
const CRITIC_LR_OPTIMUM: f64 = 1e-3;
const TAU_OPTIMUM: f64 = 0.01;
const DIVERGENCE_LR: f64 = 0.3;
const MAX_REWARD: f64 = 350.0;

#[derive(Debug, Clone)]
pub struct SurrogateAgent {
    epochs: usize,
    mean_reward: f64,
    rewards: Vec<f64>,
    rng: StdRng,
}

impl AgentState for SurrogateAgent {
    fn evaluation_completed(&self) -> bool {
        self.epochs > 0
    }

    fn mean_reward(&self) -> f64 {
        self.mean_reward
    }

    fn last_mean_reward(&self) -> f64 {
        self.mean_reward
    }

    fn diagnostics(&self) -> BTreeMap<String, serde_json::Value> {
        let best = self.rewards.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        BTreeMap::from([
            ("epochs_trained".to_string(), serde_json::json!(self.epochs)),
            ("best_mean_reward".to_string(), serde_json::json!(best)),
        ])
    }
}

/// Deterministic per seed: the same seed and configuration give the same curve.
#[derive(Debug, Clone)]
pub struct SurrogateTrainer {
    seed: u64,
}

impl SurrogateTrainer {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Plateau reward of a configuration, in `[0, MAX_REWARD]`.
    fn plateau(config: &ResolvedConfig) -> f64 {
        let log_distance = |value: Option<f64>, optimum: f64| {
            value
                .filter(|v| *v > 0.0)
                .map_or(0.0, |v| (v.log10() - optimum.log10()).abs())
        };
        let actor = log_distance(config.get_f64("actor_optimizer.lr"), ACTOR_LR_OPTIMUM);
        let critic = log_distance(config.get_f64("critic_optimizer.lr"), CRITIC_LR_OPTIMUM);
        let tau = log_distance(config.get_f64("algorithm.tau_target"), TAU_OPTIMUM);
        let discount = config
            .get_f64("algorithm.discount_factor")
            .map_or(0.0, |g| ((1.0 - g).max(1e-6).log10() + 2.0).abs());

        let penalty = 0.6 * actor + 0.4 * critic + 0.3 * tau + 0.5 * discount;
        MAX_REWARD * (-penalty * penalty).exp()
    }

    fn seed_for(&self, config: &ResolvedConfig) -> u64 {
        // Fold the configuration into the seed so trials differ.
        config
            .as_value()
            .to_string()
            .bytes()
            .fold(self.seed, |acc, b| acc.rotate_left(5) ^ u64::from(b))
    }
}

impl Trainer for SurrogateTrainer {
    type Agent = SurrogateAgent;

    fn train(
        &self,
        config: &ResolvedConfig,
        agent: Option<SurrogateAgent>,
        epochs: usize,
    ) -> Result<SurrogateAgent, TrainingError> {
        for path in ["actor_optimizer.lr", "critic_optimizer.lr"] {
            if config.get_f64(path).is_some_and(|lr| lr >= DIVERGENCE_LR) {
                return Err(TrainingError::divergence(format!(
                    "{path} too large, network weights became NaN"
                )));
            }
        }

        let mut agent = agent.unwrap_or_else(|| SurrogateAgent {
            epochs: 0,
            mean_reward: 0.0,
            rewards: Vec::new(),
            rng: StdRng::seed_from_u64(self.seed_for(config)),
        });

        let plateau = Self::plateau(config);
        for _ in 0..epochs {
            agent.epochs += 1;
            let progress = 1.0 - (-(agent.epochs as f64) / 4.0).exp();
            let noise = agent.rng.random_range(-0.05..0.05) * plateau;
            agent.mean_reward = plateau * progress + noise;
            agent.rewards.push(agent.mean_reward);
        }
        Ok(agent)
    }
}
