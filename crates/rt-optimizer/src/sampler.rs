//! Turns a search space plus a trial's random draws into a concrete
//! training configuration.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rt_types::{DerivedIterationsSpec, Scale, SearchSpaceError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::search::{ParameterValue, SearchSpace};

/// Trial-scoped source of random draws.
///
/// Search strategies hand one of these out per trial; the sampler asks it for
/// every stochastic decision, named by parameter so adaptive strategies can
/// condition on past draws of the same parameter.
pub trait DrawSource {
    /// Draw a float in `[low, high]`, uniformly in log-space when `log` is set.
    fn float(&mut self, name: &str, low: f64, high: f64, log: bool) -> f64;

    /// Draw an integer in `[low, high]` inclusive.
    fn int(&mut self, name: &str, low: i64, high: i64) -> i64;
}

/// Independent uniform draws.
#[derive(Debug, Clone)]
pub struct RandomDraws {
    rng: StdRng,
}

impl RandomDraws {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl DrawSource for RandomDraws {
    fn float(&mut self, _name: &str, low: f64, high: f64, log: bool) -> f64 {
        uniform_float(&mut self.rng, low, high, log)
    }

    fn int(&mut self, _name: &str, low: i64, high: i64) -> i64 {
        self.rng.random_range(low..=high)
    }
}

pub(crate) fn uniform_float<R: Rng>(rng: &mut R, low: f64, high: f64, log: bool) -> f64 {
    if low >= high {
        return low;
    }
    if log {
        let log_val: f64 = rng.random_range(low.ln()..=high.ln());
        log_val.exp().clamp(low, high)
    } else {
        rng.random_range(low..=high)
    }
}

/// Iteration count computed as `budget / step` once all draws are made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedIterations {
    pub budget: String,
    pub step: String,
    pub target: String,
}

impl From<&DerivedIterationsSpec> for DerivedIterations {
    fn from(spec: &DerivedIterationsSpec) -> Self {
        Self {
            budget: spec.budget.clone(),
            step: spec.step.clone(),
            target: spec.target.clone(),
        }
    }
}

/// The base configuration with every sampled field substituted.
///
/// Owned by exactly one trial and never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedConfig(Value);

impl ResolvedConfig {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up a dotted path such as `algorithm.n_steps`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.0, path)
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(as_count)
    }
}

/// Output of one sampling pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledConfig {
    /// Raw draws keyed by parameter name (exponents for power-of-two params).
    pub params: BTreeMap<String, ParameterValue>,
    pub config: ResolvedConfig,
    /// Derived iteration count, when the space declares one.
    pub iterations: Option<u64>,
}

/// Maps a search space and a draw source to a [`ResolvedConfig`].
#[derive(Debug, Clone)]
pub struct ParameterSampler {
    space: SearchSpace,
    base: Value,
    derived: Option<DerivedIterations>,
}

impl ParameterSampler {
    /// Validates the space and the derived-iteration paths up front so that
    /// malformed declarations fail before any trial runs.
    pub fn new(
        space: SearchSpace,
        base: Value,
        derived: Option<DerivedIterations>,
    ) -> Result<Self, SearchSpaceError> {
        space.validate()?;
        let base = if base.is_null() {
            Value::Object(Default::default())
        } else {
            base
        };

        if let Some(derived) = &derived {
            if lookup(&base, &derived.budget).and_then(as_count).is_none() {
                return Err(SearchSpaceError::DerivedIterations {
                    message: format!(
                        "budget {} must be a non-negative integer in the base configuration",
                        derived.budget
                    ),
                });
            }
            let step_sampled = space.parameters.iter().any(|p| p.target == derived.step);
            if !step_sampled && lookup(&base, &derived.step).and_then(as_count).is_none() {
                return Err(SearchSpaceError::DerivedIterations {
                    message: format!(
                        "step {} is neither sampled nor an integer in the base configuration",
                        derived.step
                    ),
                });
            }
        }

        Ok(Self {
            space,
            base,
            derived,
        })
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn base(&self) -> &Value {
        &self.base
    }

    pub fn derived(&self) -> Option<&DerivedIterations> {
        self.derived.as_ref()
    }

    /// Draw every parameter, substitute it into a fresh copy of the base
    /// configuration, then compute derived fields.
    pub fn sample(&self, draws: &mut dyn DrawSource) -> Result<SampledConfig, SearchSpaceError> {
        let mut config = self.base.clone();
        let mut params = BTreeMap::new();

        for param in &self.space.parameters {
            let (raw, value) = match param.scale {
                Scale::Linear | Scale::Log => {
                    let v = draws.float(&param.name, param.low, param.high, param.scale == Scale::Log);
                    (ParameterValue::Float(v), Value::from(v))
                }
                Scale::Int => {
                    let (low, high) = param.int_bounds();
                    let v = draws.int(&param.name, low, high);
                    (ParameterValue::Int(v), Value::from(v))
                }
                Scale::Pow2 => {
                    let (low, high) = param.int_bounds();
                    let exponent = draws.int(&param.name, low, high);
                    (ParameterValue::Int(exponent), Value::from(1i64 << exponent))
                }
            };
            let value = match param.layers {
                Some(n) => Value::Array(vec![value; n]),
                None => value,
            };
            assign(&mut config, &param.target, value).map_err(|message| {
                SearchSpaceError::InvalidTarget {
                    name: param.name.clone(),
                    target: param.target.clone(),
                    message,
                }
            })?;
            params.insert(param.name.clone(), raw);
        }

        let iterations = match &self.derived {
            Some(derived) => Some(apply_derived(&mut config, derived)?),
            None => None,
        };

        Ok(SampledConfig {
            params,
            config: ResolvedConfig(config),
            iterations,
        })
    }
}

fn apply_derived(config: &mut Value, derived: &DerivedIterations) -> Result<u64, SearchSpaceError> {
    let budget = lookup(config, &derived.budget).and_then(as_count);
    let step = lookup(config, &derived.step).and_then(as_count);
    let (budget, step) = match (budget, step) {
        (Some(budget), Some(step)) if step > 0 => (budget, step),
        _ => {
            return Err(SearchSpaceError::DerivedIterations {
                message: format!(
                    "cannot divide {} by {}: both must be integers and the step positive",
                    derived.budget, derived.step
                ),
            })
        }
    };
    let iterations = budget / step;
    assign(config, &derived.target, Value::from(iterations)).map_err(|message| {
        SearchSpaceError::DerivedIterations { message }
    })?;
    Ok(iterations)
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, key| node.get(key))
}

/// Non-negative integral value, accepting floats with no fractional part.
fn as_count(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| *v >= 0.0 && v.fract() == 0.0 && *v <= u64::MAX as f64)
            .map(|v| v as u64)
    })
}

/// Write `value` at a dotted path, creating intermediate mappings.
fn assign(root: &mut Value, path: &str, value: Value) -> Result<(), String> {
    let mut node = root;
    let mut segments = path.split('.').peekable();
    while let Some(key) = segments.next() {
        if node.is_null() {
            *node = Value::Object(Default::default());
        }
        let map = node
            .as_object_mut()
            .ok_or_else(|| format!("segment {key:?} is below a non-mapping value"))?;
        if segments.peek().is_none() {
            map.insert(key.to_string(), value);
            return Ok(());
        }
        node = map.entry(key.to_string()).or_insert(Value::Null);
    }
    Err("empty path".to_string())
}
