//! Search space definitions.

use rt_types::{ParameterSpec, Scale, SearchSpaceError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Largest exponent a power-of-two parameter may take (`2^62` fits in i64).
pub const MAX_POW2_EXPONENT: f64 = 62.0;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Human-readable parameter name (e.g. "actor_lr").
    pub name: String,
    pub scale: Scale,
    /// Lower bound. For power-of-two parameters this is the exponent.
    pub low: f64,
    /// Upper bound. For power-of-two parameters this is the exponent.
    pub high: f64,
    /// Dotted path in the base configuration receiving the value.
    pub target: String,
    /// Replicate the value into a list of this many entries.
    pub layers: Option<usize>,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, scale: Scale, low: f64, high: f64) -> Self {
        let name = name.into();
        Self {
            target: name.clone(),
            name,
            scale,
            low,
            high,
            layers: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_layers(mut self, layers: usize) -> Self {
        self.layers = Some(layers);
        self
    }

    /// Integer bounds for `Int` and `Pow2` parameters. Only meaningful after
    /// [`SearchSpace::validate`] accepted the definition.
    pub fn int_bounds(&self) -> (i64, i64) {
        (self.low as i64, self.high as i64)
    }

    fn validate(&self) -> Result<(), SearchSpaceError> {
        let (low, high) = (self.low, self.high);
        let name = || self.name.clone();

        if self.name.is_empty() {
            return Err(SearchSpaceError::EmptyName);
        }
        if !low.is_finite() || !high.is_finite() {
            return Err(SearchSpaceError::NonFiniteBounds { name: name(), low, high });
        }
        if low > high {
            return Err(SearchSpaceError::InvalidBounds { name: name(), low, high });
        }
        match self.scale {
            Scale::Linear => {
                if !(high - low).is_finite() {
                    return Err(SearchSpaceError::RangeTooWide { name: name(), low, high });
                }
            }
            Scale::Log => {
                if low <= 0.0 {
                    return Err(SearchSpaceError::NonPositiveLogBounds { name: name(), low, high });
                }
            }
            Scale::Int | Scale::Pow2 => {
                if low.fract() != 0.0 || high.fract() != 0.0 {
                    return Err(SearchSpaceError::NonIntegerBounds { name: name(), low, high });
                }
                if self.scale == Scale::Pow2 && (low < 0.0 || high > MAX_POW2_EXPONENT) {
                    return Err(SearchSpaceError::ExponentOutOfRange { name: name(), low, high });
                }
            }
        }
        if self.layers == Some(0) {
            return Err(SearchSpaceError::ZeroLayers { name: name() });
        }
        if self.target.is_empty() || self.target.split('.').any(str::is_empty) {
            return Err(SearchSpaceError::InvalidTarget {
                name: name(),
                target: self.target.clone(),
                message: "path segments must be non-empty".to_string(),
            });
        }
        Ok(())
    }
}

impl From<&ParameterSpec> for ParameterDef {
    fn from(spec: &ParameterSpec) -> Self {
        let def = Self::new(spec.name.clone(), spec.scale, spec.min, spec.max);
        let def = match &spec.target {
            Some(target) => def.with_target(target.clone()),
            None => def,
        };
        match spec.layers {
            Some(n) => def.with_layers(n),
            None => def,
        }
    }
}

/// A raw parameter value as recorded on a trial.
///
/// Power-of-two parameters record the exponent, not `2^e`: the exponent is
/// what the search strategy models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
}

impl ParameterValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Float(v) => v,
            Self::Int(v) => v as f64,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
        }
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    /// Build and validate a space from tuning-file declarations.
    pub fn from_specs(specs: &[ParameterSpec]) -> Result<Self, SearchSpaceError> {
        let space = Self {
            parameters: specs.iter().map(ParameterDef::from).collect(),
        };
        space.validate()?;
        Ok(space)
    }

    pub fn add(mut self, def: ParameterDef) -> Self {
        self.parameters.push(def);
        self
    }

    pub fn add_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(ParameterDef::new(name, Scale::Linear, low, high))
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(ParameterDef::new(name, Scale::Int, low as f64, high as f64))
    }

    pub fn add_log_uniform(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(ParameterDef::new(name, Scale::Log, low, high))
    }

    /// Power-of-two parameter with exponent bounds `[low, high]`.
    pub fn add_pow2(self, name: impl Into<String>, low: u32, high: u32) -> Self {
        self.add(ParameterDef::new(name, Scale::Pow2, f64::from(low), f64::from(high)))
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn validate(&self) -> Result<(), SearchSpaceError> {
        let mut seen = HashSet::new();
        for param in &self.parameters {
            param.validate()?;
            if !seen.insert(param.name.as_str()) {
                return Err(SearchSpaceError::DuplicateParameter {
                    name: param.name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_space_builder_chain() {
        let space = SearchSpace::new()
            .add_log_uniform("actor_lr", 1e-5, 1.0)
            .add_int("batch_size", 100, 300)
            .add_float("action_noise", 0.0, 0.1)
            .add(ParameterDef::new("actor_hidden_size", Scale::Pow2, 5.0, 8.0).with_layers(2));
        assert_eq!(space.len(), 4);
        assert!(space.validate().is_ok());
        assert_eq!(space.get("batch_size").unwrap().int_bounds(), (100, 300));
        assert_eq!(space.get("actor_lr").unwrap().target, "actor_lr");
    }

    #[test]
    fn rejects_inverted_bounds() {
        let space = SearchSpace::new().add_float("tau", 0.05, 0.005);
        assert!(matches!(
            space.validate(),
            Err(SearchSpaceError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn rejects_linear_range_wider_than_f64() {
        let space = SearchSpace::new().add_float("x", -1e308, 1e308);
        assert!(matches!(
            space.validate(),
            Err(SearchSpaceError::RangeTooWide { .. })
        ));
        assert!(SearchSpace::new().add_float("x", -1e307, 1e307).validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_log_bounds() {
        let space = SearchSpace::new().add_log_uniform("action_noise", 0.0, 0.1);
        assert!(matches!(
            space.validate(),
            Err(SearchSpaceError::NonPositiveLogBounds { .. })
        ));
    }

    #[test]
    fn rejects_fractional_and_oversized_exponents() {
        let fractional = SearchSpace::new().add(ParameterDef::new("n_steps", Scale::Pow2, 6.5, 9.0));
        assert!(matches!(
            fractional.validate(),
            Err(SearchSpaceError::NonIntegerBounds { .. })
        ));

        let oversized = SearchSpace::new().add_pow2("n_steps", 7, 80);
        assert!(matches!(
            oversized.validate(),
            Err(SearchSpaceError::ExponentOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_duplicates_and_bad_targets() {
        let dup = SearchSpace::new().add_float("x", 0.0, 1.0).add_float("x", 0.0, 2.0);
        assert!(matches!(
            dup.validate(),
            Err(SearchSpaceError::DuplicateParameter { .. })
        ));

        let bad_target =
            SearchSpace::new().add(ParameterDef::new("x", Scale::Linear, 0.0, 1.0).with_target("algo..x"));
        assert!(matches!(
            bad_target.validate(),
            Err(SearchSpaceError::InvalidTarget { .. })
        ));

        let no_layers =
            SearchSpace::new().add(ParameterDef::new("w", Scale::Pow2, 5.0, 8.0).with_layers(0));
        assert!(matches!(
            no_layers.validate(),
            Err(SearchSpaceError::ZeroLayers { .. })
        ));
    }

    #[test]
    fn builds_from_specs() {
        let specs = vec![ParameterSpec {
            name: "critic_lr".into(),
            min: 1e-5,
            max: 1.0,
            scale: Scale::Log,
            target: Some("critic_optimizer.lr".into()),
            layers: None,
        }];
        let space = SearchSpace::from_specs(&specs).unwrap();
        assert_eq!(space.parameters[0].target, "critic_optimizer.lr");
    }

    #[test]
    fn parameter_value_display() {
        assert_eq!(ParameterValue::Int(7).to_string(), "7");
        assert_eq!(ParameterValue::Float(0.5).to_string(), "0.5");
        assert_eq!(ParameterValue::Int(3).as_f64(), 3.0);
    }
}
