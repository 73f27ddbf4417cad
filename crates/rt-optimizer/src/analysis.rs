//! Post-hoc analysis of a study's trials: best trial, optimization history
//! and parameter importances.

use rt_types::ObjectiveDirection;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::trial::Trial;

/// Best completed trial under `direction`. Ties go to the lowest trial number.
pub fn best_trial(trials: &[Trial], direction: ObjectiveDirection) -> Option<&Trial> {
    trials
        .iter()
        .filter_map(|t| t.ranked_value().map(|v| (t, v)))
        .min_by(|(a, va), (b, vb)| {
            let by_value = match direction {
                ObjectiveDirection::Maximize => vb.total_cmp(va),
                ObjectiveDirection::Minimize => va.total_cmp(vb),
            };
            by_value.then(a.number.cmp(&b.number))
        })
        .map(|(t, _)| t)
}

/// One point of the optimization-history chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub trial_number: usize,
    pub value: f64,
    /// Best value among completed trials up to and including this one.
    pub best_value: f64,
}

/// Objective value and best-so-far, per completed trial in number order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationHistory {
    pub points: Vec<HistoryPoint>,
}

impl OptimizationHistory {
    pub fn from_trials(trials: &[Trial], direction: ObjectiveDirection) -> Self {
        let mut completed: Vec<(usize, f64)> = trials
            .iter()
            .filter_map(|t| t.ranked_value().map(|v| (t.number, v)))
            .collect();
        completed.sort_by_key(|(number, _)| *number);

        let mut best: Option<f64> = None;
        let points = completed
            .into_iter()
            .map(|(trial_number, value)| {
                let best_value = match best {
                    Some(b) if !direction.is_better(value, b) => b,
                    _ => value,
                };
                best = Some(best_value);
                HistoryPoint {
                    trial_number,
                    value,
                    best_value,
                }
            })
            .collect();
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Importance of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamImportance {
    pub param: String,
    pub importance: f64,
}

/// Normalized absolute Spearman correlation between each parameter and the
/// objective, over completed trials. Sorted most important first; the
/// importances sum to 1 unless every correlation is zero.
pub fn param_importances(trials: &[Trial]) -> Vec<ParamImportance> {
    let completed: Vec<(&Trial, f64)> = trials
        .iter()
        .filter_map(|t| t.ranked_value().filter(|v| v.is_finite()).map(|v| (t, v)))
        .collect();
    if completed.len() < 2 {
        return Vec::new();
    }

    let names: BTreeSet<&str> = completed
        .iter()
        .flat_map(|(t, _)| t.params.keys().map(String::as_str))
        .collect();

    let mut importances: Vec<ParamImportance> = names
        .into_iter()
        .filter_map(|name| {
            let (xs, ys): (Vec<f64>, Vec<f64>) = completed
                .iter()
                .filter_map(|(t, v)| t.params.get(name).map(|p| (p.as_f64(), *v)))
                .unzip();
            (xs.len() >= 2).then(|| ParamImportance {
                param: name.to_string(),
                importance: spearman(&xs, &ys).abs(),
            })
        })
        .collect();

    let total: f64 = importances.iter().map(|p| p.importance).sum();
    if total > 0.0 {
        for p in &mut importances {
            p.importance /= total;
        }
    }
    importances.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.param.cmp(&b.param))
    });
    importances
}

/// Average 1-based ranks; ties share the mean of their positions.
fn rank(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut indexed: Vec<(usize, f64)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && indexed[j].1 == indexed[i].1 {
            j += 1;
        }
        let avg = (i + 1..=j).sum::<usize>() as f64 / (j - i) as f64;
        for item in &indexed[i..j] {
            ranks[item.0] = avg;
        }
        i = j;
    }
    ranks
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        cov / denom
    }
}

fn spearman(x: &[f64], y: &[f64]) -> f64 {
    pearson(&rank(x), &rank(y))
}
