//! Cycle scoring
//!
//! Deterministic quality metric over a canonical cycle: a weighted blend of
//! efficiency (shorter cycles preferred), fairness (participants give up
//! comparable value, judged by the coefficient of variation of the item
//! valuations), and completeness (an extension point, currently always
//! satisfied by construction). Same cycle + same valuations always produces
//! the same score, and the ranking order is total: score descending, then
//! length ascending, then canonical key.

use crate::discovery::canonical::CanonicalCycle;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const WEIGHT_EFFICIENCY: f64 = 0.4;
pub const WEIGHT_FAIRNESS: f64 = 0.4;
pub const WEIGHT_COMPLETENESS: f64 = 0.2;

/// Per-term breakdown of a cycle score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    /// 1 / k for a cycle of length k
    pub efficiency: f64,

    /// 1 − cv(valuations) clamped to [0, 1]; 1.0 when valuations are absent
    pub fairness: f64,

    /// Always 1.0 for cycles by construction; reserved as an extension point
    pub completeness: f64,
}

/// A canonical cycle with its composite score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCycle {
    pub cycle: CanonicalCycle,
    pub score: f64,
    pub sub_scores: SubScores,
}

/// Score a canonical cycle.
///
/// `valuation` resolves an item id to its opaque valuation when one was
/// submitted. Fairness is only meaningful when every item in the cycle is
/// valued; with any valuation missing it defaults to 1.0.
pub fn score_cycle<F>(cycle: CanonicalCycle, valuation: F) -> ScoredCycle
where
    F: Fn(&str) -> Option<f64>,
{
    let k = cycle.len();
    let efficiency = if k == 0 { 0.0 } else { 1.0 / k as f64 };

    let values: Vec<f64> = cycle.items().iter().filter_map(|item| valuation(item)).collect();
    let fairness = if values.len() == cycle.items().len() && !values.is_empty() {
        fairness_from_values(&values)
    } else {
        1.0
    };

    let completeness = 1.0;

    let score = WEIGHT_EFFICIENCY * efficiency
        + WEIGHT_FAIRNESS * fairness
        + WEIGHT_COMPLETENESS * completeness;

    ScoredCycle {
        cycle,
        score,
        sub_scores: SubScores {
            efficiency,
            fairness,
            completeness,
        },
    }
}

/// 1 − (stdev / mean), clamped to [0, 1]. Non-positive means degrade to 0.
fn fairness_from_values(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    let stdev = variance.sqrt();
    (1.0 - stdev / mean).clamp(0.0, 1.0)
}

/// Total ranking order for scored cycles: score descending, then length
/// ascending, then canonical key, so query output is deterministic.
pub fn rank(a: &ScoredCycle, b: &ScoredCycle) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.cycle.len().cmp(&b.cycle.len()))
        .then_with(|| a.cycle.key().cmp(b.cycle.key()))
}
