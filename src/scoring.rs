//! Signal quality scoring
//!
//! Turns the towers along a route into a single 0-5 score. Average signal
//! strength dominates, tower density is a secondary factor capped at a fixed
//! count.

use serde::{Deserialize, Serialize};

use crate::models::{ScoredTower, TowerRecord};

/// Upper end of the score scale
pub const MAX_SCORE: f64 = 5.0;

/// Anything carrying an average signal reading
pub trait SignalSample {
    fn average_signal_dbm(&self) -> Option<i32>;
}

impl SignalSample for TowerRecord {
    fn average_signal_dbm(&self) -> Option<i32> {
        self.average_signal_dbm
    }
}

impl SignalSample for ScoredTower {
    fn average_signal_dbm(&self) -> Option<i32> {
        self.tower.average_signal_dbm
    }
}

/// Tunable constants of the score formula
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Share of the score coming from signal strength
    #[serde(default = "default_signal_weight")]
    pub signal_weight: f64,
    /// Share of the score coming from tower count
    #[serde(default = "default_count_weight")]
    pub count_weight: f64,
    /// Tower count at which the count factor saturates
    #[serde(default = "default_count_cap")]
    pub count_cap: u32,
    /// Value assumed for towers without a signal reading
    #[serde(default = "default_missing_signal_dbm")]
    pub missing_signal_dbm: i32,
    /// Weakest signal, maps to 0
    #[serde(default = "default_floor_dbm")]
    pub floor_dbm: f64,
    /// dBm per score point
    #[serde(default = "default_dbm_per_point")]
    pub dbm_per_point: f64,
}

fn default_signal_weight() -> f64 {
    0.7
}

fn default_count_weight() -> f64 {
    0.3
}

fn default_count_cap() -> u32 {
    20
}

fn default_missing_signal_dbm() -> i32 {
    -100
}

fn default_floor_dbm() -> f64 {
    -120.0
}

fn default_dbm_per_point() -> f64 {
    14.0
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            signal_weight: default_signal_weight(),
            count_weight: default_count_weight(),
            count_cap: default_count_cap(),
            missing_signal_dbm: default_missing_signal_dbm(),
            floor_dbm: default_floor_dbm(),
            dbm_per_point: default_dbm_per_point(),
        }
    }
}

/// Stateless scorer
#[derive(Debug, Clone, Default)]
pub struct SignalScorer {
    weights: ScoringWeights,
}

impl SignalScorer {
    #[must_use]
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Score a set of towers on the `[0, 5]` scale. Empty input scores 0.
    #[must_use]
    pub fn score<T: SignalSample>(&self, towers: &[T]) -> f64 {
        if towers.is_empty() {
            return 0.0;
        }
        let w = &self.weights;

        let total: f64 = towers
            .iter()
            .map(|t| f64::from(t.average_signal_dbm().unwrap_or(w.missing_signal_dbm)))
            .sum();
        let avg = total / towers.len() as f64;

        let norm_signal = ((avg - w.floor_dbm) / w.dbm_per_point).clamp(0.0, MAX_SCORE);
        let count_factor = (towers.len() as f64 / f64::from(w.count_cap.max(1))).min(1.0);

        let score = norm_signal * w.signal_weight + MAX_SCORE * count_factor * w.count_weight;
        score.clamp(0.0, MAX_SCORE)
    }
}
