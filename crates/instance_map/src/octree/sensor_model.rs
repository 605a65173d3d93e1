//! Probabilistic sensor model: log-odds updates with clamping.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Convert a probability to log-odds.
#[inline]
pub fn logodds(probability: f64) -> f32 {
  (probability / (1.0 - probability)).ln() as f32
}

/// Convert log-odds back to a probability.
#[inline]
pub fn probability(log_odds: f32) -> f64 {
  1.0 - 1.0 / (1.0 + (log_odds as f64).exp())
}

/// Hit/miss probabilities and clamping thresholds of an occupancy index.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorModel {
  /// Probability applied for an endpoint observation.
  pub hit: f64,
  /// Probability applied for a traversed (free) cell.
  pub miss: f64,
  /// Lower occupancy bound of any cell.
  pub clamp_min: f64,
  /// Upper occupancy bound of any cell.
  pub clamp_max: f64,
}

impl Default for SensorModel {
  fn default() -> Self {
    Self {
      hit: 0.7,
      miss: 0.4,
      clamp_min: 0.12,
      clamp_max: 0.97,
    }
  }
}

impl SensorModel {
  pub fn new(hit: f64, miss: f64, clamp_min: f64, clamp_max: f64) -> Self {
    Self {
      hit,
      miss,
      clamp_min,
      clamp_max,
    }
  }

  /// Check the probabilities describe a usable model.
  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, value) in [
      ("hit", self.hit),
      ("miss", self.miss),
      ("clamp_min", self.clamp_min),
      ("clamp_max", self.clamp_max),
    ] {
      if !(value > 0.0 && value < 1.0) {
        return Err(ConfigError::InvalidProbability { name, value });
      }
    }
    if self.hit <= 0.5 || self.miss >= 0.5 {
      return Err(ConfigError::InvalidOrdering(format!(
        "expected miss < 0.5 < hit, got miss {} and hit {}",
        self.miss, self.hit
      )));
    }
    if self.clamp_min >= self.clamp_max {
      return Err(ConfigError::InvalidOrdering(format!(
        "expected clamp_min < clamp_max, got {} and {}",
        self.clamp_min, self.clamp_max
      )));
    }
    Ok(())
  }

  /// Precomputed log-odds form used by the tree.
  pub fn log_odds(&self) -> LogOddsModel {
    LogOddsModel {
      hit: logodds(self.hit),
      miss: logodds(self.miss),
      min: logodds(self.clamp_min),
      max: logodds(self.clamp_max),
    }
  }
}

/// Log-odds increments and bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogOddsModel {
  pub hit: f32,
  pub miss: f32,
  pub min: f32,
  pub max: f32,
}

impl LogOddsModel {
  /// Apply one observation to `value`, clamped to `[min, max]`.
  #[inline]
  pub fn apply(&self, value: f32, occupied: bool) -> f32 {
    let delta = if occupied { self.hit } else { self.miss };
    (value + delta).clamp(self.min, self.max)
  }

  /// True when `value` has reached the upper clamping bound.
  #[inline]
  pub fn is_confident(&self, value: f32) -> bool {
    value >= self.max
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_logodds_roundtrip() {
    for p in [0.12, 0.4, 0.5, 0.7, 0.97] {
      assert!((probability(logodds(p)) - p).abs() < 1e-6, "p = {}", p);
    }
    assert_eq!(logodds(0.5), 0.0);
  }

  #[test]
  fn test_apply_clamps_both_ends() {
    let model = SensorModel::default().log_odds();
    let mut value = 0.0;
    for _ in 0..100 {
      value = model.apply(value, true);
    }
    assert_eq!(value, model.max);
    assert!(model.is_confident(value));

    for _ in 0..100 {
      value = model.apply(value, false);
    }
    assert_eq!(value, model.min);
  }

  #[test]
  fn test_validate_rejects_bad_models() {
    assert!(SensorModel::default().validate().is_ok());
    assert!(SensorModel::new(1.2, 0.4, 0.12, 0.97).validate().is_err());
    assert!(SensorModel::new(0.4, 0.3, 0.12, 0.97).validate().is_err());
    assert!(SensorModel::new(0.7, 0.4, 0.97, 0.12).validate().is_err());
  }
}
