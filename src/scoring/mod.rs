//! Multi-metric arrangement scoring.
//!
//! Every metric lies in `[0, 100]`:
//!
//! - **satisfaction** - co-seated positive relationship mass relative to an
//!   upper bound on what the tables could ever hold
//! - **conflict_resolution** - share of conflict pairs not seated together
//! - **balance** - evenness of group / age / dietary mix and of table fill
//!   across non-special tables
//! - **overall** - weighted mean of the three
//!
//! Scoring is pure and deterministic. The optimizer evaluates through a
//! precomputed [`ScoreContext`]; [`score_assignment`] is the standalone entry.

mod context;

pub use context::ScoreContext;

use serde::{Deserialize, Serialize};

use crate::arrangement::models::{SeatAssignment, Table};
use crate::graph::GuestGraph;

// ============================================================================
// Score & weights
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub satisfaction: f64,
    pub conflict_resolution: f64,
    pub balance: f64,
    pub overall: f64,
}

impl Default for Score {
    fn default() -> Self {
        Self {
            satisfaction: 100.0,
            conflict_resolution: 100.0,
            balance: 100.0,
            overall: 100.0,
        }
    }
}

/// Relative priority of the three metrics in `overall`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub satisfaction: f64,
    pub conflict_resolution: f64,
    pub balance: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            satisfaction: 0.4,
            conflict_resolution: 0.35,
            balance: 0.25,
        }
    }
}

impl ScoreWeights {
    /// Weights must be finite, non-negative, and not all zero.
    pub fn validate(&self) -> Result<(), String> {
        let all = [self.satisfaction, self.conflict_resolution, self.balance];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("priority weights must be finite and non-negative".into());
        }
        if all.iter().sum::<f64>() <= 0.0 {
            return Err("priority weights must not all be zero".into());
        }
        Ok(())
    }

    pub fn combine(&self, satisfaction: f64, conflict_resolution: f64, balance: f64) -> f64 {
        let total = self.satisfaction + self.conflict_resolution + self.balance;
        if total <= 0.0 {
            return 0.0;
        }
        let weighted = self.satisfaction * satisfaction
            + self.conflict_resolution * conflict_resolution
            + self.balance * balance;
        (weighted / total).clamp(0.0, 100.0)
    }
}

/// Scoring parameters stored with an event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreSettings {
    pub weights: ScoreWeights,
    /// Positive relationships weaker than this are ignored by satisfaction
    pub strength_threshold: f64,
}

impl Default for ScoreSettings {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            strength_threshold: 0.0,
        }
    }
}

/// Score a map-form assignment. Guests or tables unknown to the inputs are ignored.
pub fn score_assignment(
    graph: &GuestGraph,
    tables: &[Table],
    assignment: &SeatAssignment,
    weights: &ScoreWeights,
    threshold: f64,
) -> Score {
    let ctx = ScoreContext::new(graph, tables, *weights, threshold);
    ctx.evaluate(&ctx.dense(assignment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_valid() {
        assert!(ScoreWeights::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let zero = ScoreWeights {
            satisfaction: 0.0,
            conflict_resolution: 0.0,
            balance: 0.0,
        };
        assert!(zero.validate().is_err());
        let negative = ScoreWeights {
            satisfaction: -1.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
        let nan = ScoreWeights {
            balance: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_combine_is_weighted_mean() {
        let w = ScoreWeights::default();
        let overall = w.combine(50.0, 100.0, 0.0);
        assert!((overall - (0.4 * 50.0 + 0.35 * 100.0) / 1.0).abs() < 1e-9);

        let only_balance = ScoreWeights {
            satisfaction: 0.0,
            conflict_resolution: 0.0,
            balance: 2.0,
        };
        assert!((only_balance.combine(10.0, 20.0, 70.0) - 70.0).abs() < 1e-9);
    }
}
