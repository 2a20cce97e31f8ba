//! Request and response types of the seating service.

use serde::{Deserialize, Serialize};

use crate::arrangement::{ArrangementId, SeatAssignment, Table};
use crate::constraints::Violation;
use crate::graph::{Guest, GuestAttributes, GuestId, Relationship, RelationshipType};
use crate::optimizer::OptimizerConfig;
use crate::scoring::{Score, ScoreSettings, ScoreWeights};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub settings: Option<ScoreSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGuest {
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub attributes: GuestAttributes,
}

impl NewGuest {
    pub fn into_guest(self) -> Guest {
        Guest::new(self.name.trim(), self.group.trim()).with_attributes(self.attributes)
    }
}

/// Relationship write; `strength` defaults to the type's default strength.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipInput {
    pub a: GuestId,
    pub b: GuestId,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Neighbor {
    pub guest: Guest,
    pub relationship: Relationship,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateArrangementRequest {
    pub name: String,
    /// Defaults to the event's tables
    #[serde(default)]
    pub tables: Option<Vec<Table>>,
    #[serde(default)]
    pub assignment: SeatAssignment,
}

/// Score an assignment without storing it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoreRequest {
    #[serde(default)]
    pub tables: Option<Vec<Table>>,
    pub assignment: SeatAssignment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreReport {
    pub score: Score,
    pub violations: Vec<Violation>,
}

/// Optimization request. Unset fields fall back to the event's settings and
/// then to the service defaults.
///
/// Tables resolve as: explicit `tables`, else generated from `table_count` /
/// `table_capacity` when either is given, else the target arrangement's
/// tables, else the event's tables, else generated from the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptimizeRequest {
    #[serde(default)]
    pub target: Option<ArrangementId>,
    #[serde(default)]
    pub tables: Option<Vec<Table>>,
    #[serde(default)]
    pub table_count: Option<u32>,
    #[serde(default)]
    pub table_capacity: Option<u32>,
    #[serde(default)]
    pub special_tables: Option<u32>,
    #[serde(default)]
    pub weights: Option<ScoreWeights>,
    #[serde(default)]
    pub strength_threshold: Option<f64>,
    #[serde(default)]
    pub max_iterations: Option<u64>,
    #[serde(default)]
    pub time_budget_ms: Option<u64>,
    #[serde(default)]
    pub candidates: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub initial_temperature: Option<f64>,
    #[serde(default)]
    pub keep_families_together: Option<bool>,
}

impl OptimizeRequest {
    pub fn resolve(
        &self,
        defaults: &OptimizerConfig,
        settings: &ScoreSettings,
        event_tables: &[Table],
        target_tables: Option<&[Table]>,
    ) -> OptimizerConfig {
        let generated = self.table_count.is_some() || self.table_capacity.is_some();
        let tables = match (&self.tables, target_tables) {
            (Some(tables), _) => Some(tables.clone()),
            _ if generated => None,
            (None, Some(tables)) if !tables.is_empty() => Some(tables.to_vec()),
            _ if !event_tables.is_empty() => Some(event_tables.to_vec()),
            _ => defaults.tables.clone(),
        };

        OptimizerConfig {
            table_count: self.table_count.unwrap_or(defaults.table_count),
            table_capacity: self.table_capacity.unwrap_or(defaults.table_capacity),
            special_tables: self.special_tables.unwrap_or(defaults.special_tables),
            tables,
            weights: self.weights.unwrap_or(settings.weights),
            strength_threshold: self.strength_threshold.unwrap_or(settings.strength_threshold),
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            time_budget_ms: self.time_budget_ms.unwrap_or(defaults.time_budget_ms),
            candidates: self.candidates.unwrap_or(defaults.candidates),
            seed: self.seed.or(defaults.seed),
            initial_temperature: self.initial_temperature.unwrap_or(defaults.initial_temperature),
            keep_families_together: self
                .keep_families_together
                .unwrap_or(defaults.keep_families_together),
        }
    }
}
