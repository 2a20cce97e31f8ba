//! Seating optimizer.
//!
//! Seeded local search with multiple restarts:
//!
//! ```text
//! preflight ──► seed (greedy packing) ──► simulated annealing ──► conflict repair
//!                  × candidates restarts                               │
//!                                  dedup by partition, conflict-free first, then by overall
//! ```
//!
//! The search runs synchronously; callers put it on a blocking worker and
//! pass a [`CancellationToken`] plus a progress sink. Given the same graph,
//! config and seed, and with the iteration budget binding before the time
//! budget, two runs produce identical candidates.
//!
//! ## Modules
//!
//! - [`seed`] - greedy initial packing
//! - [`search`] - annealing loop and conflict repair

pub mod search;
pub mod seed;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::arrangement::models::{SeatAssignment, SpecialTable, Table};
use crate::constraints;
use crate::graph::{GuestGraph, PairKey};
use crate::scoring::{Score, ScoreContext, ScoreWeights};

/// Penalty in score points per co-seated conflict pair during search.
pub const CONFLICT_PENALTY: f64 = 50.0;

/// Penalty in score points per family pair split across tables, applied
/// when `keep_families_together` is set.
pub const FAMILY_SPLIT_PENALTY: f64 = 30.0;

/// Mixes the restart index into the base seed.
const RESTART_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Namespace for deterministic generated table ids.
const TABLE_NAMESPACE: Uuid = Uuid::from_u128(0x5ea7_0000_7ab1_4e00_8000_0000_0000_0000);

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub table_count: u32,
    pub table_capacity: u32,
    /// Number of generated tables marked VIP (the first ones)
    pub special_tables: u32,
    /// Explicit tables; overrides count × capacity when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<Table>>,
    pub weights: ScoreWeights,
    pub strength_threshold: f64,
    /// Proposals per restart
    pub max_iterations: u64,
    /// Wall-clock budget for the whole run
    pub time_budget_ms: u64,
    /// Number of restarts, each yielding at most one candidate (1–4)
    pub candidates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub initial_temperature: f64,
    /// Penalize splitting `family` pairs during search
    pub keep_families_together: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            table_count: 5,
            table_capacity: 8,
            special_tables: 0,
            tables: None,
            weights: ScoreWeights::default(),
            strength_threshold: 0.0,
            max_iterations: 50_000,
            time_budget_ms: 30_000,
            candidates: 3,
            seed: None,
            initial_temperature: 2.0,
            keep_families_together: true,
        }
    }
}

impl OptimizerConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    /// Tables to seat into: the explicit list, or `table_count` generated
    /// tables with stable ids.
    pub fn resolve_tables(&self) -> Vec<Table> {
        if let Some(tables) = &self.tables {
            return tables.clone();
        }
        (0..self.table_count)
            .map(|i| {
                let n = i + 1;
                let special = (i < self.special_tables).then_some(SpecialTable::Vip);
                Table {
                    id: Uuid::new_v5(&TABLE_NAMESPACE, format!("table-{}", n).as_bytes()),
                    name: if special.is_some() {
                        format!("VIP Table {}", n)
                    } else {
                        format!("Table {}", n)
                    },
                    capacity: self.table_capacity,
                    special,
                }
            })
            .collect()
    }

    fn validate(&self, tables: &[Table]) -> Result<(), OptimizeError> {
        if tables.is_empty() {
            return Err(OptimizeError::Validation("at least one table is required".into()));
        }
        if let Some(violation) = constraints::check_tables(tables).into_iter().next() {
            return Err(OptimizeError::Validation(violation.to_string()));
        }
        if self.tables.is_none() && self.special_tables > self.table_count {
            return Err(OptimizeError::Validation(
                "special table count exceeds table count".into(),
            ));
        }
        self.weights.validate().map_err(OptimizeError::Validation)?;
        if !self.strength_threshold.is_finite() || !(0.0..=1.0).contains(&self.strength_threshold) {
            return Err(OptimizeError::Validation(
                "strength threshold must be within [0.0, 1.0]".into(),
            ));
        }
        if !(1..=4).contains(&self.candidates) {
            return Err(OptimizeError::Validation(
                "candidate count must be between 1 and 4".into(),
            ));
        }
        if self.max_iterations == 0 && self.time_budget_ms == 0 {
            return Err(OptimizeError::Validation("search budget cannot be zero".into()));
        }
        if !self.initial_temperature.is_finite() || self.initial_temperature < 0.0 {
            return Err(OptimizeError::Validation(
                "initial temperature must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Errors, progress, results
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptimizeError {
    #[error("there are no guests to seat")]
    EmptyInput,
    #[error("insufficient capacity: {capacity} seats for {guests} guests")]
    InsufficientCapacity { capacity: usize, guests: usize },
    #[error("invalid optimizer configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Seeding,
    Searching,
    Finalizing,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seeding => write!(f, "seeding"),
            Self::Searching => write!(f, "searching"),
            Self::Finalizing => write!(f, "finalizing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub phase: Phase,
    pub percent: u8,
    pub message: String,
}

/// Forwards progress only when the phase or the whole percent changes.
pub(crate) struct ProgressTracker<'a> {
    sink: &'a mut dyn FnMut(Progress),
    last: Option<(Phase, u8)>,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(sink: &'a mut dyn FnMut(Progress)) -> Self {
        Self { sink, last: None }
    }

    pub(crate) fn report(&mut self, phase: Phase, percent: f64, message: impl FnOnce() -> String) {
        let percent = percent.clamp(0.0, 100.0) as u8;
        if self.last == Some((phase, percent)) {
            return;
        }
        self.last = Some((phase, percent));
        (self.sink)(Progress {
            phase,
            percent,
            message: message(),
        });
    }
}

/// One proposed seating produced by a restart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub assignment: SeatAssignment,
    pub score: Score,
    /// Conflict pairs still seated together after repair
    pub unresolved_conflicts: Vec<PairKey>,
    pub restart: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationOutcome {
    pub tables: Vec<Table>,
    /// Distinct candidates, conflict-free before annotated, then best overall
    pub candidates: Vec<Candidate>,
    pub cancelled: bool,
    pub iterations: u64,
    pub seed: u64,
    pub elapsed_ms: u64,
}

// ============================================================================
// Entry points
// ============================================================================

/// Validate inputs without searching. Returns the resolved tables.
pub fn preflight(graph: &GuestGraph, config: &OptimizerConfig) -> Result<Vec<Table>, OptimizeError> {
    let tables = config.resolve_tables();
    config.validate(&tables)?;

    let guests = graph.guest_count();
    if guests == 0 {
        return Err(OptimizeError::EmptyInput);
    }
    let capacity: usize = tables.iter().map(|t| t.capacity as usize).sum();
    if capacity < guests {
        return Err(OptimizeError::InsufficientCapacity { capacity, guests });
    }
    Ok(tables)
}

/// Run the full optimization.
///
/// Cancellation is checked between proposals. The first restart's seed is
/// always completed, so a cancelled run still returns at least one candidate.
pub fn optimize(
    graph: &GuestGraph,
    config: &OptimizerConfig,
    cancel: &CancellationToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<OptimizationOutcome, OptimizeError> {
    let tables = preflight(graph, config)?;
    let started = Instant::now();
    let deadline = started + config.time_budget();
    let base_seed = config.seed.unwrap_or_else(rand::random);
    let ctx = ScoreContext::new(graph, &tables, config.weights, config.strength_threshold);
    let restarts = config.candidates;
    let mut tracker = ProgressTracker::new(progress);

    info!(
        guests = ctx.guest_count(),
        tables = ctx.table_count(),
        restarts,
        seed = base_seed,
        "Starting seating optimization"
    );

    // Seeding
    let mut seeds = Vec::with_capacity(restarts);
    for restart in 0..restarts {
        if restart > 0 && cancel.is_cancelled() {
            break;
        }
        let mut rng = restart_rng(base_seed, restart);
        let assignment = seed::greedy_seed(&ctx, graph, config.strength_threshold, &mut rng);
        seeds.push((restart, assignment, rng));
        tracker.report(Phase::Seeding, 10.0 * (restart + 1) as f64 / restarts as f64, || {
            format!("Seeded restart {} of {}", restart + 1, restarts)
        });
    }

    // Searching
    let mut cancelled = cancel.is_cancelled();
    let mut iterations = 0;
    let mut results = Vec::with_capacity(seeds.len());
    for (restart, assignment, mut rng) in seeds {
        if cancelled {
            results.push((restart, assignment));
            continue;
        }
        let slice_end = started + config.time_budget().mul_f64((restart + 1) as f64 / restarts as f64);
        let params = search::SearchParams {
            max_iterations: config.max_iterations,
            deadline: slice_end.min(deadline),
            initial_temperature: config.initial_temperature,
            family_split_penalty: if config.keep_families_together {
                FAMILY_SPLIT_PENALTY
            } else {
                0.0
            },
        };
        let run = search::anneal(&ctx, assignment, &params, &mut rng, cancel, |fraction| {
            let overall = (restart as f64 + fraction) / restarts as f64;
            tracker.report(Phase::Searching, 10.0 + 80.0 * overall, || {
                format!("Searching restart {} of {}", restart + 1, restarts)
            });
        });
        debug!(
            restart,
            iterations = run.iterations,
            converged = run.converged,
            best = run.best_objective,
            "Restart finished"
        );
        iterations += run.iterations;
        cancelled |= run.cancelled;
        results.push((restart, run.best));
    }

    // Finalizing
    tracker.report(Phase::Finalizing, 90.0, || "Repairing conflicts".to_string());
    let total = results.len().max(1);
    let mut candidates: Vec<Candidate> = Vec::with_capacity(results.len());
    for (i, (restart, mut assignment)) in results.into_iter().enumerate() {
        search::repair_conflicts(&ctx, &mut assignment);
        let unresolved_conflicts = ctx
            .seated_conflicts(&assignment)
            .into_iter()
            .map(|(a, b)| PairKey::new(ctx.guest_id(a), ctx.guest_id(b)))
            .collect();
        candidates.push(Candidate {
            score: ctx.evaluate(&assignment),
            assignment: ctx.sparse(&assignment),
            unresolved_conflicts,
            restart,
        });
        tracker.report(Phase::Finalizing, 90.0 + 9.0 * (i + 1) as f64 / total as f64, || {
            "Scoring candidates".to_string()
        });
    }

    rank_candidates(&mut candidates);

    tracker.report(Phase::Finalizing, 100.0, || {
        format!("Optimization finished with {} candidates", candidates.len())
    });

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        candidates = candidates.len(),
        iterations,
        cancelled,
        elapsed_ms,
        best = candidates.first().map(|c| c.score.overall).unwrap_or(0.0),
        "Seating optimization finished"
    );

    Ok(OptimizationOutcome {
        tables,
        candidates,
        cancelled,
        iterations,
        seed: base_seed,
        elapsed_ms,
    })
}

/// Order candidates best first and drop duplicate partitions.
///
/// Conflict-free candidates always win: when at least one exists, every
/// candidate with unresolved conflicts is dropped. Otherwise the fewest
/// unresolved conflicts rank first, then the best overall score.
pub fn rank_candidates(candidates: &mut Vec<Candidate>) {
    candidates.sort_by(|a, b| {
        a.unresolved_conflicts
            .len()
            .cmp(&b.unresolved_conflicts.len())
            .then(b.score.overall.total_cmp(&a.score.overall))
            .then(a.restart.cmp(&b.restart))
    });
    if candidates.iter().any(|c| c.unresolved_conflicts.is_empty()) {
        candidates.retain(|c| c.unresolved_conflicts.is_empty());
    }
    let mut seen = BTreeSet::new();
    candidates.retain(|c| seen.insert(partition_signature(&c.assignment)));
}

fn restart_rng(base_seed: u64, restart: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(base_seed ^ (restart as u64).wrapping_mul(RESTART_SEED_MIX))
}

/// Grouping of guests into tables, ignoring which table holds which group.
pub fn partition_signature(assignment: &SeatAssignment) -> BTreeSet<BTreeSet<Uuid>> {
    let mut groups: std::collections::HashMap<Uuid, BTreeSet<Uuid>> = Default::default();
    for (guest, table) in assignment {
        groups.entry(*table).or_default().insert(*guest);
    }
    groups.into_values().collect()
}

// ============================================================================
// Tests
// ============================================================================
