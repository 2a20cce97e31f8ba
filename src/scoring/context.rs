//! Dense scoring context.
//!
//! Guests and tables are mapped to contiguous indices once; an assignment is
//! then a `&[Option<usize>]` (guest index → table index). The optimizer keeps
//! one context for a whole run and evaluates thousands of proposals against it.

use std::collections::HashMap;

use super::{Score, ScoreWeights};
use crate::arrangement::models::{SeatAssignment, Table, TableId};
use crate::graph::{GuestGraph, GuestId, RelationshipType};

/// Weight of attribute imbalance in the balance metric; occupancy takes the rest.
const ATTRIBUTE_SHARE: f64 = 0.7;

/// One balancing dimension (group tag, age range, dietary need).
#[derive(Debug, Clone)]
struct Dimension {
    /// Labels carried by each guest (a guest may carry none, or several)
    guest_labels: Vec<Vec<usize>>,
    label_count: usize,
}

impl Dimension {
    fn from_labels<F>(graph: &GuestGraph, mut labels_of: F) -> Option<Self>
    where
        F: FnMut(&crate::graph::Guest) -> Vec<String>,
    {
        let mut label_ids: HashMap<String, usize> = HashMap::new();
        let guest_labels: Vec<Vec<usize>> = graph
            .guests()
            .map(|guest| {
                let mut ids: Vec<usize> = labels_of(guest)
                    .into_iter()
                    .filter(|l| !l.is_empty())
                    .map(|l| {
                        let next = label_ids.len();
                        *label_ids.entry(l).or_insert(next)
                    })
                    .collect();
                ids.sort_unstable();
                ids.dedup();
                ids
            })
            .collect();

        if label_ids.is_empty() {
            return None;
        }
        Some(Self {
            guest_labels,
            label_count: label_ids.len(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScoreContext {
    guest_ids: Vec<GuestId>,
    guest_index: HashMap<GuestId, usize>,
    table_ids: Vec<TableId>,
    table_index: HashMap<TableId, usize>,
    capacities: Vec<usize>,
    special: Vec<bool>,
    /// Positive relationships at or above the threshold
    adj: Vec<Vec<(usize, f64)>>,
    positive_pairs: Vec<(usize, usize, f64)>,
    conflict_adj: Vec<Vec<usize>>,
    conflict_pairs: Vec<(usize, usize)>,
    family_pairs: Vec<(usize, usize)>,
    positive_mass: f64,
    mass_bound: f64,
    dimensions: Vec<Dimension>,
    weights: ScoreWeights,
}

impl ScoreContext {
    pub fn new(graph: &GuestGraph, tables: &[Table], weights: ScoreWeights, threshold: f64) -> Self {
        let guest_ids: Vec<GuestId> = graph.guests().map(|g| g.id).collect();
        let guest_index: HashMap<GuestId, usize> =
            guest_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let table_ids: Vec<TableId> = tables.iter().map(|t| t.id).collect();
        let table_index: HashMap<TableId, usize> =
            table_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let n = guest_ids.len();
        let mut adj = vec![Vec::new(); n];
        let mut conflict_adj = vec![Vec::new(); n];
        let mut positive_pairs = Vec::new();
        let mut conflict_pairs = Vec::new();
        let mut family_pairs = Vec::new();

        for rel in graph.relationships() {
            let (Some(&a), Some(&b)) = (guest_index.get(&rel.a), guest_index.get(&rel.b)) else {
                continue;
            };
            let (a, b) = (a.min(b), a.max(b));
            if rel.kind == RelationshipType::Family {
                family_pairs.push((a, b));
            }
            if rel.is_conflict() {
                conflict_adj[a].push(b);
                conflict_adj[b].push(a);
                conflict_pairs.push((a, b));
            } else if rel.strength > 0.0 && rel.strength >= threshold {
                adj[a].push((b, rel.strength));
                adj[b].push((a, rel.strength));
                positive_pairs.push((a, b, rel.strength));
            }
        }

        let positive_mass: f64 = positive_pairs.iter().map(|(_, _, s)| s).sum();
        let max_capacity = tables.iter().map(|t| t.capacity as usize).max().unwrap_or(0);
        let mass_bound = mass_upper_bound(&adj, max_capacity.saturating_sub(1)).min(positive_mass);

        let dimensions = [
            Dimension::from_labels(graph, |g| vec![g.group.trim().to_string()]),
            Dimension::from_labels(graph, |g| {
                g.attributes
                    .age_range
                    .iter()
                    .map(|a| a.trim().to_string())
                    .collect()
            }),
            Dimension::from_labels(graph, |g| {
                g.attributes
                    .dietary_needs
                    .iter()
                    .map(|d| d.trim().to_lowercase())
                    .collect()
            }),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self {
            guest_ids,
            guest_index,
            table_ids,
            table_index,
            capacities: tables.iter().map(|t| t.capacity as usize).collect(),
            special: tables.iter().map(|t| t.is_special()).collect(),
            adj,
            positive_pairs,
            conflict_adj,
            conflict_pairs,
            family_pairs,
            positive_mass,
            mass_bound,
            dimensions,
            weights,
        }
    }

    // ------------------------------------------------------------------------
    // Index mapping
    // ------------------------------------------------------------------------

    pub fn guest_count(&self) -> usize {
        self.guest_ids.len()
    }

    pub fn table_count(&self) -> usize {
        self.table_ids.len()
    }

    pub fn guest_id(&self, index: usize) -> GuestId {
        self.guest_ids[index]
    }

    pub fn table_id(&self, index: usize) -> TableId {
        self.table_ids[index]
    }

    pub fn guest_index(&self, id: GuestId) -> Option<usize> {
        self.guest_index.get(&id).copied()
    }

    pub fn capacity(&self, table: usize) -> usize {
        self.capacities[table]
    }

    pub fn total_capacity(&self) -> usize {
        self.capacities.iter().sum()
    }

    pub fn neighbors(&self, guest: usize) -> &[(usize, f64)] {
        &self.adj[guest]
    }

    pub fn conflicts(&self, guest: usize) -> &[usize] {
        &self.conflict_adj[guest]
    }

    pub fn conflict_pairs(&self) -> &[(usize, usize)] {
        &self.conflict_pairs
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Map-form → dense. Unknown guests or tables are dropped.
    pub fn dense(&self, assignment: &SeatAssignment) -> Vec<Option<usize>> {
        let mut dense = vec![None; self.guest_count()];
        for (guest, table) in assignment {
            if let (Some(&g), Some(&t)) = (self.guest_index.get(guest), self.table_index.get(table)) {
                dense[g] = Some(t);
            }
        }
        dense
    }

    pub fn sparse(&self, dense: &[Option<usize>]) -> SeatAssignment {
        dense
            .iter()
            .enumerate()
            .filter_map(|(g, t)| t.map(|t| (self.guest_ids[g], self.table_ids[t])))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Local quantities used by the search
    // ------------------------------------------------------------------------

    /// Sum of positive strengths between `guest` and the guests seated at `table`.
    pub fn table_affinity(&self, guest: usize, table: usize, assignment: &[Option<usize>]) -> f64 {
        self.adj[guest]
            .iter()
            .filter(|(other, _)| assignment[*other] == Some(table))
            .map(|(_, s)| s)
            .sum()
    }

    /// Number of `guest`'s conflicts seated at `table`.
    pub fn table_conflicts(&self, guest: usize, table: usize, assignment: &[Option<usize>]) -> usize {
        self.conflict_adj[guest]
            .iter()
            .filter(|other| assignment[**other] == Some(table))
            .count()
    }

    /// Conflict pairs seated at the same table.
    pub fn seated_conflicts(&self, assignment: &[Option<usize>]) -> Vec<(usize, usize)> {
        self.conflict_pairs
            .iter()
            .filter(|(a, b)| assignment[*a].is_some() && assignment[*a] == assignment[*b])
            .copied()
            .collect()
    }

    /// Family pairs with both guests seated at different tables.
    pub fn split_family_pairs(&self, assignment: &[Option<usize>]) -> usize {
        self.family_pairs
            .iter()
            .filter(|(a, b)| matches!((assignment[*a], assignment[*b]), (Some(x), Some(y)) if x != y))
            .count()
    }

    pub fn table_sizes(&self, assignment: &[Option<usize>]) -> Vec<usize> {
        let mut sizes = vec![0; self.table_count()];
        for t in assignment.iter().flatten() {
            sizes[*t] += 1;
        }
        sizes
    }

    // ------------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------------

    pub fn evaluate(&self, assignment: &[Option<usize>]) -> Score {
        let satisfaction = self.satisfaction(assignment);
        let conflict_resolution = self.conflict_resolution(assignment);
        let balance = self.balance(assignment);
        Score {
            satisfaction,
            conflict_resolution,
            balance,
            overall: self
                .weights
                .combine(satisfaction, conflict_resolution, balance),
        }
    }

    pub fn satisfaction(&self, assignment: &[Option<usize>]) -> f64 {
        if self.positive_mass <= 0.0 || self.mass_bound <= 0.0 {
            return 100.0;
        }
        let achieved: f64 = self
            .positive_pairs
            .iter()
            .filter(|(a, b, _)| assignment[*a].is_some() && assignment[*a] == assignment[*b])
            .map(|(_, _, s)| s)
            .sum();
        (100.0 * achieved / self.mass_bound).clamp(0.0, 100.0)
    }

    pub fn conflict_resolution(&self, assignment: &[Option<usize>]) -> f64 {
        if self.conflict_pairs.is_empty() {
            return 100.0;
        }
        let unresolved = self.seated_conflicts(assignment).len();
        100.0 * (1.0 - unresolved as f64 / self.conflict_pairs.len() as f64)
    }

    pub fn balance(&self, assignment: &[Option<usize>]) -> f64 {
        let regular: Vec<usize> = (0..self.table_count())
            .filter(|t| !self.special[*t])
            .collect();
        if regular.len() < 2 {
            return 100.0;
        }
        let sizes = self.table_sizes(assignment);

        let imbalance = ATTRIBUTE_SHARE * self.attribute_imbalance(assignment, &regular, &sizes)
            + (1.0 - ATTRIBUTE_SHARE) * self.occupancy_imbalance(&regular, &sizes);
        (100.0 * (1.0 - imbalance)).clamp(0.0, 100.0)
    }

    /// Coefficient of variation of fill ratios, capped at 1.
    fn occupancy_imbalance(&self, regular: &[usize], sizes: &[usize]) -> f64 {
        let fills: Vec<f64> = regular
            .iter()
            .map(|t| sizes[*t] as f64 / self.capacities[*t].max(1) as f64)
            .collect();
        let mean = fills.iter().sum::<f64>() / fills.len() as f64;
        if mean <= 0.0 {
            return 0.0;
        }
        let variance = fills.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / fills.len() as f64;
        (variance.sqrt() / mean).min(1.0)
    }

    /// Mean normalized label spread over dimensions, 0 when fewer than two
    /// regular tables are occupied.
    fn attribute_imbalance(&self, assignment: &[Option<usize>], regular: &[usize], sizes: &[usize]) -> f64 {
        let occupied: Vec<usize> = regular.iter().copied().filter(|t| sizes[*t] > 0).collect();
        if occupied.len() < 2 {
            return 0.0;
        }
        let mut counted = vec![false; self.table_count()];
        for t in &occupied {
            counted[*t] = true;
        }
        let total: f64 = occupied.iter().map(|t| sizes[*t] as f64).sum();

        let mut per_dimension = Vec::with_capacity(self.dimensions.len());
        for dim in &self.dimensions {
            let mut counts = vec![vec![0usize; self.table_count()]; dim.label_count];
            for (guest, table) in assignment.iter().enumerate() {
                let Some(t) = table else { continue };
                if !counted[*t] {
                    continue;
                }
                for label in &dim.guest_labels[guest] {
                    counts[*label][*t] += 1;
                }
            }

            let mut weighted = 0.0;
            let mut weight_sum = 0.0;
            for label_counts in &counts {
                let n_label: usize = occupied.iter().map(|t| label_counts[*t]).sum();
                if n_label == 0 {
                    continue;
                }
                let p = n_label as f64 / total;
                weight_sum += p;
                let bernoulli = (p * (1.0 - p)).sqrt();
                if bernoulli <= 1e-12 {
                    continue;
                }
                let variance: f64 = occupied
                    .iter()
                    .map(|t| {
                        let size = sizes[*t] as f64;
                        let share = label_counts[*t] as f64 / size;
                        (size / total) * (share - p).powi(2)
                    })
                    .sum();
                weighted += p * (variance.sqrt() / bernoulli).min(1.0);
            }
            if weight_sum > 0.0 {
                per_dimension.push(weighted / weight_sum);
            }
        }

        if per_dimension.is_empty() {
            0.0
        } else {
            per_dimension.iter().sum::<f64>() / per_dimension.len() as f64
        }
    }
}

/// Σ over guests of their top-`k` positive strengths, halved.
fn mass_upper_bound(adj: &[Vec<(usize, f64)>], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let total: f64 = adj
        .iter()
        .map(|edges| {
            let mut strengths: Vec<f64> = edges.iter().map(|(_, s)| *s).collect();
            strengths.sort_by(|a, b| b.total_cmp(a));
            strengths.iter().take(k).sum::<f64>()
        })
        .sum();
    total / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::models::SpecialTable;
    use crate::graph::{Guest, GuestAttributes, RelationshipType};

    fn guests(groups: &[&str]) -> (GuestGraph, Vec<GuestId>) {
        let mut g = GuestGraph::new();
        let mut ids = Vec::new();
        for (i, group) in groups.iter().enumerate() {
            let guest = Guest::new(format!("Guest {}", i), *group);
            ids.push(guest.id);
            g.add_guest(guest).unwrap();
        }
        (g, ids)
    }

    fn seat(pairs: &[(GuestId, &Table)]) -> SeatAssignment {
        pairs.iter().map(|(g, t)| (*g, t.id)).collect()
    }

    #[test]
    fn test_no_positive_mass_is_full_satisfaction() {
        let (g, ids) = guests(&["A", "A"]);
        let tables = vec![Table::new("T1", 2)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);
        let score = ctx.evaluate(&ctx.dense(&seat(&[(ids[0], &tables[0])])));
        assert!((score.satisfaction - 100.0).abs() < f64::EPSILON);
        assert!((score.conflict_resolution - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_satisfaction_relative_to_bound() {
        let (mut g, ids) = guests(&["A", "A", "A", "A"]);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Family, 0.9)
            .unwrap();
        g.add_or_update_relationship(ids[2], ids[3], RelationshipType::Family, 0.9)
            .unwrap();
        let tables = vec![Table::new("T1", 2), Table::new("T2", 2)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);

        let together = seat(&[
            (ids[0], &tables[0]),
            (ids[1], &tables[0]),
            (ids[2], &tables[1]),
            (ids[3], &tables[1]),
        ]);
        assert!((ctx.satisfaction(&ctx.dense(&together)) - 100.0).abs() < 1e-9);

        let split = seat(&[
            (ids[0], &tables[0]),
            (ids[2], &tables[0]),
            (ids[1], &tables[1]),
            (ids[3], &tables[1]),
        ]);
        assert!(ctx.satisfaction(&ctx.dense(&split)).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_ignores_weak_ties() {
        let (mut g, ids) = guests(&["A", "A", "A"]);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Family, 0.9)
            .unwrap();
        g.add_or_update_relationship(ids[0], ids[2], RelationshipType::Acquaintance, 0.2)
            .unwrap();
        let tables = vec![Table::new("T1", 2), Table::new("T2", 2)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.5);

        let pair = seat(&[(ids[0], &tables[0]), (ids[1], &tables[0]), (ids[2], &tables[1])]);
        assert!((ctx.satisfaction(&ctx.dense(&pair)) - 100.0).abs() < 1e-9);
        assert!(ctx.neighbors(0).iter().all(|(_, s)| *s >= 0.5));
    }

    #[test]
    fn test_conflict_resolution_counts_co_seated_pairs() {
        let (mut g, ids) = guests(&["A", "A", "A", "A"]);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Conflict, -0.9)
            .unwrap();
        g.add_or_update_relationship(ids[2], ids[3], RelationshipType::Conflict, -0.9)
            .unwrap();
        let tables = vec![Table::new("T1", 4), Table::new("T2", 4)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);

        let one_bad = seat(&[
            (ids[0], &tables[0]),
            (ids[1], &tables[0]),
            (ids[2], &tables[0]),
            (ids[3], &tables[1]),
        ]);
        assert!((ctx.conflict_resolution(&ctx.dense(&one_bad)) - 50.0).abs() < 1e-9);

        // Unseated partner counts as resolved
        let unseated = seat(&[(ids[0], &tables[0]), (ids[2], &tables[0])]);
        assert!((ctx.conflict_resolution(&ctx.dense(&unseated)) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_balance_mixed_beats_segregated() {
        let (g, ids) = guests(&["A", "A", "B", "B"]);
        let tables = vec![Table::new("T1", 2), Table::new("T2", 2)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);

        let mixed = seat(&[
            (ids[0], &tables[0]),
            (ids[2], &tables[0]),
            (ids[1], &tables[1]),
            (ids[3], &tables[1]),
        ]);
        assert!((ctx.balance(&ctx.dense(&mixed)) - 100.0).abs() < 1e-9);

        let segregated = seat(&[
            (ids[0], &tables[0]),
            (ids[1], &tables[0]),
            (ids[2], &tables[1]),
            (ids[3], &tables[1]),
        ]);
        assert!((ctx.balance(&ctx.dense(&segregated)) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_balance_penalizes_uneven_fill() {
        let (g, ids) = guests(&["A", "A", "A", "A"]);
        let tables = vec![Table::new("T1", 4), Table::new("T2", 4)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);

        let crammed: SeatAssignment = ids.iter().map(|g| (*g, tables[0].id)).collect();
        assert!((ctx.balance(&ctx.dense(&crammed)) - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_balance_ignores_special_tables() {
        let (g, ids) = guests(&["A", "B"]);
        let tables = vec![
            Table::new("VIP", 2).with_special(SpecialTable::Vip),
            Table::new("T1", 2),
        ];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);
        let assignment = seat(&[(ids[0], &tables[0]), (ids[1], &tables[1])]);
        assert!((ctx.balance(&ctx.dense(&assignment)) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dietary_dimension_is_case_insensitive() {
        let mut g = GuestGraph::new();
        let mut ids = Vec::new();
        for (i, diet) in ["Vegan", "vegan", "", ""].iter().enumerate() {
            let attrs = GuestAttributes {
                dietary_needs: if diet.is_empty() { vec![] } else { vec![diet.to_string()] },
                ..Default::default()
            };
            let guest = Guest::new(format!("G{}", i), "A").with_attributes(attrs);
            ids.push(guest.id);
            g.add_guest(guest).unwrap();
        }
        let tables = vec![Table::new("T1", 2), Table::new("T2", 2)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);

        let vegans_apart = seat(&[
            (ids[0], &tables[0]),
            (ids[2], &tables[0]),
            (ids[1], &tables[1]),
            (ids[3], &tables[1]),
        ]);
        let vegans_together = seat(&[
            (ids[0], &tables[0]),
            (ids[1], &tables[0]),
            (ids[2], &tables[1]),
            (ids[3], &tables[1]),
        ]);
        assert!(ctx.balance(&ctx.dense(&vegans_apart)) > ctx.balance(&ctx.dense(&vegans_together)));
    }

    #[test]
    fn test_evaluate_is_deterministic_and_bounded() {
        let (mut g, ids) = guests(&["A", "B", "A", "B", "C"]);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Friend, 0.6)
            .unwrap();
        g.add_or_update_relationship(ids[1], ids[2], RelationshipType::Conflict, -0.4)
            .unwrap();
        g.add_or_update_relationship(ids[3], ids[4], RelationshipType::Colleague, 0.4)
            .unwrap();
        let tables = vec![Table::new("T1", 3), Table::new("T2", 3)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);
        let assignment = seat(&[
            (ids[0], &tables[0]),
            (ids[1], &tables[0]),
            (ids[2], &tables[0]),
            (ids[3], &tables[1]),
            (ids[4], &tables[1]),
        ]);
        let dense = ctx.dense(&assignment);
        let first = ctx.evaluate(&dense);
        let second = ctx.evaluate(&dense);
        assert_eq!(first, second);
        for metric in [
            first.satisfaction,
            first.conflict_resolution,
            first.balance,
            first.overall,
        ] {
            assert!((0.0..=100.0).contains(&metric));
        }
        assert_eq!(ctx.sparse(&dense), assignment);
    }

    #[test]
    fn test_mass_upper_bound_uses_top_k() {
        let adj = vec![
            vec![(1, 0.9), (2, 0.5), (3, 0.1)],
            vec![(0, 0.9)],
            vec![(0, 0.5)],
            vec![(0, 0.1)],
        ];
        // k = 1: 0.9 + 0.9 + 0.5 + 0.1, halved
        assert!((mass_upper_bound(&adj, 1) - 1.2).abs() < 1e-9);
        assert!(mass_upper_bound(&adj, 0).abs() < f64::EPSILON);
    }
}
