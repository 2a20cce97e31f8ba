//! Arrangement comparison: per-table diffs, guest lookup, side-by-side metrics.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::models::{Arrangement, ArrangementId, ArrangementStatus, TableId};
use crate::graph::{GuestGraph, GuestId};
use crate::scoring::Score;

// ============================================================================
// Diff
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDiff {
    pub table_name: String,
    pub only_in_a: Vec<GuestId>,
    pub only_in_b: Vec<GuestId>,
}

impl TableDiff {
    pub fn is_unchanged(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrangementDiff {
    pub a: ArrangementId,
    pub b: ArrangementId,
    /// One entry per table name present in either arrangement, by name
    pub tables: Vec<TableDiff>,
}

fn guests_by_table_name(arrangement: &Arrangement) -> BTreeMap<String, BTreeSet<GuestId>> {
    let names: BTreeMap<TableId, &str> = arrangement
        .tables
        .iter()
        .map(|t| (t.id, t.name.as_str()))
        .collect();
    let mut by_name: BTreeMap<String, BTreeSet<GuestId>> = arrangement
        .tables
        .iter()
        .map(|t| (t.name.clone(), BTreeSet::new()))
        .collect();
    for (guest, table) in &arrangement.assignment {
        if let Some(name) = names.get(table) {
            by_name.entry(name.to_string()).or_default().insert(*guest);
        }
    }
    by_name
}

/// Tables are matched by display name, so arrangements over different table
/// ids (e.g. two optimizer runs) still line up.
pub fn diff(a: &Arrangement, b: &Arrangement) -> ArrangementDiff {
    let left = guests_by_table_name(a);
    let right = guests_by_table_name(b);
    let empty = BTreeSet::new();

    let names: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
    let tables = names
        .into_iter()
        .map(|name| {
            let in_a = left.get(name).unwrap_or(&empty);
            let in_b = right.get(name).unwrap_or(&empty);
            TableDiff {
                table_name: name.clone(),
                only_in_a: in_a.difference(in_b).copied().collect(),
                only_in_b: in_b.difference(in_a).copied().collect(),
            }
        })
        .collect();

    ArrangementDiff {
        a: a.id,
        b: b.id,
        tables,
    }
}

// ============================================================================
// Guest lookup
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuestMatch {
    pub guest_id: GuestId,
    pub guest_name: String,
    pub arrangement_id: ArrangementId,
    pub arrangement_name: String,
    pub status: ArrangementStatus,
    /// `None` when the guest is unseated in this arrangement
    pub table_id: Option<TableId>,
    pub table_name: Option<String>,
}

/// Case-insensitive substring search over guest names across arrangements.
/// An empty pattern matches nothing.
pub fn find_guest<'a, I>(pattern: &str, graph: &GuestGraph, arrangements: I) -> Vec<GuestMatch>
where
    I: IntoIterator<Item = &'a Arrangement>,
{
    let needle = pattern.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let guests: Vec<(GuestId, &str)> = graph
        .guests()
        .filter(|g| g.name.to_lowercase().contains(&needle))
        .map(|g| (g.id, g.name.as_str()))
        .collect();

    let mut matches = Vec::new();
    for arrangement in arrangements {
        for (guest_id, guest_name) in &guests {
            let table = arrangement
                .assignment
                .get(guest_id)
                .and_then(|t| arrangement.table(*t));
            matches.push(GuestMatch {
                guest_id: *guest_id,
                guest_name: guest_name.to_string(),
                arrangement_id: arrangement.id,
                arrangement_name: arrangement.name.clone(),
                status: arrangement.status,
                table_id: table.map(|t| t.id),
                table_name: table.map(|t| t.name.clone()),
            });
        }
    }
    matches
}

// ============================================================================
// Side-by-side comparison
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub arrangement_id: ArrangementId,
    pub name: String,
    pub status: ArrangementStatus,
    pub score: Score,
    pub seated: usize,
    pub tables_used: usize,
    pub unresolved_conflicts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub rows: Vec<ComparisonRow>,
    pub best_overall: Option<ArrangementId>,
    pub best_satisfaction: Option<ArrangementId>,
    pub best_conflict_resolution: Option<ArrangementId>,
    pub best_balance: Option<ArrangementId>,
}

pub fn compare<'a, I>(arrangements: I) -> Comparison
where
    I: IntoIterator<Item = &'a Arrangement>,
{
    let rows: Vec<ComparisonRow> = arrangements
        .into_iter()
        .map(|a| ComparisonRow {
            arrangement_id: a.id,
            name: a.name.clone(),
            status: a.status,
            score: a.score,
            seated: a.assignment.len(),
            tables_used: a.table_counts().len(),
            unresolved_conflicts: a.unresolved_conflicts.len(),
        })
        .collect();

    // First row wins ties
    let best_by = |metric: fn(&Score) -> f64| {
        rows.iter()
            .fold(None::<&ComparisonRow>, |best, row| match best {
                Some(b) if metric(&b.score) >= metric(&row.score) => Some(b),
                _ => Some(row),
            })
            .map(|r| r.arrangement_id)
    };

    Comparison {
        best_overall: best_by(|s| s.overall),
        best_satisfaction: best_by(|s| s.satisfaction),
        best_conflict_resolution: best_by(|s| s.conflict_resolution),
        best_balance: best_by(|s| s.balance),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::models::{SeatAssignment, Table};
    use crate::graph::Guest;
    use uuid::Uuid;

    #[test]
    fn test_diff_matches_tables_by_name() {
        let event = Uuid::new_v4();
        let (g1, g2, g3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let a_tables = vec![Table::new("Table 1", 4), Table::new("Table 2", 4)];
        let b_tables = vec![Table::new("Table 1", 4), Table::new("Table 3", 4)];
        let a = Arrangement::new(event, "A", a_tables.clone()).with_assignment(SeatAssignment::from([
            (g1, a_tables[0].id),
            (g2, a_tables[0].id),
            (g3, a_tables[1].id),
        ]));
        let b = Arrangement::new(event, "B", b_tables.clone()).with_assignment(SeatAssignment::from([
            (g1, b_tables[0].id),
            (g3, b_tables[0].id),
            (g2, b_tables[1].id),
        ]));

        let d = diff(&a, &b);
        let names: Vec<&str> = d.tables.iter().map(|t| t.table_name.as_str()).collect();
        assert_eq!(names, vec!["Table 1", "Table 2", "Table 3"]);

        let t1 = &d.tables[0];
        assert_eq!(t1.only_in_a, vec![g2]);
        assert_eq!(t1.only_in_b, vec![g3]);
        assert_eq!(d.tables[1].only_in_a, vec![g3]);
        assert!(d.tables[1].only_in_b.is_empty());
        assert_eq!(d.tables[2].only_in_b, vec![g2]);
    }

    #[test]
    fn test_diff_identical_is_unchanged() {
        let tables = vec![Table::new("Table 1", 2)];
        let g = Uuid::new_v4();
        let a = Arrangement::new(Uuid::new_v4(), "A", tables.clone())
            .with_assignment(SeatAssignment::from([(g, tables[0].id)]));
        assert!(diff(&a, &a).tables.iter().all(TableDiff::is_unchanged));
    }

    #[test]
    fn test_find_guest_case_insensitive_with_context() {
        let mut graph = GuestGraph::new();
        let ada = Guest::new("Ada Lovelace", "Family");
        let grace = Guest::new("Grace Hopper", "Family");
        let (ada_id, grace_id) = (ada.id, grace.id);
        graph.add_guest(ada).unwrap();
        graph.add_guest(grace).unwrap();

        let tables = vec![Table::new("Head Table", 4)];
        let seated = Arrangement::new(Uuid::new_v4(), "Seated", tables.clone())
            .with_assignment(SeatAssignment::from([(ada_id, tables[0].id)]));
        let empty = Arrangement::new(Uuid::new_v4(), "Empty", tables);

        let found = find_guest("LOVE", &graph, [&seated, &empty]);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].guest_id, ada_id);
        assert_eq!(found[0].table_name.as_deref(), Some("Head Table"));
        assert_eq!(found[1].arrangement_name, "Empty");
        assert!(found[1].table_id.is_none());

        assert!(find_guest("", &graph, [&seated]).is_empty());
        assert_eq!(find_guest("hop", &graph, [&seated])[0].guest_id, grace_id);
    }

    #[test]
    fn test_compare_picks_best_per_metric() {
        let tables = vec![Table::new("T", 2)];
        let mut a = Arrangement::new(Uuid::new_v4(), "A", tables.clone());
        let mut b = Arrangement::new(Uuid::new_v4(), "B", tables);
        a.score = Score {
            satisfaction: 80.0,
            conflict_resolution: 100.0,
            balance: 40.0,
            overall: 78.0,
        };
        b.score = Score {
            satisfaction: 60.0,
            conflict_resolution: 100.0,
            balance: 90.0,
            overall: 81.5,
        };
        let cmp = compare([&a, &b]);
        assert_eq!(cmp.rows.len(), 2);
        assert_eq!(cmp.best_overall, Some(b.id));
        assert_eq!(cmp.best_satisfaction, Some(a.id));
        assert_eq!(cmp.best_conflict_resolution, Some(a.id));
        assert_eq!(cmp.best_balance, Some(b.id));
    }
}
