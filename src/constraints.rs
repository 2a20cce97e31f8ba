//! Hard seating constraints.
//!
//! Pure checks over a proposed seating. Business-rule failures are returned as
//! [`Violation`] data, never as errors: an empty list means the constraint holds.
//!
//! - [`check_capacity`] - per-table count ≤ capacity, assignments reference known tables
//! - [`check_conflicts`] - no conflict pair shares a table
//! - [`check_duplicate_seats`] - each guest appears at most once in a table → guests view
//! - [`validate`] - all of the above plus table sanity

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::arrangement::models::{table_counts, SeatAssignment, Table, TableId, TableSeating};
use crate::graph::{GuestGraph, GuestId};

/// A single broken constraint, naming the tables and guests involved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    OverCapacity {
        table: TableId,
        table_name: String,
        capacity: u32,
        assigned: usize,
    },
    UnknownTable {
        guest: GuestId,
        table: TableId,
    },
    UnknownGuest {
        guest: GuestId,
    },
    ConflictSeated {
        table: TableId,
        table_name: String,
        a: GuestId,
        b: GuestId,
    },
    DuplicateSeat {
        guest: GuestId,
        tables: Vec<TableId>,
    },
    InvalidTable {
        table: TableId,
        reason: String,
    },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OverCapacity {
                table_name,
                capacity,
                assigned,
                ..
            } => write!(
                f,
                "table '{}' over capacity: {} assigned, capacity {}",
                table_name, assigned, capacity
            ),
            Self::UnknownTable { guest, table } => {
                write!(f, "guest {} assigned to unknown table {}", guest, table)
            }
            Self::UnknownGuest { guest } => write!(f, "unknown guest {}", guest),
            Self::ConflictSeated {
                table_name, a, b, ..
            } => write!(
                f,
                "conflicting guests {} and {} seated together at '{}'",
                a, b, table_name
            ),
            Self::DuplicateSeat { guest, tables } => {
                write!(f, "guest {} seated at {} tables", guest, tables.len())
            }
            Self::InvalidTable { table, reason } => write!(f, "invalid table {}: {}", table, reason),
        }
    }
}

/// Each table's count ≤ capacity; every assigned table exists.
pub fn check_capacity(tables: &[Table], assignment: &SeatAssignment) -> Vec<Violation> {
    let known: HashSet<TableId> = tables.iter().map(|t| t.id).collect();
    let mut violations: Vec<Violation> = assignment
        .iter()
        .filter(|(_, table)| !known.contains(table))
        .map(|(guest, table)| Violation::UnknownTable {
            guest: *guest,
            table: *table,
        })
        .collect();

    let counts = table_counts(assignment);
    for table in tables {
        let assigned = counts.get(&table.id).copied().unwrap_or(0);
        if assigned > table.capacity as usize {
            violations.push(Violation::OverCapacity {
                table: table.id,
                table_name: table.name.clone(),
                capacity: table.capacity,
                assigned,
            });
        }
    }
    violations
}

/// No two guests with a conflict relationship share a table.
pub fn check_conflicts(
    tables: &[Table],
    assignment: &SeatAssignment,
    graph: &GuestGraph,
) -> Vec<Violation> {
    let names: HashMap<TableId, &str> = tables.iter().map(|t| (t.id, t.name.as_str())).collect();
    let mut violations = Vec::new();

    for rel in graph.relationships().filter(|r| r.is_conflict()) {
        let (Some(ta), Some(tb)) = (assignment.get(&rel.a), assignment.get(&rel.b)) else {
            continue;
        };
        if ta == tb {
            let key = rel.key();
            violations.push(Violation::ConflictSeated {
                table: *ta,
                table_name: names.get(ta).map(|n| n.to_string()).unwrap_or_default(),
                a: key.0,
                b: key.1,
            });
        }
    }
    violations
}

/// Each guest appears in at most one table's list (and at most once in it).
pub fn check_duplicate_seats(seating: &[TableSeating]) -> Vec<Violation> {
    let mut seen: BTreeMap<GuestId, Vec<TableId>> = BTreeMap::new();
    for entry in seating {
        for guest in &entry.guests {
            seen.entry(*guest).or_default().push(entry.table);
        }
    }
    seen.into_iter()
        .filter(|(_, tables)| tables.len() > 1)
        .map(|(guest, tables)| Violation::DuplicateSeat { guest, tables })
        .collect()
}

/// Tables need a positive capacity and unique ids.
pub fn check_tables(tables: &[Table]) -> Vec<Violation> {
    let mut seen = HashSet::new();
    let mut names = HashSet::new();
    let mut violations = Vec::new();
    for table in tables {
        if table.capacity == 0 {
            violations.push(Violation::InvalidTable {
                table: table.id,
                reason: format!("table '{}' must seat at least one guest", table.name),
            });
        }
        if !seen.insert(table.id) {
            violations.push(Violation::InvalidTable {
                table: table.id,
                reason: "duplicate table id".into(),
            });
        }
        // Diffs and lookups match tables by name
        if !names.insert(table.name.trim()) {
            violations.push(Violation::InvalidTable {
                table: table.id,
                reason: format!("duplicate table name '{}'", table.name.trim()),
            });
        }
    }
    violations
}

/// Guests in the assignment must exist in the graph.
pub fn check_guests(assignment: &SeatAssignment, graph: &GuestGraph) -> Vec<Violation> {
    assignment
        .keys()
        .filter(|g| !graph.contains(**g))
        .map(|g| Violation::UnknownGuest { guest: *g })
        .collect()
}

/// Run every check over a map-form seating.
pub fn validate(tables: &[Table], assignment: &SeatAssignment, graph: &GuestGraph) -> Vec<Violation> {
    let mut violations = check_tables(tables);
    violations.extend(check_guests(assignment, graph));
    violations.extend(check_capacity(tables, assignment));
    violations.extend(check_conflicts(tables, assignment, graph));
    violations
}

/// Convert a table → guests view into an assignment, rejecting duplicate seats.
pub fn seating_to_assignment(seating: &[TableSeating]) -> Result<SeatAssignment, Vec<Violation>> {
    let duplicates = check_duplicate_seats(seating);
    if !duplicates.is_empty() {
        return Err(duplicates);
    }
    Ok(seating
        .iter()
        .flat_map(|entry| entry.guests.iter().map(move |g| (*g, entry.table)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Guest, RelationshipType};

    fn setup() -> (GuestGraph, Vec<GuestId>, Vec<Table>) {
        let mut g = GuestGraph::new();
        let mut ids = Vec::new();
        for name in ["Ada", "Grace", "Linus"] {
            let guest = Guest::new(name, "Friends");
            ids.push(guest.id);
            g.add_guest(guest).unwrap();
        }
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Conflict, -0.8)
            .unwrap();
        let tables = vec![Table::new("Table 1", 2), Table::new("Table 2", 2)];
        (g, ids, tables)
    }

    #[test]
    fn test_capacity_violation_names_table() {
        let (_, ids, tables) = setup();
        let assignment: SeatAssignment = ids.iter().map(|g| (*g, tables[0].id)).collect();
        let violations = check_capacity(&tables, &assignment);
        assert_eq!(
            violations,
            vec![Violation::OverCapacity {
                table: tables[0].id,
                table_name: "Table 1".into(),
                capacity: 2,
                assigned: 3,
            }]
        );
    }

    #[test]
    fn test_unknown_table_flagged() {
        let (_, ids, tables) = setup();
        let bogus = uuid::Uuid::new_v4();
        let assignment = SeatAssignment::from([(ids[0], bogus)]);
        let violations = check_capacity(&tables, &assignment);
        assert!(matches!(violations[0], Violation::UnknownTable { table, .. } if table == bogus));
    }

    #[test]
    fn test_conflict_pair_detected() {
        let (g, ids, tables) = setup();
        let together = SeatAssignment::from([(ids[0], tables[0].id), (ids[1], tables[0].id)]);
        let violations = check_conflicts(&tables, &together, &g);
        assert_eq!(violations.len(), 1);
        assert!(matches!(
            &violations[0],
            Violation::ConflictSeated { a, b, .. } if [*a, *b].contains(&ids[0]) && [*a, *b].contains(&ids[1])
        ));

        let apart = SeatAssignment::from([(ids[0], tables[0].id), (ids[1], tables[1].id)]);
        assert!(check_conflicts(&tables, &apart, &g).is_empty());

        // Unseated partner never counts
        let one_seated = SeatAssignment::from([(ids[0], tables[0].id)]);
        assert!(check_conflicts(&tables, &one_seated, &g).is_empty());
    }

    #[test]
    fn test_duplicate_seat_detected() {
        let (_, ids, tables) = setup();
        let seating = vec![
            TableSeating {
                table: tables[0].id,
                guests: vec![ids[0], ids[2]],
            },
            TableSeating {
                table: tables[1].id,
                guests: vec![ids[2]],
            },
        ];
        let violations = check_duplicate_seats(&seating);
        assert_eq!(
            violations,
            vec![Violation::DuplicateSeat {
                guest: ids[2],
                tables: vec![tables[0].id, tables[1].id],
            }]
        );
        assert!(seating_to_assignment(&seating).is_err());
    }

    #[test]
    fn test_seating_to_assignment() {
        let (_, ids, tables) = setup();
        let seating = vec![TableSeating {
            table: tables[1].id,
            guests: vec![ids[0], ids[1]],
        }];
        let assignment = seating_to_assignment(&seating).unwrap();
        assert_eq!(assignment.len(), 2);
        assert_eq!(assignment[&ids[0]], tables[1].id);
    }

    #[test]
    fn test_validate_clean_and_zero_capacity() {
        let (g, ids, mut tables) = setup();
        let assignment = SeatAssignment::from([(ids[0], tables[0].id), (ids[1], tables[1].id)]);
        assert!(validate(&tables, &assignment, &g).is_empty());

        tables.push(Table::new("Broken", 0));
        let violations = validate(&tables, &assignment, &g);
        assert!(matches!(violations[0], Violation::InvalidTable { .. }));
    }

    #[test]
    fn test_duplicate_table_names_rejected() {
        let tables = vec![Table::new("Table 1", 2), Table::new(" Table 1 ", 4)];
        let violations = check_tables(&tables);
        assert_eq!(
            violations,
            vec![Violation::InvalidTable {
                table: tables[1].id,
                reason: "duplicate table name 'Table 1'".into(),
            }]
        );

        let renamed = vec![Table::new("Table 1", 2), Table::new("Table 2", 4)];
        assert!(check_tables(&renamed).is_empty());
    }

    #[test]
    fn test_validate_unknown_guest() {
        let (g, _, tables) = setup();
        let stranger = uuid::Uuid::new_v4();
        let assignment = SeatAssignment::from([(stranger, tables[0].id)]);
        assert_eq!(
            validate(&tables, &assignment, &g),
            vec![Violation::UnknownGuest { guest: stranger }]
        );
    }
}
