//! Arrangement data models: tables, seat assignments and named arrangements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::graph::{GuestId, PairKey};
use crate::scoring::Score;

pub type TableId = Uuid;
pub type ArrangementId = Uuid;
pub type EventId = Uuid;

/// Guest → table map. A guest maps to at most one table by construction.
pub type SeatAssignment = BTreeMap<GuestId, TableId>;

// ============================================================================
// Tables
// ============================================================================

/// Tables excluded from balance scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialTable {
    Vip,
    Kids,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Generated when a client omits it
    #[serde(default = "Uuid::new_v4")]
    pub id: TableId,
    pub name: String,
    pub capacity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<SpecialTable>,
}

impl Table {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            capacity,
            special: None,
        }
    }

    pub fn with_special(mut self, special: SpecialTable) -> Self {
        self.special = Some(special);
        self
    }

    pub fn is_special(&self) -> bool {
        self.special.is_some()
    }
}

/// One table's guest list, the table → guests view of a seating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSeating {
    pub table: TableId,
    #[serde(default)]
    pub guests: Vec<GuestId>,
}

// ============================================================================
// Arrangements
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrangementStatus {
    Draft,
    Saved,
    Current,
}

impl std::fmt::Display for ArrangementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Saved => write!(f, "saved"),
            Self::Current => write!(f, "current"),
        }
    }
}

impl std::str::FromStr for ArrangementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "saved" => Ok(Self::Saved),
            "current" => Ok(Self::Current),
            other => Err(format!("unknown arrangement status: {}", other)),
        }
    }
}

/// Who produced an arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrangementOrigin {
    Optimizer,
    Manual,
}

/// A named, scored seat assignment over a set of tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    pub id: ArrangementId,
    pub event_id: EventId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tables: Vec<Table>,
    pub assignment: SeatAssignment,
    pub status: ArrangementStatus,
    pub score: Score,
    /// Conflict pairs an optimizer candidate could not separate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_conflicts: Vec<PairKey>,
    pub origin: ArrangementOrigin,
}

impl Arrangement {
    /// Empty draft. The score starts as the score of an empty seating and is
    /// refreshed by the store on insert.
    pub fn new(event_id: EventId, name: impl Into<String>, tables: Vec<Table>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id,
            name: name.into(),
            created_at: now,
            updated_at: now,
            tables,
            assignment: SeatAssignment::new(),
            status: ArrangementStatus::Draft,
            score: Score::default(),
            unresolved_conflicts: Vec::new(),
            origin: ArrangementOrigin::Manual,
        }
    }

    pub fn with_assignment(mut self, assignment: SeatAssignment) -> Self {
        self.assignment = assignment;
        self
    }

    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    /// Guests at a table, in guest-id order.
    pub fn guests_at(&self, table: TableId) -> Vec<GuestId> {
        self.assignment
            .iter()
            .filter(|(_, t)| **t == table)
            .map(|(g, _)| *g)
            .collect()
    }

    pub fn table_counts(&self) -> HashMap<TableId, usize> {
        table_counts(&self.assignment)
    }

    /// Table → guests view, in table order. Tables without guests are included.
    pub fn seating(&self) -> Vec<TableSeating> {
        let mut by_table: HashMap<TableId, Vec<GuestId>> = HashMap::new();
        for (guest, table) in &self.assignment {
            by_table.entry(*table).or_default().push(*guest);
        }
        self.tables
            .iter()
            .map(|t| TableSeating {
                table: t.id,
                guests: by_table.remove(&t.id).unwrap_or_default(),
            })
            .collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

pub fn table_counts(assignment: &SeatAssignment) -> HashMap<TableId, usize> {
    let mut counts = HashMap::new();
    for table in assignment.values() {
        *counts.entry(*table).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seating_view_lists_every_table() {
        let t1 = Table::new("Table 1", 4);
        let t2 = Table::new("Table 2", 4);
        let (g1, g2) = (Uuid::new_v4(), Uuid::new_v4());
        let arr = Arrangement::new(Uuid::new_v4(), "Draft", vec![t1.clone(), t2.clone()])
            .with_assignment(SeatAssignment::from([(g1, t1.id), (g2, t1.id)]));

        let seating = arr.seating();
        assert_eq!(seating.len(), 2);
        assert_eq!(seating[0].table, t1.id);
        assert_eq!(seating[0].guests.len(), 2);
        assert!(seating[1].guests.is_empty());
        assert_eq!(arr.table_counts()[&t1.id], 2);
    }

    #[test]
    fn test_status_parse_and_display() {
        for status in [
            ArrangementStatus::Draft,
            ArrangementStatus::Saved,
            ArrangementStatus::Current,
        ] {
            assert_eq!(status.to_string().parse::<ArrangementStatus>(), Ok(status));
        }
        assert!("archived".parse::<ArrangementStatus>().is_err());
    }
}
