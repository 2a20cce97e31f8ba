//! Working copy of one event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::arrangement::{Arrangement, ArrangementStore, EventId, Table};
use crate::export::build_graph;
use crate::graph::{GraphError, GuestGraph};
use crate::scoring::ScoreSettings;
use crate::store::EventRecord;

/// Everything the event owns. Guarded by one lock per event in the service.
#[derive(Debug, Clone)]
pub struct EventState {
    pub id: EventId,
    pub name: String,
    pub graph: GuestGraph,
    /// Default tables for new arrangements and optimization runs
    pub tables: Vec<Table>,
    pub arrangements: ArrangementStore,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    pub id: EventId,
    pub name: String,
    pub guest_count: usize,
    pub relationship_count: usize,
    pub table_count: usize,
    pub arrangement_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_arrangement: Option<Uuid>,
    pub settings: ScoreSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventState {
    pub fn new(name: impl Into<String>, tables: Vec<Table>, settings: ScoreSettings) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            graph: GuestGraph::new(),
            tables,
            arrangements: ArrangementStore::new(settings),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild from persisted parts. Arrangements that no longer validate
    /// against the graph are skipped with a warning.
    pub fn from_parts(record: EventRecord, arrangements: Vec<Arrangement>) -> Result<Self, GraphError> {
        let graph = build_graph(record.guests, record.relationships)?;
        let mut store = ArrangementStore::new(record.settings);
        for arrangement in arrangements {
            let id = arrangement.id;
            if let Err(e) = store.insert(arrangement, &graph) {
                warn!(event_id = %record.id, arrangement_id = %id, error = %e, "Skipping invalid stored arrangement");
            }
        }
        Ok(Self {
            id: record.id,
            name: record.name,
            graph,
            tables: record.tables,
            arrangements: store,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    pub fn to_record(&self) -> EventRecord {
        EventRecord {
            id: self.id,
            name: self.name.clone(),
            settings: *self.arrangements.settings(),
            guests: self.graph.guests().cloned().collect(),
            relationships: self.graph.relationships().cloned().collect(),
            tables: self.tables.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id,
            name: self.name.clone(),
            guest_count: self.graph.guest_count(),
            relationship_count: self.graph.relationship_count(),
            table_count: self.tables.len(),
            arrangement_count: self.arrangements.len(),
            current_arrangement: self.arrangements.current().map(|a| a.id),
            settings: *self.arrangements.settings(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::{ArrangementStatus, SeatAssignment};
    use crate::graph::Guest;

    #[test]
    fn test_record_round_trip_keeps_graph() {
        let mut state = EventState::new("Gala", vec![Table::new("Table 1", 4)], ScoreSettings::default());
        let a = Guest::new("Ada", "Family");
        let b = Guest::new("Grace", "Family");
        state.graph.add_guest(a.clone()).unwrap();
        state.graph.add_guest(b.clone()).unwrap();
        state
            .graph
            .add_or_update_relationship(a.id, b.id, crate::graph::RelationshipType::Friend, 0.6)
            .unwrap();

        let rebuilt = EventState::from_parts(state.to_record(), Vec::new()).unwrap();
        assert_eq!(rebuilt.id, state.id);
        assert_eq!(rebuilt.graph.guest_count(), 2);
        assert!(rebuilt.graph.relationship(b.id, a.id).is_some());
        assert_eq!(rebuilt.tables, state.tables);
    }

    #[test]
    fn test_invalid_stored_arrangement_is_skipped() {
        let mut state = EventState::new("Gala", vec![], ScoreSettings::default());
        let a = Guest::new("Ada", "Family");
        state.graph.add_guest(a.clone()).unwrap();
        let table = Table::new("Table 1", 1);

        let good = Arrangement::new(state.id, "Good", vec![table.clone()])
            .with_assignment(SeatAssignment::from([(a.id, table.id)]));
        // References a guest the graph does not know
        let stale = Arrangement::new(state.id, "Stale", vec![table.clone()])
            .with_assignment(SeatAssignment::from([(Uuid::new_v4(), table.id)]));
        let mut current = Arrangement::new(state.id, "Current", vec![table]);
        current.status = ArrangementStatus::Current;

        let rebuilt = EventState::from_parts(state.to_record(), vec![good, stale, current]).unwrap();
        assert_eq!(rebuilt.arrangements.len(), 2);
        assert_eq!(rebuilt.summary().current_arrangement, rebuilt.arrangements.current().map(|a| a.id));
    }
}
