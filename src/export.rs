//! Export/import document.
//!
//! A single JSON document carries an event's guests, relationships, tables
//! and arrangements. Field names are stable; `version` guards format changes.
//! Import rebuilds the graph through the normal validation paths, so a
//! hand-edited document cannot smuggle in an invalid relationship or an
//! over-capacity arrangement.

use serde::{Deserialize, Serialize};

use crate::arrangement::{Arrangement, ArrangementStore, EventId, StoreError, Table};
use crate::constraints;
use crate::graph::{GraphError, Guest, GuestGraph, Relationship};
use crate::scoring::ScoreSettings;

pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDocument {
    pub version: u32,
    pub id: EventId,
    pub name: String,
    #[serde(default)]
    pub settings: ScoreSettings,
    #[serde(default)]
    pub guests: Vec<Guest>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub arrangements: Vec<Arrangement>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("unsupported document version {0} (expected {DOCUMENT_VERSION})")]
    UnsupportedVersion(u32),
    #[error("invalid document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid graph: {0}")]
    Graph(#[from] GraphError),
    #[error("invalid tables: {0}")]
    Tables(String),
    #[error("invalid arrangement '{name}': {source}")]
    Arrangement {
        name: String,
        #[source]
        source: StoreError,
    },
}

/// Validated contents of a document.
#[derive(Debug)]
pub struct ImportedEvent {
    pub id: EventId,
    pub name: String,
    pub graph: GuestGraph,
    pub tables: Vec<Table>,
    pub arrangements: ArrangementStore,
}

impl EventDocument {
    pub fn from_parts(
        id: EventId,
        name: &str,
        graph: &GuestGraph,
        tables: &[Table],
        arrangements: &ArrangementStore,
    ) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            id,
            name: name.to_string(),
            settings: *arrangements.settings(),
            guests: graph.guests().cloned().collect(),
            relationships: graph.relationships().cloned().collect(),
            tables: tables.to_vec(),
            arrangements: arrangements.iter().cloned().collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ImportError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Rebuild the event. Cached scores are recomputed, never trusted.
    ///
    /// Arrangements keep their document ids; they are re-bound to `self.id`.
    pub fn into_event(self) -> Result<ImportedEvent, ImportError> {
        if self.version != DOCUMENT_VERSION {
            return Err(ImportError::UnsupportedVersion(self.version));
        }
        let graph = build_graph(self.guests, self.relationships)?;

        if let Some(v) = constraints::check_tables(&self.tables).into_iter().next() {
            return Err(ImportError::Tables(v.to_string()));
        }

        let mut store = ArrangementStore::new(self.settings);
        for mut arrangement in self.arrangements {
            arrangement.event_id = self.id;
            let name = arrangement.name.clone();
            store
                .insert(arrangement, &graph)
                .map_err(|source| ImportError::Arrangement { name, source })?;
        }

        Ok(ImportedEvent {
            id: self.id,
            name: self.name,
            graph,
            tables: self.tables,
            arrangements: store,
        })
    }
}

/// Build a graph from stored guests and relationships, validating each.
pub fn build_graph(
    guests: Vec<Guest>,
    relationships: Vec<Relationship>,
) -> Result<GuestGraph, GraphError> {
    let mut graph = GuestGraph::new();
    for guest in guests {
        graph.add_guest(guest)?;
    }
    for relationship in relationships {
        graph.upsert_relationship(relationship)?;
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::{ArrangementStatus, SeatAssignment};
    use crate::graph::RelationshipType;
    use uuid::Uuid;

    fn sample() -> EventDocument {
        let a = Guest::new("Ada", "Family");
        let b = Guest::new("Grace", "Family");
        let c = Guest::new("Linus", "Work");
        let rel = Relationship::new(a.id, b.id, RelationshipType::Family, 0.9).unwrap();
        let feud = Relationship::new(b.id, c.id, RelationshipType::Conflict, -0.7).unwrap();
        let tables = vec![Table::new("Table 1", 2), Table::new("Table 2", 2)];

        let mut graph = GuestGraph::new();
        for g in [&a, &b, &c] {
            graph.add_guest(g.clone()).unwrap();
        }
        graph.upsert_relationship(rel).unwrap();
        graph.upsert_relationship(feud).unwrap();

        let id = Uuid::new_v4();
        let mut store = ArrangementStore::new(ScoreSettings::default());
        let mut arrangement = Arrangement::new(id, "Plan A", tables.clone()).with_assignment(
            SeatAssignment::from([(a.id, tables[0].id), (b.id, tables[0].id), (c.id, tables[1].id)]),
        );
        arrangement.status = ArrangementStatus::Current;
        store.insert(arrangement, &graph).unwrap();

        EventDocument::from_parts(id, "Reunion", &graph, &tables, &store)
    }

    #[test]
    fn test_document_uses_stable_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        for key in ["version", "guests", "relationships", "tables", "arrangements"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        let arrangement = &value["arrangements"][0];
        assert!(arrangement.get("assignment").is_some());
        assert!(arrangement["score"].get("overall").is_some());
        assert_eq!(value["relationships"][0]["type"], "family");
    }

    #[test]
    fn test_import_rebuilds_and_rescores() {
        let doc = sample();
        let expected = doc.arrangements[0].score;
        let mut tampered = doc.clone();
        tampered.arrangements[0].score.overall = 1.0;

        let imported = EventDocument::from_json(&tampered.to_json().unwrap())
            .unwrap()
            .into_event()
            .unwrap();
        assert_eq!(imported.graph.guest_count(), 3);
        assert_eq!(imported.graph.relationship_count(), 2);
        let arrangement = imported.arrangements.current().unwrap();
        assert_eq!(arrangement.score, expected);
    }

    #[test]
    fn test_import_rejects_inconsistent_relationship() {
        let mut doc = sample();
        doc.relationships[0].strength = -0.4;
        assert!(matches!(
            doc.into_event(),
            Err(ImportError::Graph(GraphError::InvalidRelationship { .. }))
        ));
    }

    #[test]
    fn test_import_rejects_over_capacity_arrangement() {
        let mut doc = sample();
        let t0 = doc.arrangements[0].tables[0].id;
        for guest in &doc.guests {
            doc.arrangements[0].assignment.insert(guest.id, t0);
        }
        assert!(matches!(
            doc.into_event(),
            Err(ImportError::Arrangement { .. })
        ));
    }

    #[test]
    fn test_import_rejects_unknown_version() {
        let mut doc = sample();
        doc.version = 7;
        assert!(matches!(doc.into_event(), Err(ImportError::UnsupportedVersion(7))));
    }
}
