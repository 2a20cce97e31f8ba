//! Test helper factories
//!
//! Convenience builders for guests, graphs, tables and a service backed by
//! the in-memory store.
#![allow(dead_code)]

use std::sync::Arc;

use crate::arrangement::{EventId, Table};
use crate::events::EventBus;
use crate::graph::{Guest, GuestGraph, GuestId, RelationshipType};
use crate::optimizer::OptimizerConfig;
use crate::service::{CreateEventRequest, NewGuest, RelationshipInput, SeatingService};
use crate::store::InMemorySeatingStore;

// ============================================================================
// Graph factories
// ============================================================================

/// Graph with one guest per `(name, group)`; returns ids in the same order.
pub fn graph_of(guests: &[(&str, &str)]) -> (GuestGraph, Vec<GuestId>) {
    let mut graph = GuestGraph::new();
    let mut ids = Vec::with_capacity(guests.len());
    for (name, group) in guests {
        let guest = Guest::new(*name, *group);
        ids.push(guest.id);
        graph.add_guest(guest).unwrap();
    }
    (graph, ids)
}

/// `n` guests named `Guest 0..n`, alternating between groups A and B.
pub fn numbered_graph(n: usize) -> (GuestGraph, Vec<GuestId>) {
    let names: Vec<(String, &str)> = (0..n)
        .map(|i| (format!("Guest {}", i), if i % 2 == 0 { "A" } else { "B" }))
        .collect();
    let refs: Vec<(&str, &str)> = names.iter().map(|(n, g)| (n.as_str(), *g)).collect();
    graph_of(&refs)
}

pub fn link(graph: &mut GuestGraph, a: GuestId, b: GuestId, kind: RelationshipType, strength: f64) {
    graph.add_or_update_relationship(a, b, kind, strength).unwrap();
}

/// `count` plain tables named `Table 1..`, each seating `capacity`.
pub fn tables(count: usize, capacity: u32) -> Vec<Table> {
    (1..=count)
        .map(|i| Table::new(format!("Table {}", i), capacity))
        .collect()
}

// ============================================================================
// Service builders
// ============================================================================

/// Small, seeded optimizer budget that finishes quickly.
pub fn quick_optimizer_config() -> OptimizerConfig {
    OptimizerConfig {
        table_count: 2,
        table_capacity: 4,
        max_iterations: 400,
        time_budget_ms: 5_000,
        candidates: 2,
        seed: Some(42),
        ..Default::default()
    }
}

pub fn mock_service() -> Arc<SeatingService> {
    Arc::new(SeatingService::new(
        Arc::new(InMemorySeatingStore::new()),
        Arc::new(EventBus::default()),
        quick_optimizer_config(),
    ))
}

/// Create an event with the given guests and tables.
pub async fn seed_event(
    service: &SeatingService,
    guests: &[(&str, &str)],
    tables: Vec<Table>,
) -> (EventId, Vec<GuestId>) {
    let event = service
        .create_event(CreateEventRequest {
            name: "Test event".into(),
            tables,
            settings: None,
        })
        .await
        .unwrap();
    let mut ids = Vec::with_capacity(guests.len());
    for (name, group) in guests {
        let guest = service
            .add_guest(
                event.id,
                NewGuest {
                    name: name.to_string(),
                    group: group.to_string(),
                    attributes: Default::default(),
                },
            )
            .await
            .unwrap();
        ids.push(guest.id);
    }
    (event.id, ids)
}

pub fn relationship(a: GuestId, b: GuestId, kind: RelationshipType, strength: Option<f64>) -> RelationshipInput {
    RelationshipInput {
        a,
        b,
        kind,
        strength,
        notes: None,
    }
}
