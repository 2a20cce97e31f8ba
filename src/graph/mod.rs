//! Guest relationship graph.
//!
//! ## Modules
//!
//! - [`models`] - Guests, relationships, and the petgraph-backed [`GuestGraph`]
//! - [`algorithms`] - Affinity clusters and relationship summaries

pub mod algorithms;
pub mod models;

pub use algorithms::{affinity_clusters, relationship_summary, RelationshipSummary, TypeStats};
pub use models::{
    GraphError, Guest, GuestAttributes, GuestGraph, GuestId, PairKey, Relationship,
    RelationshipType,
};
