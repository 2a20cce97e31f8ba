//! Persistence collaborator for events and arrangements.
//!
//! The service keeps the working copy of every event in memory and writes
//! each committed change through a [`SeatingStore`]. Two backends:
//!
//! - [`InMemorySeatingStore`] - `tokio::sync::RwLock<HashMap>` maps, for tests and ephemeral runs
//! - [`JsonFileSeatingStore`] - one directory per event under a data dir

mod json_file;
mod memory;

pub use json_file::JsonFileSeatingStore;
pub use memory::InMemorySeatingStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::arrangement::{Arrangement, ArrangementId, ArrangementStatus, EventId, Table};
use crate::graph::{Guest, Relationship};
use crate::scoring::ScoreSettings;

/// Persistent form of an event without its arrangements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Abstract interface for event persistence.
#[async_trait]
pub trait SeatingStore: Send + Sync {
    // ========================================================================
    // Events
    // ========================================================================

    /// Ids of every stored event
    async fn list_events(&self) -> Result<Vec<EventId>>;

    /// Load an event's guests, relationships and tables
    async fn load_event(&self, id: EventId) -> Result<Option<EventRecord>>;

    /// Create or replace an event record
    async fn save_event(&self, record: &EventRecord) -> Result<()>;

    /// Delete an event and all of its arrangements
    async fn delete_event(&self, id: EventId) -> Result<()>;

    // ========================================================================
    // Arrangements
    // ========================================================================

    /// Create or replace an arrangement
    async fn save_arrangement(&self, arrangement: &Arrangement) -> Result<()>;

    async fn delete_arrangement(&self, event_id: EventId, id: ArrangementId) -> Result<()>;

    /// Arrangements of an event ordered by creation time, optionally filtered by status
    async fn list_arrangements(
        &self,
        event_id: EventId,
        status: Option<ArrangementStatus>,
    ) -> Result<Vec<Arrangement>>;
}

fn sort_and_filter(
    mut arrangements: Vec<Arrangement>,
    status: Option<ArrangementStatus>,
) -> Vec<Arrangement> {
    arrangements.retain(|a| status.map_or(true, |s| a.status == s));
    arrangements.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    arrangements
}
