//! Seating service.
//!
//! Owns the working copy of every event and wires the graph, the arrangement
//! store, optimization jobs, persistence and the event bus together.
//!
//! Each event lives behind its own `tokio::sync::RwLock`: reads (scoring,
//! comparison, lookups) run concurrently, while writes (relationship edits,
//! seat mutations, promotion) are serialized per event. A write holds the
//! lock until it has been persisted, so a read-validate-write sequence can
//! never interleave with another writer of the same event.
//!
//! Writes are staged on a copy of the event and installed only after every
//! touched record has been stored. A failed write restores the previously
//! stored records and leaves the working copy as it was.
//!
//! ## Modules
//!
//! - [`state`] - [`EventState`], the per-event working copy
//! - [`requests`] - request/response types
//! - `optimize` - background optimization jobs

mod optimize;
pub mod requests;
pub mod state;

pub use requests::{
    CreateArrangementRequest, CreateEventRequest, Neighbor, NewGuest, OptimizeRequest,
    RelationshipInput, ScoreReport, ScoreRequest,
};
pub use state::{EventState, EventSummary};

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::arrangement::{
    Arrangement, ArrangementDiff, ArrangementId, ArrangementStatus, ArrangementStore, Comparison,
    EventId, GuestMatch, StoreError, Table, TableId, TableSeating,
};
use crate::constraints;
use crate::events::{EntityType, EventBus, EventEmitter, SeatingAction, SeatingEvent};
use crate::export::{EventDocument, ImportError};
use crate::graph::{
    relationship_summary, GraphError, Guest, GuestAttributes, GuestGraph, GuestId, Relationship,
    RelationshipSummary,
};
use crate::jobs::{JobError, JobManager};
use crate::optimizer::{OptimizeError, OptimizerConfig};
use crate::scoring::{score_assignment, ScoreSettings};
use crate::store::SeatingStore;
use crate::suggest::{resolve_target, RelationshipSuggester, SuggestedRelationship, SuggestionOutcome};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("event {0} not found")]
    EventNotFound(EventId),
    #[error("event {0} already exists")]
    EventExists(EventId),
    #[error("no relationship between {0} and {1}")]
    RelationshipNotFound(GuestId, GuestId),
    #[error("{0}")]
    Invalid(String),
    #[error("relationship suggestions are not configured")]
    SuggestionsUnavailable,
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Optimize(#[from] OptimizeError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

fn payload<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn validate_settings(settings: &ScoreSettings) -> ServiceResult<()> {
    settings.weights.validate().map_err(ServiceError::Invalid)?;
    let t = settings.strength_threshold;
    if !t.is_finite() || !(0.0..=1.0).contains(&t) {
        return Err(ServiceError::Invalid(
            "strength threshold must be within [0.0, 1.0]".into(),
        ));
    }
    Ok(())
}

fn validate_tables(tables: &[Table]) -> ServiceResult<()> {
    match constraints::check_tables(tables).into_iter().next() {
        Some(violation) => Err(ServiceError::Invalid(violation.to_string())),
        None => Ok(()),
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct SeatingService {
    events: RwLock<HashMap<EventId, Arc<RwLock<EventState>>>>,
    jobs: Arc<JobManager>,
    store: Arc<dyn SeatingStore>,
    bus: Arc<EventBus>,
    suggester: Option<Arc<dyn RelationshipSuggester>>,
    defaults: OptimizerConfig,
}

impl SeatingService {
    pub fn new(store: Arc<dyn SeatingStore>, bus: Arc<EventBus>, defaults: OptimizerConfig) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            jobs: Arc::new(JobManager::new()),
            store,
            bus,
            suggester: None,
            defaults,
        }
    }

    pub fn with_suggester(mut self, suggester: Arc<dyn RelationshipSuggester>) -> Self {
        self.suggester = Some(suggester);
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    pub fn defaults(&self) -> &OptimizerConfig {
        &self.defaults
    }

    pub fn has_suggester(&self) -> bool {
        self.suggester.is_some()
    }

    /// Load every stored event into memory. Returns the number loaded.
    pub async fn load_all(&self) -> anyhow::Result<usize> {
        let ids = self.store.list_events().await?;
        let mut loaded = HashMap::new();
        for id in ids {
            let Some(record) = self.store.load_event(id).await? else {
                continue;
            };
            let arrangements = self.store.list_arrangements(id, None).await?;
            match EventState::from_parts(record, arrangements) {
                Ok(state) => {
                    loaded.insert(id, Arc::new(RwLock::new(state)));
                }
                Err(e) => warn!(event_id = %id, error = %e, "Skipping event with invalid graph"),
            }
        }
        let count = loaded.len();
        self.events.write().await.extend(loaded);
        info!(events = count, "Loaded stored events");
        Ok(count)
    }

    async fn state(&self, id: EventId) -> ServiceResult<Arc<RwLock<EventState>>> {
        self.events
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ServiceError::EventNotFound(id))
    }

    /// The event is still registered under `state`. Checked under the event
    /// lock so a write racing `delete_event` cannot recreate its records.
    async fn ensure_live(&self, id: EventId, state: &Arc<RwLock<EventState>>) -> ServiceResult<()> {
        match self.events.read().await.get(&id) {
            Some(live) if Arc::ptr_eq(live, state) => Ok(()),
            _ => Err(ServiceError::EventNotFound(id)),
        }
    }

    /// Persist the event record and every arrangement.
    async fn persist_all(&self, state: &EventState) -> ServiceResult<()> {
        self.persist(state, &Touched::everything(state)).await
    }

    async fn persist(&self, state: &EventState, touched: &Touched) -> ServiceResult<()> {
        if touched.event {
            self.store.save_event(&state.to_record()).await?;
        }
        for id in &touched.arrangements {
            if let Some(arrangement) = state.arrangements.get(*id) {
                self.store.save_arrangement(arrangement).await?;
            }
        }
        Ok(())
    }

    /// Put back the stored form of every record `touched` names.
    async fn restore(&self, original: &EventState, touched: &Touched) {
        if touched.event {
            if let Err(e) = self.store.save_event(&original.to_record()).await {
                warn!(event_id = %original.id, error = %e, "Failed to restore event record");
            }
        }
        for id in &touched.arrangements {
            let restored = match original.arrangements.get(*id) {
                Some(arrangement) => self.store.save_arrangement(arrangement).await,
                None => self.store.delete_arrangement(original.id, *id).await,
            };
            if let Err(e) = restored {
                warn!(event_id = %original.id, arrangement_id = %id, error = %e, "Failed to restore arrangement");
            }
        }
    }

    /// Run `mutate` on a copy of the event, persist what it touched, then
    /// install the copy. Errors from `mutate` or the store leave `guard` as it was.
    async fn commit<T, F>(
        &self,
        state: &Arc<RwLock<EventState>>,
        guard: &mut EventState,
        mutate: F,
    ) -> ServiceResult<T>
    where
        F: FnOnce(&mut EventState) -> ServiceResult<(T, Touched)>,
    {
        let mut staged = guard.clone();
        let (value, touched) = mutate(&mut staged)?;
        if !touched.is_empty() {
            self.ensure_live(staged.id, state).await?;
            if let Err(e) = self.persist(&staged, &touched).await {
                warn!(event_id = %staged.id, error = %e, "Write failed, restoring stored records");
                self.restore(guard, &touched).await;
                return Err(e);
            }
        }
        *guard = staged;
        Ok(value)
    }

    fn emit(&self, entity_type: EntityType, action: SeatingAction, id: &str, event_id: EventId, body: serde_json::Value) {
        self.bus
            .emit(SeatingEvent::new(entity_type, action, id, event_id).with_payload(body));
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub async fn create_event(&self, req: CreateEventRequest) -> ServiceResult<EventSummary> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(ServiceError::Invalid("event name cannot be empty".into()));
        }
        validate_tables(&req.tables)?;
        let settings = req.settings.unwrap_or_default();
        validate_settings(&settings)?;

        let state = EventState::new(name, req.tables, settings);
        self.persist(&state, &Touched::event()).await?;
        let summary = state.summary();
        self.events
            .write()
            .await
            .insert(state.id, Arc::new(RwLock::new(state)));

        info!(event_id = %summary.id, name = %summary.name, "Event created");
        self.bus
            .emit_created(EntityType::Event, &summary.id.to_string(), summary.id, payload(&summary));
        Ok(summary)
    }

    /// All events, oldest first.
    pub async fn list_events(&self) -> Vec<EventSummary> {
        let states: Vec<_> = self.events.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(states.len());
        for state in states {
            summaries.push(state.read().await.summary());
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        summaries
    }

    pub async fn event_summary(&self, id: EventId) -> ServiceResult<EventSummary> {
        let state = self.state(id).await?;
        let summary = state.read().await.summary();
        Ok(summary)
    }

    /// Delete an event with everything it owns. Running jobs are cancelled.
    pub async fn delete_event(&self, id: EventId) -> ServiceResult<()> {
        let Some(removed) = self.events.write().await.remove(&id) else {
            return Err(ServiceError::EventNotFound(id));
        };
        self.jobs.cancel_event(id).await;
        // Wait out any writer that passed its liveness check
        let _guard = removed.write().await;
        self.store.delete_event(id).await?;
        info!(event_id = %id, "Event deleted");
        self.bus.emit_deleted(EntityType::Event, &id.to_string(), id);
        Ok(())
    }

    /// Replace the event's default tables. Existing arrangements keep theirs.
    pub async fn set_tables(
        &self,
        id: EventId,
        tables: Vec<Table>,
    ) -> ServiceResult<EventSummary> {
        validate_tables(&tables)?;
        let state = self.state(id).await?;
        let mut guard = state.write().await;
        let summary = self
            .commit(&state, &mut guard, |staged| {
                staged.tables = tables;
                staged.touch();
                Ok((staged.summary(), Touched::event()))
            })
            .await?;
        self.bus
            .emit_updated(EntityType::Table, &id.to_string(), id, payload(&guard.tables));
        Ok(summary)
    }

    /// Change scoring weights / threshold and rescore every arrangement.
    pub async fn update_settings(&self, id: EventId, settings: ScoreSettings) -> ServiceResult<EventSummary> {
        validate_settings(&settings)?;
        let state = self.state(id).await?;
        let mut guard = state.write().await;
        let summary = self
            .commit(&state, &mut guard, |staged| {
                let EventState {
                    graph, arrangements, ..
                } = staged;
                arrangements.set_settings(settings, graph);
                staged.touch();
                Ok((staged.summary(), Touched::everything(staged)))
            })
            .await?;
        self.bus
            .emit_updated(EntityType::Event, &id.to_string(), id, payload(&summary));
        Ok(summary)
    }

    // ========================================================================
    // Guests
    // ========================================================================

    pub async fn add_guest(&self, event_id: EventId, new: NewGuest) -> ServiceResult<Guest> {
        let guest = new.into_guest();
        let state = self.state(event_id).await?;
        let mut guard = state.write().await;
        self.commit(&state, &mut guard, |staged| {
            staged.graph.add_guest(guest.clone())?;
            // Satisfaction bounds and balance shares depend on the guest set
            let EventState {
                graph, arrangements, ..
            } = staged;
            arrangements.rescore_all(graph);
            staged.touch();
            Ok(((), Touched::everything(staged)))
        })
        .await?;
        debug!(%event_id, guest_id = %guest.id, "Guest added");
        self.bus
            .emit_created(EntityType::Guest, &guest.id.to_string(), event_id, payload(&guest));
        Ok(guest)
    }

    pub async fn list_guests(&self, event_id: EventId) -> ServiceResult<Vec<Guest>> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        Ok(guard.graph.guests().cloned().collect())
    }

    pub async fn get_guest(&self, event_id: EventId, guest_id: GuestId) -> ServiceResult<Guest> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        guard
            .graph
            .guest(guest_id)
            .cloned()
            .ok_or(ServiceError::Graph(GraphError::UnknownGuest(guest_id)))
    }

    pub async fn update_guest_attributes(
        &self,
        event_id: EventId,
        guest_id: GuestId,
        attributes: GuestAttributes,
    ) -> ServiceResult<Guest> {
        let state = self.state(event_id).await?;
        let mut guard = state.write().await;
        let guest = self
            .commit(&state, &mut guard, |staged| {
                let guest = staged.graph.update_guest_attributes(guest_id, attributes)?.clone();
                let EventState {
                    graph, arrangements, ..
                } = staged;
                arrangements.rescore_all(graph);
                staged.touch();
                Ok((guest, Touched::everything(staged)))
            })
            .await?;
        self.bus
            .emit_updated(EntityType::Guest, &guest_id.to_string(), event_id, payload(&guest));
        Ok(guest)
    }

    /// Remove a guest, their relationships, and their seat in every arrangement.
    pub async fn remove_guest(&self, event_id: EventId, guest_id: GuestId) -> ServiceResult<Guest> {
        let state = self.state(event_id).await?;
        let mut guard = state.write().await;
        let (guest, unseated) = self
            .commit(&state, &mut guard, |staged| {
                let EventState {
                    graph, arrangements, ..
                } = staged;
                let guest = graph.remove_guest(guest_id)?;
                let unseated = arrangements.remove_guest_everywhere(guest_id, graph);
                arrangements.rescore_all(graph);
                staged.touch();
                Ok(((guest, unseated), Touched::everything(staged)))
            })
            .await?;

        info!(%event_id, %guest_id, arrangements = unseated.len(), "Guest removed");
        self.bus
            .emit_deleted(EntityType::Guest, &guest_id.to_string(), event_id);
        for id in unseated {
            if let Some(arrangement) = guard.arrangements.get(id) {
                self.bus.emit_updated(
                    EntityType::Arrangement,
                    &id.to_string(),
                    event_id,
                    payload(arrangement),
                );
            }
        }
        Ok(guest)
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Insert or replace the relationship of a pair and rescore.
    pub async fn upsert_relationship(
        &self,
        event_id: EventId,
        input: RelationshipInput,
    ) -> ServiceResult<Relationship> {
        let strength = input.strength.unwrap_or_else(|| input.kind.default_strength());
        let mut relationship = Relationship::new(input.a, input.b, input.kind, strength)?;
        relationship.notes = input.notes.filter(|n| !n.trim().is_empty());

        let state = self.state(event_id).await?;
        let mut guard = state.write().await;
        let relationship = self
            .commit(&state, &mut guard, |staged| {
                let EventState {
                    graph, arrangements, ..
                } = staged;
                let relationship = graph.upsert_relationship(relationship)?;
                arrangements.rescore_all(graph);
                staged.touch();
                Ok((relationship, Touched::everything(staged)))
            })
            .await?;

        debug!(%event_id, a = %relationship.a, b = %relationship.b, kind = %relationship.kind, "Relationship saved");
        self.bus.emit_updated(
            EntityType::Relationship,
            &pair_id(relationship.a, relationship.b),
            event_id,
            payload(&relationship),
        );
        Ok(relationship)
    }

    pub async fn remove_relationship(
        &self,
        event_id: EventId,
        a: GuestId,
        b: GuestId,
    ) -> ServiceResult<Relationship> {
        let state = self.state(event_id).await?;
        let mut guard = state.write().await;
        let removed = self
            .commit(&state, &mut guard, |staged| {
                let EventState {
                    graph, arrangements, ..
                } = staged;
                let removed = graph
                    .remove_relationship(a, b)
                    .ok_or(ServiceError::RelationshipNotFound(a, b))?;
                arrangements.rescore_all(graph);
                staged.touch();
                Ok((removed, Touched::everything(staged)))
            })
            .await?;
        drop(guard);
        self.bus
            .emit_deleted(EntityType::Relationship, &pair_id(a, b), event_id);
        Ok(removed)
    }

    pub async fn list_relationships(&self, event_id: EventId) -> ServiceResult<Vec<Relationship>> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        Ok(guard.graph.relationships().cloned().collect())
    }

    pub async fn neighbors(&self, event_id: EventId, guest_id: GuestId) -> ServiceResult<Vec<Neighbor>> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        if !guard.graph.contains(guest_id) {
            return Err(GraphError::UnknownGuest(guest_id).into());
        }
        Ok(guard
            .graph
            .neighbors(guest_id)
            .map(|(guest, relationship)| Neighbor {
                guest: guest.clone(),
                relationship: relationship.clone(),
            })
            .collect())
    }

    /// Guests in conflict with `guest_id`, sorted by id.
    pub async fn conflicts_of(&self, event_id: EventId, guest_id: GuestId) -> ServiceResult<Vec<GuestId>> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        if !guard.graph.contains(guest_id) {
            return Err(GraphError::UnknownGuest(guest_id).into());
        }
        let mut ids: Vec<GuestId> = guard.graph.conflicts_of(guest_id).into_iter().collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn relationship_summary(&self, event_id: EventId) -> ServiceResult<RelationshipSummary> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        Ok(relationship_summary(&guard.graph))
    }

    /// Ask the text-analysis collaborator for relationships of `guest_id` and
    /// apply each valid proposal like a manual edit.
    ///
    /// The event lock is not held while the collaborator is consulted.
    pub async fn suggest_relationships(
        &self,
        event_id: EventId,
        guest_id: GuestId,
        text: &str,
    ) -> ServiceResult<Vec<SuggestionOutcome>> {
        let suggester = self
            .suggester
            .clone()
            .ok_or(ServiceError::SuggestionsUnavailable)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::Invalid("suggestion text cannot be empty".into()));
        }

        let state = self.state(event_id).await?;
        let (guest, guests) = {
            let guard = state.read().await;
            let guest = guard
                .graph
                .guest(guest_id)
                .cloned()
                .ok_or(GraphError::UnknownGuest(guest_id))?;
            (guest, guard.graph.guests().cloned().collect::<Vec<_>>())
        };

        let suggestions = suggester.suggest(event_id, &guest, text, &guests).await?;
        let note = format!("Suggested from: \"{}\"", text);

        let mut guard = state.write().await;
        let (outcomes, applied) = self
            .commit(&state, &mut guard, |staged| {
                Ok(apply_suggestions(staged, guest_id, suggestions, &note))
            })
            .await?;
        drop(guard);
        info!(
            %event_id,
            %guest_id,
            applied = applied.len(),
            rejected = outcomes.len() - applied.len(),
            "Applied relationship suggestions"
        );
        for relationship in &applied {
            self.bus.emit_updated(
                EntityType::Relationship,
                &pair_id(relationship.a, relationship.b),
                event_id,
                payload(relationship),
            );
        }
        Ok(outcomes)
    }
    // ========================================================================
    // Arrangements
    // ========================================================================

    /// Create a manual arrangement over the given (or the event's) tables.
    pub async fn create_arrangement(
        &self,
        event_id: EventId,
        req: CreateArrangementRequest,
    ) -> ServiceResult<Arrangement> {
        let state = self.state(event_id).await?;
        let mut guard = state.write().await;
        let tables = req.tables.unwrap_or_else(|| guard.tables.clone());
        if tables.is_empty() {
            return Err(ServiceError::Invalid(
                "an arrangement needs at least one table".into(),
            ));
        }
        let arrangement =
            Arrangement::new(event_id, req.name.trim(), tables).with_assignment(req.assignment);
        let arrangement = self
            .commit(&state, &mut guard, |staged| {
                let EventState {
                    graph, arrangements, ..
                } = staged;
                let inserted = arrangements.insert(arrangement, graph)?.clone();
                let touched = Touched::arrangements([inserted.id]);
                Ok((inserted, touched))
            })
            .await?;
        drop(guard);
        self.bus.emit_created(
            EntityType::Arrangement,
            &arrangement.id.to_string(),
            event_id,
            payload(&arrangement),
        );
        Ok(arrangement)
    }

    pub async fn list_arrangements(
        &self,
        event_id: EventId,
        status: Option<ArrangementStatus>,
    ) -> ServiceResult<Vec<Arrangement>> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        Ok(guard.arrangements.list(status).into_iter().cloned().collect())
    }

    pub async fn get_arrangement(&self, event_id: EventId, id: ArrangementId) -> ServiceResult<Arrangement> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        guard
            .arrangements
            .get(id)
            .cloned()
            .ok_or(ServiceError::Store(StoreError::NotFound(id)))
    }

    /// Delete an arrangement. A job optimizing for it is cancelled.
    pub async fn delete_arrangement(&self, event_id: EventId, id: ArrangementId) -> ServiceResult<()> {
        let state = self.state(event_id).await?;
        let mut guard = state.write().await;
        if guard.arrangements.get(id).is_none() {
            return Err(StoreError::NotFound(id).into());
        }
        self.ensure_live(event_id, &state).await?;
        self.store.delete_arrangement(event_id, id).await?;
        guard.arrangements.delete(id)?;
        drop(guard);
        if let Some(job_id) = self.jobs.active_job(event_id, Some(id)).await {
            self.jobs.cancel(job_id).await?;
        }
        self.bus
            .emit_deleted(EntityType::Arrangement, &id.to_string(), event_id);
        Ok(())
    }

    pub async fn rename_arrangement(
        &self,
        event_id: EventId,
        id: ArrangementId,
        name: &str,
    ) -> ServiceResult<Arrangement> {
        self.edit_arrangement(event_id, id, |store, _| store.rename(id, name).cloned())
            .await
    }

    /// Draft → saved.
    pub async fn save_arrangement(&self, event_id: EventId, id: ArrangementId) -> ServiceResult<Arrangement> {
        self.edit_arrangement(event_id, id, |store, _| store.save(id).cloned())
            .await
    }

    /// Promote `id` to current; the previous current becomes saved.
    pub async fn set_current(&self, event_id: EventId, id: ArrangementId) -> ServiceResult<Arrangement> {
        let state = self.state(event_id).await?;
        let mut guard = state.write().await;
        let (current, demoted) = self
            .commit(&state, &mut guard, |staged| {
                let demoted = staged.arrangements.set_current(id)?;
                let current = staged
                    .arrangements
                    .get(id)
                    .cloned()
                    .ok_or(StoreError::NotFound(id))?;
                let touched = Touched::arrangements(std::iter::once(id).chain(demoted));
                Ok(((current, demoted), touched))
            })
            .await?;
        drop(guard);
        info!(%event_id, arrangement_id = %id, demoted = ?demoted, "Arrangement set as current");
        self.emit(
            EntityType::Arrangement,
            SeatingAction::Promoted,
            &id.to_string(),
            event_id,
            serde_json::json!({ "current": id, "demoted": demoted }),
        );
        Ok(current)
    }

    pub async fn assign(
        &self,
        event_id: EventId,
        id: ArrangementId,
        guest: GuestId,
        table: TableId,
    ) -> ServiceResult<Arrangement> {
        self.edit_arrangement(event_id, id, |store, graph| {
            store.assign(id, guest, table, graph).cloned()
        })
        .await
    }

    pub async fn unassign(&self, event_id: EventId, id: ArrangementId, guest: GuestId) -> ServiceResult<Arrangement> {
        self.edit_arrangement(event_id, id, |store, graph| {
            store.unassign(id, guest, graph).cloned()
        })
        .await
    }

    pub async fn swap(
        &self,
        event_id: EventId,
        id: ArrangementId,
        a: GuestId,
        b: GuestId,
    ) -> ServiceResult<Arrangement> {
        self.edit_arrangement(event_id, id, |store, graph| store.swap(id, a, b, graph).cloned())
            .await
    }

    pub async fn replace_seating(
        &self,
        event_id: EventId,
        id: ArrangementId,
        seating: Vec<TableSeating>,
    ) -> ServiceResult<Arrangement> {
        self.edit_arrangement(event_id, id, |store, graph| {
            store.replace_seating(id, &seating, graph).cloned()
        })
        .await
    }

    pub async fn clear_arrangement(&self, event_id: EventId, id: ArrangementId) -> ServiceResult<Arrangement> {
        self.edit_arrangement(event_id, id, |store, graph| store.clear(id, graph).cloned())
            .await
    }

    /// Apply one store mutation under the event's write lock, then persist and
    /// announce the result. A rejected mutation changes nothing.
    async fn edit_arrangement<F>(&self, event_id: EventId, id: ArrangementId, edit: F) -> ServiceResult<Arrangement>
    where
        F: FnOnce(&mut ArrangementStore, &GuestGraph) -> Result<Arrangement, StoreError>,
    {
        let state = self.state(event_id).await?;
        let mut guard = state.write().await;
        let arrangement = self
            .commit(&state, &mut guard, |staged| {
                let EventState {
                    graph, arrangements, ..
                } = staged;
                Ok((edit(arrangements, graph)?, Touched::arrangements([id])))
            })
            .await?;
        drop(guard);
        self.bus.emit_updated(
            EntityType::Arrangement,
            &id.to_string(),
            event_id,
            payload(&arrangement),
        );
        Ok(arrangement)
    }

    pub async fn unassigned_guests(&self, event_id: EventId, id: ArrangementId) -> ServiceResult<Vec<Guest>> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        let ids = guard.arrangements.unassigned_guests(id, &guard.graph)?;
        Ok(ids
            .into_iter()
            .filter_map(|g| guard.graph.guest(g).cloned())
            .collect())
    }

    pub async fn find_guest(&self, event_id: EventId, pattern: &str) -> ServiceResult<Vec<GuestMatch>> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        Ok(guard.arrangements.find_guest(pattern, &guard.graph))
    }

    pub async fn diff(&self, event_id: EventId, a: ArrangementId, b: ArrangementId) -> ServiceResult<ArrangementDiff> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        Ok(guard.arrangements.diff(a, b)?)
    }

    /// Side-by-side metrics for `ids`, or every arrangement when empty.
    pub async fn compare(&self, event_id: EventId, ids: &[ArrangementId]) -> ServiceResult<Comparison> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        Ok(guard.arrangements.compare(ids)?)
    }

    /// Score an assignment without storing it, reporting any violations.
    pub async fn score_adhoc(&self, event_id: EventId, req: ScoreRequest) -> ServiceResult<ScoreReport> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        let tables = req.tables.as_deref().unwrap_or(guard.tables.as_slice());
        let settings = guard.arrangements.settings();
        let violations = constraints::validate(tables, &req.assignment, &guard.graph);
        let score = score_assignment(
            &guard.graph,
            tables,
            &req.assignment,
            &settings.weights,
            settings.strength_threshold,
        );
        Ok(ScoreReport { score, violations })
    }

    // ========================================================================
    // Export / import
    // ========================================================================

    pub async fn export_event(&self, event_id: EventId) -> ServiceResult<EventDocument> {
        let state = self.state(event_id).await?;
        let guard = state.read().await;
        Ok(EventDocument::from_parts(
            guard.id,
            &guard.name,
            &guard.graph,
            &guard.tables,
            &guard.arrangements,
        ))
    }

    /// Import a document as a new event under the document's id.
    pub async fn import_event(&self, document: EventDocument) -> ServiceResult<EventSummary> {
        if self.events.read().await.contains_key(&document.id) {
            return Err(ServiceError::EventExists(document.id));
        }
        let imported = document.into_event()?;
        let now = chrono::Utc::now();
        let state = EventState {
            id: imported.id,
            name: imported.name,
            graph: imported.graph,
            tables: imported.tables,
            arrangements: imported.arrangements,
            created_at: now,
            updated_at: now,
        };
        let summary = state.summary();

        // Held across the writes so a concurrent import of the same id cannot
        // overwrite these records
        let mut events = self.events.write().await;
        if events.contains_key(&summary.id) {
            return Err(ServiceError::EventExists(summary.id));
        }
        if let Err(e) = self.persist_all(&state).await {
            if let Err(cleanup) = self.store.delete_event(summary.id).await {
                warn!(event_id = %summary.id, error = %cleanup, "Failed to remove partial import");
            }
            return Err(e);
        }
        events.insert(summary.id, Arc::new(RwLock::new(state)));
        drop(events);

        info!(event_id = %summary.id, guests = summary.guest_count, arrangements = summary.arrangement_count, "Event imported");
        self.bus
            .emit_created(EntityType::Event, &summary.id.to_string(), summary.id, payload(&summary));
        Ok(summary)
    }
}

/// Validate and write each suggestion like a manual edit. Returns the
/// per-suggestion outcomes and the relationships that were written.
fn apply_suggestions(
    staged: &mut EventState,
    guest_id: GuestId,
    suggestions: Vec<SuggestedRelationship>,
    note: &str,
) -> ((Vec<SuggestionOutcome>, Vec<Relationship>), Touched) {
    let EventState {
        graph, arrangements, ..
    } = staged;
    let mut outcomes = Vec::with_capacity(suggestions.len());
    let mut applied = Vec::new();
    for suggestion in suggestions {
        let outcome = match resolve_target(&suggestion, graph) {
            Err(reason) => SuggestionOutcome::Rejected { suggestion, reason },
            Ok(other) => {
                let kind = suggestion.kind;
                let strength = suggestion.strength.unwrap_or_else(|| kind.default_strength());
                let written = Relationship::new(guest_id, other, kind, strength)
                    .map(|r| r.with_notes(note))
                    .and_then(|r| graph.upsert_relationship(r));
                match written {
                    Ok(relationship) => {
                        applied.push(relationship);
                        SuggestionOutcome::Applied {
                            other,
                            kind,
                            strength,
                        }
                    }
                    Err(e) => SuggestionOutcome::Rejected {
                        suggestion,
                        reason: e.to_string(),
                    },
                }
            }
        };
        outcomes.push(outcome);
    }

    if applied.is_empty() {
        return ((outcomes, applied), Touched::default());
    }
    arrangements.rescore_all(graph);
    staged.touch();
    let touched = Touched::everything(staged);
    ((outcomes, applied), touched)
}

/// Records a staged write has to store.
#[derive(Debug, Default)]
struct Touched {
    event: bool,
    arrangements: Vec<ArrangementId>,
}

impl Touched {
    fn event() -> Self {
        Self {
            event: true,
            arrangements: Vec::new(),
        }
    }

    fn arrangements(ids: impl IntoIterator<Item = ArrangementId>) -> Self {
        Self {
            event: false,
            arrangements: ids.into_iter().collect(),
        }
    }

    fn everything(state: &EventState) -> Self {
        Self {
            event: true,
            arrangements: state.arrangements.iter().map(|a| a.id).collect(),
        }
    }

    fn is_empty(&self) -> bool {
        !self.event && self.arrangements.is_empty()
    }
}

fn pair_id(a: GuestId, b: GuestId) -> String {
    let key = crate::graph::PairKey::new(a, b);
    format!("{}:{}", key.0, key.1)
}
