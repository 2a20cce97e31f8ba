//! Per-event arrangement store.
//!
//! Holds every arrangement of one event and enforces the store invariants:
//! - at most one arrangement is `current`; promoting one demotes the previous to `saved`
//! - manual edits are validated before commit and rejected edits change nothing
//! - every committed change to a seat assignment refreshes the cached score

use std::collections::HashSet;
use tracing::debug;

use super::compare::{self, ArrangementDiff, Comparison, GuestMatch};
use super::models::{
    Arrangement, ArrangementId, ArrangementStatus, SeatAssignment, TableId, TableSeating,
};
use crate::constraints::{self, Violation};
use crate::graph::{GuestGraph, GuestId, PairKey};
use crate::scoring::{score_assignment, ScoreSettings};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("arrangement {0} not found")]
    NotFound(ArrangementId),
    #[error("arrangement {0} already exists")]
    AlreadyExists(ArrangementId),
    #[error("guest {0} does not exist")]
    UnknownGuest(GuestId),
    #[error("guest {0} is not seated in this arrangement")]
    NotSeated(GuestId),
    #[error("arrangement name cannot be empty")]
    EmptyName,
    #[error("edit rejected: {}", describe(.0))]
    Rejected(Vec<Violation>),
}

fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Default)]
pub struct ArrangementStore {
    arrangements: Vec<Arrangement>,
    settings: ScoreSettings,
}

impl ArrangementStore {
    pub fn new(settings: ScoreSettings) -> Self {
        Self {
            arrangements: Vec::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ScoreSettings {
        &self.settings
    }

    /// Change scoring parameters and rescore everything.
    pub fn set_settings(&mut self, settings: ScoreSettings, graph: &GuestGraph) {
        self.settings = settings;
        self.rescore_all(graph);
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Add an arrangement. Tables, guests and capacity are validated; seated
    /// conflict pairs are accepted but recorded in `unresolved_conflicts`.
    pub fn insert(
        &mut self,
        mut arrangement: Arrangement,
        graph: &GuestGraph,
    ) -> Result<&Arrangement, StoreError> {
        if self.position(arrangement.id).is_some() {
            return Err(StoreError::AlreadyExists(arrangement.id));
        }
        if arrangement.name.trim().is_empty() {
            return Err(StoreError::EmptyName);
        }
        let mut violations = constraints::check_tables(&arrangement.tables);
        violations.extend(constraints::check_guests(&arrangement.assignment, graph));
        violations.extend(constraints::check_capacity(
            &arrangement.tables,
            &arrangement.assignment,
        ));
        if !violations.is_empty() {
            return Err(StoreError::Rejected(violations));
        }

        if arrangement.status == ArrangementStatus::Current {
            self.demote_current();
        }
        self.refresh(&mut arrangement, graph);
        debug!(
            arrangement_id = %arrangement.id,
            status = %arrangement.status,
            overall = arrangement.score.overall,
            "Inserted arrangement"
        );
        self.arrangements.push(arrangement);
        Ok(&self.arrangements[self.arrangements.len() - 1])
    }

    pub fn get(&self, id: ArrangementId) -> Option<&Arrangement> {
        self.arrangements.iter().find(|a| a.id == id)
    }

    fn get_mut(&mut self, id: ArrangementId) -> Result<&mut Arrangement, StoreError> {
        self.arrangements
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    fn position(&self, id: ArrangementId) -> Option<usize> {
        self.arrangements.iter().position(|a| a.id == id)
    }

    /// Arrangements in insertion order, optionally filtered by status.
    pub fn list(&self, status: Option<ArrangementStatus>) -> Vec<&Arrangement> {
        self.arrangements
            .iter()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .collect()
    }

    pub fn current(&self) -> Option<&Arrangement> {
        self.arrangements
            .iter()
            .find(|a| a.status == ArrangementStatus::Current)
    }

    pub fn len(&self) -> usize {
        self.arrangements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrangements.is_empty()
    }

    pub fn delete(&mut self, id: ArrangementId) -> Result<Arrangement, StoreError> {
        let pos = self.position(id).ok_or(StoreError::NotFound(id))?;
        Ok(self.arrangements.remove(pos))
    }

    pub fn rename(&mut self, id: ArrangementId, name: &str) -> Result<&Arrangement, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        let arrangement = self.get_mut(id)?;
        arrangement.name = name.to_string();
        arrangement.touch();
        Ok(arrangement)
    }

    /// Draft → saved. Saved and current arrangements are left as they are.
    pub fn save(&mut self, id: ArrangementId) -> Result<&Arrangement, StoreError> {
        let arrangement = self.get_mut(id)?;
        if arrangement.status == ArrangementStatus::Draft {
            arrangement.status = ArrangementStatus::Saved;
            arrangement.touch();
        }
        Ok(arrangement)
    }

    /// Make `id` the current arrangement, demoting any previous one to saved.
    /// Returns the id of the demoted arrangement.
    pub fn set_current(&mut self, id: ArrangementId) -> Result<Option<ArrangementId>, StoreError> {
        let pos = self.position(id).ok_or(StoreError::NotFound(id))?;
        if self.arrangements[pos].status == ArrangementStatus::Current {
            return Ok(None);
        }
        let demoted = self.demote_current();
        let arrangement = &mut self.arrangements[pos];
        arrangement.status = ArrangementStatus::Current;
        arrangement.touch();
        Ok(demoted)
    }

    fn demote_current(&mut self) -> Option<ArrangementId> {
        let mut demoted = None;
        for arrangement in self
            .arrangements
            .iter_mut()
            .filter(|a| a.status == ArrangementStatus::Current)
        {
            arrangement.status = ArrangementStatus::Saved;
            arrangement.touch();
            demoted = Some(arrangement.id);
        }
        demoted
    }

    // ------------------------------------------------------------------------
    // Manual edits
    // ------------------------------------------------------------------------

    /// Seat `guest` at `table`, moving them if already seated elsewhere.
    pub fn assign(
        &mut self,
        id: ArrangementId,
        guest: GuestId,
        table: TableId,
        graph: &GuestGraph,
    ) -> Result<&Arrangement, StoreError> {
        if !graph.contains(guest) {
            return Err(StoreError::UnknownGuest(guest));
        }
        let arrangement = self.get(id).ok_or(StoreError::NotFound(id))?;
        let mut proposed = arrangement.assignment.clone();
        proposed.insert(guest, table);
        self.commit(id, proposed, graph)
    }

    /// Remove `guest` from their table. Unseated guests are a no-op.
    pub fn unassign(
        &mut self,
        id: ArrangementId,
        guest: GuestId,
        graph: &GuestGraph,
    ) -> Result<&Arrangement, StoreError> {
        let arrangement = self.get(id).ok_or(StoreError::NotFound(id))?;
        if !arrangement.assignment.contains_key(&guest) {
            return self.get(id).ok_or(StoreError::NotFound(id));
        }
        let mut proposed = arrangement.assignment.clone();
        proposed.remove(&guest);
        self.commit(id, proposed, graph)
    }

    /// Exchange the tables of two seated guests.
    pub fn swap(
        &mut self,
        id: ArrangementId,
        a: GuestId,
        b: GuestId,
        graph: &GuestGraph,
    ) -> Result<&Arrangement, StoreError> {
        let arrangement = self.get(id).ok_or(StoreError::NotFound(id))?;
        let ta = *arrangement.assignment.get(&a).ok_or(StoreError::NotSeated(a))?;
        let tb = *arrangement.assignment.get(&b).ok_or(StoreError::NotSeated(b))?;
        let mut proposed = arrangement.assignment.clone();
        proposed.insert(a, tb);
        proposed.insert(b, ta);
        self.commit(id, proposed, graph)
    }

    /// Replace the whole seating from a table → guests view.
    pub fn replace_seating(
        &mut self,
        id: ArrangementId,
        seating: &[TableSeating],
        graph: &GuestGraph,
    ) -> Result<&Arrangement, StoreError> {
        if self.get(id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        let proposed =
            constraints::seating_to_assignment(seating).map_err(StoreError::Rejected)?;
        self.commit(id, proposed, graph)
    }

    /// Unseat everyone.
    pub fn clear(&mut self, id: ArrangementId, graph: &GuestGraph) -> Result<&Arrangement, StoreError> {
        if self.get(id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        self.commit(id, SeatAssignment::new(), graph)
    }

    /// Validate and apply a proposed assignment.
    ///
    /// Only violations the edit introduces reject it: an optimizer candidate
    /// carrying an annotated conflict can still be edited elsewhere.
    fn commit(
        &mut self,
        id: ArrangementId,
        proposed: SeatAssignment,
        graph: &GuestGraph,
    ) -> Result<&Arrangement, StoreError> {
        let arrangement = self.get(id).ok_or(StoreError::NotFound(id))?;
        let before = constraints::validate(&arrangement.tables, &arrangement.assignment, graph);
        let introduced: Vec<Violation> = constraints::validate(&arrangement.tables, &proposed, graph)
            .into_iter()
            .filter(|v| !before.contains(v))
            .collect();
        if !introduced.is_empty() {
            debug!(arrangement_id = %id, violations = introduced.len(), "Rejected seating edit");
            return Err(StoreError::Rejected(introduced));
        }

        let settings = self.settings;
        let arrangement = self.get_mut(id)?;
        arrangement.assignment = proposed;
        refresh_with(&settings, arrangement, graph);
        arrangement.touch();
        Ok(arrangement)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Guests of the event not seated in `id`, in graph order.
    pub fn unassigned_guests(
        &self,
        id: ArrangementId,
        graph: &GuestGraph,
    ) -> Result<Vec<GuestId>, StoreError> {
        let arrangement = self.get(id).ok_or(StoreError::NotFound(id))?;
        Ok(graph
            .guests()
            .map(|g| g.id)
            .filter(|g| !arrangement.assignment.contains_key(g))
            .collect())
    }

    pub fn find_guest(&self, pattern: &str, graph: &GuestGraph) -> Vec<GuestMatch> {
        compare::find_guest(pattern, graph, &self.arrangements)
    }

    pub fn diff(&self, a: ArrangementId, b: ArrangementId) -> Result<ArrangementDiff, StoreError> {
        let left = self.get(a).ok_or(StoreError::NotFound(a))?;
        let right = self.get(b).ok_or(StoreError::NotFound(b))?;
        Ok(compare::diff(left, right))
    }

    /// Side-by-side metrics; all arrangements when `ids` is empty.
    pub fn compare(&self, ids: &[ArrangementId]) -> Result<Comparison, StoreError> {
        if ids.is_empty() {
            return Ok(compare::compare(&self.arrangements));
        }
        let selected = ids
            .iter()
            .map(|id| self.get(*id).ok_or(StoreError::NotFound(*id)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(compare::compare(selected))
    }

    // ------------------------------------------------------------------------
    // Graph changes
    // ------------------------------------------------------------------------

    /// Drop a deleted guest from every arrangement. Returns the ids of the
    /// arrangements that changed; `graph` should no longer contain the guest.
    pub fn remove_guest_everywhere(&mut self, guest: GuestId, graph: &GuestGraph) -> Vec<ArrangementId> {
        let settings = self.settings;
        let mut changed = Vec::new();
        for arrangement in self.arrangements.iter_mut() {
            if arrangement.assignment.remove(&guest).is_some() {
                refresh_with(&settings, arrangement, graph);
                arrangement.touch();
                changed.push(arrangement.id);
            }
        }
        changed
    }

    /// Recompute cached scores, e.g. after relationships changed.
    pub fn rescore_all(&mut self, graph: &GuestGraph) {
        let settings = self.settings;
        for arrangement in self.arrangements.iter_mut() {
            refresh_with(&settings, arrangement, graph);
        }
    }

    fn refresh(&self, arrangement: &mut Arrangement, graph: &GuestGraph) {
        refresh_with(&self.settings, arrangement, graph);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arrangement> + '_ {
        self.arrangements.iter()
    }
}

/// Rescore and re-annotate seated conflict pairs.
fn refresh_with(settings: &ScoreSettings, arrangement: &mut Arrangement, graph: &GuestGraph) {
    arrangement.score = score_assignment(
        graph,
        &arrangement.tables,
        &arrangement.assignment,
        &settings.weights,
        settings.strength_threshold,
    );
    let mut seen = HashSet::new();
    arrangement.unresolved_conflicts = constraints::check_conflicts(&arrangement.tables, &arrangement.assignment, graph)
        .into_iter()
        .filter_map(|v| match v {
            Violation::ConflictSeated { a, b, .. } => Some(PairKey::new(a, b)),
            _ => None,
        })
        .filter(|k| seen.insert(*k))
        .collect();
}
