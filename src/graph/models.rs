//! Relationship graph data models.
//!
//! ## Types
//! - [`Guest`] / [`GuestAttributes`] - people to be seated and the attributes used for balancing
//! - [`RelationshipType`] / [`Relationship`] - signed, weighted, symmetric connections
//! - [`GuestGraph`] - petgraph wrapper with id ↔ NodeIndex mapping and an unordered-pair index
//!
//! The graph is undirected: a relationship is stored once and can be queried
//! from either endpoint. Writes to an existing pair replace the relationship.

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a guest within an event.
pub type GuestId = Uuid;

// ============================================================================
// Errors
// ============================================================================

/// Rejections raised by graph mutations. Nothing is partially applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("invalid relationship between {a} and {b}: {reason}")]
    InvalidRelationship {
        a: GuestId,
        b: GuestId,
        reason: String,
    },
    #[error("unknown guest {0}")]
    UnknownGuest(GuestId),
    #[error("guest {0} already exists")]
    DuplicateGuest(GuestId),
    #[error("invalid guest: {0}")]
    InvalidGuest(String),
}

// ============================================================================
// Guests
// ============================================================================

/// Optional guest attributes. `age_range` and `dietary_needs` feed balance scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dietary_needs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A person to be seated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    pub id: GuestId,
    /// Display name
    pub name: String,
    /// Group / relationship-category tag (e.g. "Family", "Colleague")
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub attributes: GuestAttributes,
}

impl Guest {
    /// Create a guest with a fresh id and no attributes.
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            group: group.into(),
            attributes: GuestAttributes::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: GuestAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// Kind of connection between two guests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Family,
    Friend,
    Colleague,
    Acquaintance,
    Conflict,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 5] = [
        Self::Family,
        Self::Friend,
        Self::Colleague,
        Self::Acquaintance,
        Self::Conflict,
    ];

    /// Strength used when a caller does not provide one.
    pub fn default_strength(self) -> f64 {
        match self {
            Self::Family => 0.8,
            Self::Friend => 0.6,
            Self::Colleague => 0.4,
            Self::Acquaintance => 0.2,
            Self::Conflict => -0.5,
        }
    }

    pub fn is_conflict(self) -> bool {
        matches!(self, Self::Conflict)
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Family => write!(f, "family"),
            Self::Friend => write!(f, "friend"),
            Self::Colleague => write!(f, "colleague"),
            Self::Acquaintance => write!(f, "acquaintance"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

impl FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "family" => Ok(Self::Family),
            "friend" => Ok(Self::Friend),
            "colleague" => Ok(Self::Colleague),
            "acquaintance" => Ok(Self::Acquaintance),
            "conflict" => Ok(Self::Conflict),
            other => Err(format!("unknown relationship type: {}", other)),
        }
    }
}

/// A signed, weighted, symmetric connection between two guests.
///
/// Invariant: `kind == Conflict` ⇔ `strength < 0`, and `strength ∈ [-1, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub a: GuestId,
    pub b: GuestId,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Relationship {
    /// Build a validated relationship.
    pub fn new(
        a: GuestId,
        b: GuestId,
        kind: RelationshipType,
        strength: f64,
    ) -> Result<Self, GraphError> {
        let invalid = |reason: &str| GraphError::InvalidRelationship {
            a,
            b,
            reason: reason.to_string(),
        };

        if a == b {
            return Err(invalid("a guest cannot have a relationship with themselves"));
        }
        if !strength.is_finite() || !(-1.0..=1.0).contains(&strength) {
            return Err(invalid("strength must be within [-1.0, 1.0]"));
        }
        if kind.is_conflict() != (strength < 0.0) {
            return Err(invalid(
                "conflict relationships must have negative strength and only conflicts may be negative",
            ));
        }

        Ok(Self {
            a,
            b,
            kind,
            strength,
            notes: None,
        })
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn is_conflict(&self) -> bool {
        self.kind.is_conflict()
    }

    pub fn involves(&self, id: GuestId) -> bool {
        self.a == id || self.b == id
    }

    /// The endpoint opposite `id`, if `id` is an endpoint.
    pub fn other(&self, id: GuestId) -> Option<GuestId> {
        if self.a == id {
            Some(self.b)
        } else if self.b == id {
            Some(self.a)
        } else {
            None
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.a, self.b)
    }
}

/// Unordered guest pair, normalized so `(a, b)` and `(b, a)` hash identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey(pub GuestId, pub GuestId);

impl PairKey {
    pub fn new(a: GuestId, b: GuestId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

// ============================================================================
// GuestGraph - petgraph wrapper with id + pair indexes
// ============================================================================

/// Undirected relationship graph over the guests of one event.
///
/// Uses a `StableUnGraph` so removing guests or relationships keeps the
/// remaining indices valid. `id_to_index` resolves guests in O(1) and
/// `pair_index` resolves a relationship by unordered pair in O(1).
#[derive(Debug, Clone, Default)]
pub struct GuestGraph {
    graph: StableUnGraph<Guest, Relationship>,
    id_to_index: HashMap<GuestId, NodeIndex>,
    pair_index: HashMap<PairKey, EdgeIndex>,
}

impl GuestGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a guest. Names must be non-empty and ids unique.
    pub fn add_guest(&mut self, guest: Guest) -> Result<(), GraphError> {
        if guest.name.trim().is_empty() {
            return Err(GraphError::InvalidGuest("guest name cannot be empty".into()));
        }
        if self.id_to_index.contains_key(&guest.id) {
            return Err(GraphError::DuplicateGuest(guest.id));
        }
        let id = guest.id;
        let idx = self.graph.add_node(guest);
        self.id_to_index.insert(id, idx);
        Ok(())
    }

    /// Replace a guest's attributes. Identity, name and group are unchanged.
    pub fn update_guest_attributes(
        &mut self,
        id: GuestId,
        attributes: GuestAttributes,
    ) -> Result<&Guest, GraphError> {
        let idx = *self
            .id_to_index
            .get(&id)
            .ok_or(GraphError::UnknownGuest(id))?;
        let guest = self
            .graph
            .node_weight_mut(idx)
            .ok_or(GraphError::UnknownGuest(id))?;
        guest.attributes = attributes;
        Ok(guest)
    }

    /// Remove a guest together with all of its relationships.
    pub fn remove_guest(&mut self, id: GuestId) -> Result<Guest, GraphError> {
        let idx = self
            .id_to_index
            .remove(&id)
            .ok_or(GraphError::UnknownGuest(id))?;
        let pairs: Vec<PairKey> = self.graph.edges(idx).map(|e| e.weight().key()).collect();
        for pair in pairs {
            self.pair_index.remove(&pair);
        }
        self.graph
            .remove_node(idx)
            .ok_or(GraphError::UnknownGuest(id))
    }

    pub fn guest(&self, id: GuestId) -> Option<&Guest> {
        let idx = self.id_to_index.get(&id)?;
        self.graph.node_weight(*idx)
    }

    pub fn contains(&self, id: GuestId) -> bool {
        self.id_to_index.contains_key(&id)
    }

    /// Guests in insertion order.
    pub fn guests(&self) -> impl Iterator<Item = &Guest> + '_ {
        self.graph
            .node_indices()
            .filter_map(move |idx| self.graph.node_weight(idx))
    }

    pub fn guest_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Insert or replace the relationship of the unordered pair `(a, b)`.
    pub fn add_or_update_relationship(
        &mut self,
        a: GuestId,
        b: GuestId,
        kind: RelationshipType,
        strength: f64,
    ) -> Result<Relationship, GraphError> {
        let relationship = Relationship::new(a, b, kind, strength)?;
        self.upsert_relationship(relationship)
    }

    /// Insert or replace a pre-built relationship, re-validating it first.
    pub fn upsert_relationship(
        &mut self,
        relationship: Relationship,
    ) -> Result<Relationship, GraphError> {
        let notes = relationship.notes.clone();
        let mut relationship = Relationship::new(
            relationship.a,
            relationship.b,
            relationship.kind,
            relationship.strength,
        )?;
        relationship.notes = notes;

        let a_idx = *self
            .id_to_index
            .get(&relationship.a)
            .ok_or(GraphError::UnknownGuest(relationship.a))?;
        let b_idx = *self
            .id_to_index
            .get(&relationship.b)
            .ok_or(GraphError::UnknownGuest(relationship.b))?;

        let key = relationship.key();
        if let Some(&edge) = self.pair_index.get(&key) {
            if let Some(existing) = self.graph.edge_weight_mut(edge) {
                *existing = relationship.clone();
                return Ok(relationship);
            }
        }
        let edge = self.graph.add_edge(a_idx, b_idx, relationship.clone());
        self.pair_index.insert(key, edge);
        Ok(relationship)
    }

    /// Remove the relationship of the pair, returning it if it existed.
    pub fn remove_relationship(&mut self, a: GuestId, b: GuestId) -> Option<Relationship> {
        let edge = self.pair_index.remove(&PairKey::new(a, b))?;
        self.graph.remove_edge(edge)
    }

    /// O(1) lookup by unordered pair.
    pub fn relationship(&self, a: GuestId, b: GuestId) -> Option<&Relationship> {
        let edge = self.pair_index.get(&PairKey::new(a, b))?;
        self.graph.edge_weight(*edge)
    }

    /// All relationships, each once.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> + '_ {
        self.graph
            .edge_indices()
            .filter_map(move |e| self.graph.edge_weight(e))
    }

    /// Lazy sequence of `(other guest, relationship)` for every relationship of `id`.
    ///
    /// Empty for unknown guests. Calling it again restarts the sequence.
    pub fn neighbors(&self, id: GuestId) -> impl Iterator<Item = (&Guest, &Relationship)> + '_ {
        self.id_to_index
            .get(&id)
            .copied()
            .into_iter()
            .flat_map(move |idx| {
                self.graph.edges(idx).map(move |edge| {
                    let other = if edge.source() == idx {
                        edge.target()
                    } else {
                        edge.source()
                    };
                    (&self.graph[other], edge.weight())
                })
            })
    }

    /// Guests that have a conflict relationship with `id`.
    pub fn conflicts_of(&self, id: GuestId) -> HashSet<GuestId> {
        self.neighbors(id)
            .filter(|(_, rel)| rel.is_conflict())
            .map(|(other, _)| other.id)
            .collect()
    }

    /// Guests grouped by their group tag, in insertion order within each group.
    pub fn groups(&self) -> BTreeMap<String, Vec<GuestId>> {
        let mut groups: BTreeMap<String, Vec<GuestId>> = BTreeMap::new();
        for guest in self.guests() {
            groups.entry(guest.group.clone()).or_default().push(guest.id);
        }
        groups
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(names: &[&str]) -> (GuestGraph, Vec<GuestId>) {
        let mut g = GuestGraph::new();
        let mut ids = Vec::new();
        for name in names {
            let guest = Guest::new(*name, "Friends");
            ids.push(guest.id);
            g.add_guest(guest).unwrap();
        }
        (g, ids)
    }

    #[test]
    fn test_relationship_rejects_self_loop() {
        let id = Uuid::new_v4();
        let err = Relationship::new(id, id, RelationshipType::Friend, 0.5).unwrap_err();
        assert!(matches!(err, GraphError::InvalidRelationship { .. }));
    }

    #[test]
    fn test_relationship_rejects_out_of_range_strength() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(Relationship::new(a, b, RelationshipType::Friend, 1.5).is_err());
        assert!(Relationship::new(a, b, RelationshipType::Conflict, -1.01).is_err());
        assert!(Relationship::new(a, b, RelationshipType::Friend, f64::NAN).is_err());
    }

    #[test]
    fn test_relationship_type_strength_consistency() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(Relationship::new(a, b, RelationshipType::Conflict, 0.3).is_err());
        assert!(Relationship::new(a, b, RelationshipType::Conflict, 0.0).is_err());
        assert!(Relationship::new(a, b, RelationshipType::Family, -0.3).is_err());
        assert!(Relationship::new(a, b, RelationshipType::Conflict, -0.3).is_ok());
        assert!(Relationship::new(a, b, RelationshipType::Acquaintance, 0.0).is_ok());
    }

    #[test]
    fn test_default_strengths_are_valid() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        for kind in RelationshipType::ALL {
            assert!(Relationship::new(a, b, kind, kind.default_strength()).is_ok());
        }
    }

    #[test]
    fn test_relationship_type_display_and_parse() {
        for kind in RelationshipType::ALL {
            assert_eq!(kind.to_string().parse::<RelationshipType>().unwrap(), kind);
        }
        assert_eq!(
            "  Family ".parse::<RelationshipType>().unwrap(),
            RelationshipType::Family
        );
        assert!("enemy".parse::<RelationshipType>().is_err());
    }

    #[test]
    fn test_relationship_serializes_type_field() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let rel = Relationship::new(a, b, RelationshipType::Colleague, 0.4).unwrap();
        let json = serde_json::to_value(&rel).unwrap();
        assert_eq!(json["type"], "colleague");
        assert!(json.get("notes").is_none());
    }

    #[test]
    fn test_add_guest_rejects_duplicates_and_empty_names() {
        let mut g = GuestGraph::new();
        let guest = Guest::new("Ada", "Family");
        g.add_guest(guest.clone()).unwrap();
        assert_eq!(
            g.add_guest(guest.clone()).unwrap_err(),
            GraphError::DuplicateGuest(guest.id)
        );
        assert!(matches!(
            g.add_guest(Guest::new("  ", "Family")),
            Err(GraphError::InvalidGuest(_))
        ));
        assert_eq!(g.guest_count(), 1);
    }

    #[test]
    fn test_relationship_is_symmetric() {
        let (mut g, ids) = graph_with(&["Ada", "Grace"]);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Friend, 0.7)
            .unwrap();

        let ab = g.relationship(ids[0], ids[1]).unwrap();
        let ba = g.relationship(ids[1], ids[0]).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(g.relationship_count(), 1);
    }

    #[test]
    fn test_later_write_replaces_never_duplicates() {
        let (mut g, ids) = graph_with(&["Ada", "Grace"]);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Friend, 0.7)
            .unwrap();
        g.add_or_update_relationship(ids[1], ids[0], RelationshipType::Conflict, -0.9)
            .unwrap();

        assert_eq!(g.relationship_count(), 1);
        let rel = g.relationship(ids[0], ids[1]).unwrap();
        assert_eq!(rel.kind, RelationshipType::Conflict);
        assert!((rel.strength + 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_relationship_with_unknown_guest_rejected() {
        let (mut g, ids) = graph_with(&["Ada"]);
        let stranger = Uuid::new_v4();
        assert_eq!(
            g.add_or_update_relationship(ids[0], stranger, RelationshipType::Friend, 0.5)
                .unwrap_err(),
            GraphError::UnknownGuest(stranger)
        );
        assert_eq!(g.relationship_count(), 0);
    }

    #[test]
    fn test_invalid_update_keeps_previous_relationship() {
        let (mut g, ids) = graph_with(&["Ada", "Grace"]);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Friend, 0.7)
            .unwrap();
        assert!(g
            .add_or_update_relationship(ids[0], ids[1], RelationshipType::Friend, -0.7)
            .is_err());
        assert_eq!(
            g.relationship(ids[0], ids[1]).unwrap().kind,
            RelationshipType::Friend
        );
    }

    #[test]
    fn test_neighbors_lazy_and_restartable() {
        let (mut g, ids) = graph_with(&["Ada", "Grace", "Linus"]);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Friend, 0.7)
            .unwrap();
        g.add_or_update_relationship(ids[2], ids[0], RelationshipType::Conflict, -0.5)
            .unwrap();

        let first: HashSet<GuestId> = g.neighbors(ids[0]).map(|(o, _)| o.id).collect();
        let second: HashSet<GuestId> = g.neighbors(ids[0]).map(|(o, _)| o.id).collect();
        assert_eq!(first, second);
        assert_eq!(first, HashSet::from([ids[1], ids[2]]));

        // Queried from the other endpoint
        let from_linus: Vec<GuestId> = g.neighbors(ids[2]).map(|(o, _)| o.id).collect();
        assert_eq!(from_linus, vec![ids[0]]);

        assert_eq!(g.neighbors(Uuid::new_v4()).count(), 0);
    }

    #[test]
    fn test_conflicts_of() {
        let (mut g, ids) = graph_with(&["Ada", "Grace", "Linus"]);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Friend, 0.7)
            .unwrap();
        g.add_or_update_relationship(ids[0], ids[2], RelationshipType::Conflict, -0.5)
            .unwrap();

        assert_eq!(g.conflicts_of(ids[0]), HashSet::from([ids[2]]));
        assert_eq!(g.conflicts_of(ids[2]), HashSet::from([ids[0]]));
        assert!(g.conflicts_of(ids[1]).is_empty());
    }

    #[test]
    fn test_remove_guest_drops_relationships() {
        let (mut g, ids) = graph_with(&["Ada", "Grace", "Linus"]);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Friend, 0.7)
            .unwrap();
        g.add_or_update_relationship(ids[1], ids[2], RelationshipType::Friend, 0.4)
            .unwrap();

        let removed = g.remove_guest(ids[1]).unwrap();
        assert_eq!(removed.name, "Grace");
        assert_eq!(g.guest_count(), 2);
        assert_eq!(g.relationship_count(), 0);
        assert!(g.relationship(ids[0], ids[1]).is_none());

        // Remaining guests still resolvable, and new edges still index correctly
        g.add_or_update_relationship(ids[0], ids[2], RelationshipType::Family, 0.9)
            .unwrap();
        assert!(g.relationship(ids[2], ids[0]).is_some());
        assert_eq!(
            g.remove_guest(ids[1]).unwrap_err(),
            GraphError::UnknownGuest(ids[1])
        );
    }

    #[test]
    fn test_remove_relationship() {
        let (mut g, ids) = graph_with(&["Ada", "Grace"]);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Friend, 0.7)
            .unwrap();
        assert!(g.remove_relationship(ids[1], ids[0]).is_some());
        assert!(g.remove_relationship(ids[1], ids[0]).is_none());
        assert_eq!(g.relationship_count(), 0);
    }

    #[test]
    fn test_update_guest_attributes() {
        let (mut g, ids) = graph_with(&["Ada"]);
        let attrs = GuestAttributes {
            age_range: Some("30-40".into()),
            dietary_needs: vec!["Vegetarian".into()],
            ..Default::default()
        };
        let updated = g.update_guest_attributes(ids[0], attrs.clone()).unwrap();
        assert_eq!(updated.attributes, attrs);
        assert_eq!(updated.name, "Ada");
    }

    #[test]
    fn test_groups() {
        let mut g = GuestGraph::new();
        g.add_guest(Guest::new("Ada", "Family")).unwrap();
        g.add_guest(Guest::new("Grace", "Colleague")).unwrap();
        g.add_guest(Guest::new("Linus", "Family")).unwrap();

        let groups = g.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["Family"].len(), 2);
        assert_eq!(groups["Colleague"].len(), 1);
    }
}
