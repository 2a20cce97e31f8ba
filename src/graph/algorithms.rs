//! Relationship graph algorithms.
//!
//! - **Affinity clusters** - connected components over positive edges at or
//!   above a strength threshold, via `petgraph::unionfind::UnionFind`
//! - **Relationship summary** - per-type counts, mean strengths, isolated guests
//!
//! Both are deterministic: output order follows guest insertion order.

use petgraph::unionfind::UnionFind;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::models::{GuestGraph, GuestId, RelationshipType};

// ============================================================================
// Affinity clusters
// ============================================================================

/// Group guests connected through positive relationships with
/// `strength >= threshold`.
///
/// Conflicts never join clusters. Guests without qualifying edges form
/// singleton clusters. Clusters are ordered by size (largest first), ties in
/// order of their first member; members keep insertion order.
pub fn affinity_clusters(graph: &GuestGraph, threshold: f64) -> Vec<Vec<GuestId>> {
    let ids: Vec<GuestId> = graph.guests().map(|g| g.id).collect();
    if ids.is_empty() {
        return Vec::new();
    }
    let position: HashMap<GuestId, usize> =
        ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut uf: UnionFind<usize> = UnionFind::new(ids.len());
    for rel in graph.relationships() {
        if rel.strength <= 0.0 || rel.strength < threshold {
            continue;
        }
        if let (Some(&a), Some(&b)) = (position.get(&rel.a), position.get(&rel.b)) {
            uf.union(a, b);
        }
    }

    // Representative → cluster, in order of first appearance
    let mut order: Vec<usize> = Vec::new();
    let mut clusters: HashMap<usize, Vec<GuestId>> = HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        let root = uf.find(i);
        clusters
            .entry(root)
            .or_insert_with(|| {
                order.push(root);
                Vec::new()
            })
            .push(*id);
    }

    let mut result: Vec<Vec<GuestId>> = order
        .into_iter()
        .filter_map(|root| clusters.remove(&root))
        .collect();
    // Stable sort keeps first-appearance order among equal sizes
    result.sort_by(|a, b| b.len().cmp(&a.len()));
    result
}

// ============================================================================
// Relationship summary
// ============================================================================

/// Count and mean strength for one relationship type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeStats {
    pub count: usize,
    pub mean_strength: f64,
}

/// Network-level overview of an event's relationships.
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipSummary {
    pub guest_count: usize,
    pub relationship_count: usize,
    pub conflict_pairs: usize,
    pub by_type: BTreeMap<RelationshipType, TypeStats>,
    /// Guests without any relationship
    pub isolated_guests: Vec<GuestId>,
    /// Guests with the most relationships, descending (at most 5)
    pub most_connected: Vec<(GuestId, usize)>,
    /// 2·E / (N·(N−1)); 0 when N < 2
    pub density: f64,
}

pub fn relationship_summary(graph: &GuestGraph) -> RelationshipSummary {
    let mut by_type: BTreeMap<RelationshipType, TypeStats> = BTreeMap::new();
    let mut sums: BTreeMap<RelationshipType, f64> = BTreeMap::new();

    for rel in graph.relationships() {
        by_type.entry(rel.kind).or_default().count += 1;
        *sums.entry(rel.kind).or_insert(0.0) += rel.strength;
    }
    for (kind, stats) in by_type.iter_mut() {
        if stats.count > 0 {
            stats.mean_strength = sums.get(kind).copied().unwrap_or(0.0) / stats.count as f64;
        }
    }

    let mut degrees: Vec<(GuestId, usize)> = graph
        .guests()
        .map(|g| (g.id, graph.neighbors(g.id).count()))
        .collect();
    let isolated_guests = degrees
        .iter()
        .filter(|(_, d)| *d == 0)
        .map(|(id, _)| *id)
        .collect();
    degrees.sort_by(|a, b| b.1.cmp(&a.1));
    let most_connected = degrees.into_iter().filter(|(_, d)| *d > 0).take(5).collect();

    let n = graph.guest_count();
    let e = graph.relationship_count();
    let density = if n < 2 {
        0.0
    } else {
        2.0 * e as f64 / (n as f64 * (n as f64 - 1.0))
    };

    RelationshipSummary {
        guest_count: n,
        relationship_count: e,
        conflict_pairs: by_type
            .get(&RelationshipType::Conflict)
            .map(|s| s.count)
            .unwrap_or(0),
        by_type,
        isolated_guests,
        most_connected,
        density,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::models::Guest;

    fn build(n: usize) -> (GuestGraph, Vec<GuestId>) {
        let mut g = GuestGraph::new();
        let mut ids = Vec::new();
        for i in 0..n {
            let guest = Guest::new(format!("Guest {}", i), "Friends");
            ids.push(guest.id);
            g.add_guest(guest).unwrap();
        }
        (g, ids)
    }

    #[test]
    fn test_affinity_clusters_empty_graph() {
        assert!(affinity_clusters(&GuestGraph::new(), 0.0).is_empty());
    }

    #[test]
    fn test_affinity_clusters_follow_positive_edges() {
        let (mut g, ids) = build(5);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Family, 0.9)
            .unwrap();
        g.add_or_update_relationship(ids[1], ids[2], RelationshipType::Friend, 0.6)
            .unwrap();
        g.add_or_update_relationship(ids[3], ids[4], RelationshipType::Conflict, -0.8)
            .unwrap();

        let clusters = affinity_clusters(&g, 0.0);
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0], vec![ids[0], ids[1], ids[2]]);
        assert_eq!(clusters[1], vec![ids[3]]);
        assert_eq!(clusters[2], vec![ids[4]]);
    }

    #[test]
    fn test_affinity_clusters_respect_threshold() {
        let (mut g, ids) = build(3);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Family, 0.9)
            .unwrap();
        g.add_or_update_relationship(ids[1], ids[2], RelationshipType::Acquaintance, 0.2)
            .unwrap();

        let clusters = affinity_clusters(&g, 0.5);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], vec![ids[0], ids[1]]);
    }

    #[test]
    fn test_relationship_summary() {
        let (mut g, ids) = build(4);
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Family, 0.8)
            .unwrap();
        g.add_or_update_relationship(ids[0], ids[2], RelationshipType::Family, 0.6)
            .unwrap();
        g.add_or_update_relationship(ids[1], ids[2], RelationshipType::Conflict, -0.5)
            .unwrap();

        let summary = relationship_summary(&g);
        assert_eq!(summary.guest_count, 4);
        assert_eq!(summary.relationship_count, 3);
        assert_eq!(summary.conflict_pairs, 1);
        let family = &summary.by_type[&RelationshipType::Family];
        assert_eq!(family.count, 2);
        assert!((family.mean_strength - 0.7).abs() < 1e-9);
        assert_eq!(summary.isolated_guests, vec![ids[3]]);
        assert_eq!(summary.most_connected[0].1, 2);
        assert!((summary.density - 0.5).abs() < 1e-9);
    }
}
