//! Greedy initial packing.
//!
//! Guests are visited group by group (larger groups first, ties shuffled by
//! the restart's RNG), and inside a group by affinity cluster. Each guest goes
//! to the conflict-free table with room that has the highest affinity with
//! the guests already there, preferring the table currently being filled.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

use crate::graph::{affinity_clusters, GuestGraph};
use crate::scoring::ScoreContext;

/// Seat every guest. Capacity is assumed sufficient (checked by preflight).
pub fn greedy_seed<R: Rng>(
    ctx: &ScoreContext,
    graph: &GuestGraph,
    threshold: f64,
    rng: &mut R,
) -> Vec<Option<usize>> {
    let order = visit_order(ctx, graph, threshold, rng);
    let mut assignment = vec![None; ctx.guest_count()];
    let mut sizes = vec![0usize; ctx.table_count()];
    let mut filling = 0;

    for guest in order {
        let Some(table) = choose_table(ctx, guest, &assignment, &sizes, filling) else {
            continue;
        };
        assignment[guest] = Some(table);
        sizes[table] += 1;
        if sizes[filling] >= ctx.capacity(filling) {
            if let Some(next) = (0..ctx.table_count()).find(|t| sizes[*t] < ctx.capacity(*t)) {
                filling = next;
            }
        }
    }
    assignment
}

fn visit_order<R: Rng>(
    ctx: &ScoreContext,
    graph: &GuestGraph,
    threshold: f64,
    rng: &mut R,
) -> Vec<usize> {
    let mut cluster_rank: HashMap<usize, usize> = HashMap::new();
    for (rank, cluster) in affinity_clusters(graph, threshold).iter().enumerate() {
        for id in cluster {
            if let Some(idx) = ctx.guest_index(*id) {
                cluster_rank.insert(idx, rank);
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = graph
        .groups()
        .into_values()
        .map(|ids| ids.into_iter().filter_map(|id| ctx.guest_index(id)).collect())
        .collect();
    groups.shuffle(rng);
    groups.sort_by(|a: &Vec<usize>, b: &Vec<usize>| b.len().cmp(&a.len()));

    groups
        .into_iter()
        .flat_map(|mut members| {
            members.sort_by_key(|g| (cluster_rank.get(g).copied().unwrap_or(usize::MAX), *g));
            members
        })
        .collect()
}

fn choose_table(
    ctx: &ScoreContext,
    guest: usize,
    assignment: &[Option<usize>],
    sizes: &[usize],
    filling: usize,
) -> Option<usize> {
    // (conflicts, affinity, is_filling) per table with room
    let open: Vec<(usize, usize, f64)> = (0..ctx.table_count())
        .filter(|t| sizes[*t] < ctx.capacity(*t))
        .map(|t| {
            (
                t,
                ctx.table_conflicts(guest, t, assignment),
                ctx.table_affinity(guest, t, assignment),
            )
        })
        .collect();

    let clean: Vec<&(usize, usize, f64)> = open.iter().filter(|(_, c, _)| *c == 0).collect();
    if !clean.is_empty() {
        let best_affinity = clean.iter().map(|(_, _, a)| *a).fold(0.0, f64::max);
        if best_affinity > 0.0 {
            return clean
                .iter()
                .filter(|(_, _, a)| (*a - best_affinity).abs() < 1e-12)
                .map(|(t, _, _)| *t)
                .min_by_key(|t| (*t != filling, *t));
        }
        return clean.iter().map(|(t, _, _)| *t).min_by_key(|t| (*t != filling, *t));
    }

    // Every open table conflicts: fewest conflicts, then most affinity
    open.iter()
        .min_by(|x, y| x.1.cmp(&y.1).then(y.2.total_cmp(&x.2)))
        .map(|(t, _, _)| *t)
}
