//! Simulated annealing over relocate / swap moves, plus greedy conflict repair.

use rand::Rng;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::CONFLICT_PENALTY;
use crate::scoring::ScoreContext;

pub struct SearchParams {
    pub max_iterations: u64,
    pub deadline: Instant,
    pub initial_temperature: f64,
    /// Points lost per family pair seated apart; zero disables
    pub family_split_penalty: f64,
}

pub struct SearchRun {
    pub best: Vec<Option<usize>>,
    pub best_objective: f64,
    pub iterations: u64,
    pub converged: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Move {
    Relocate { guest: usize, from: usize, to: usize },
    Swap { a: usize, b: usize },
}

/// Overall score minus a fixed penalty per co-seated conflict pair and,
/// when enabled, per split family pair.
pub fn objective(ctx: &ScoreContext, assignment: &[Option<usize>], family_split_penalty: f64) -> f64 {
    let mut value =
        ctx.evaluate(assignment).overall - CONFLICT_PENALTY * ctx.seated_conflicts(assignment).len() as f64;
    if family_split_penalty > 0.0 {
        value -= family_split_penalty * ctx.split_family_pairs(assignment) as f64;
    }
    value
}

/// Anneal from `start`. Temperature decays linearly with iteration progress,
/// so the acceptance sequence depends only on the RNG and the iteration
/// budget; the deadline only cuts the run short.
pub fn anneal<R, F>(
    ctx: &ScoreContext,
    start: Vec<Option<usize>>,
    params: &SearchParams,
    rng: &mut R,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> SearchRun
where
    R: Rng,
    F: FnMut(f64),
{
    let mut current = start;
    let mut current_objective = objective(ctx, &current, params.family_split_penalty);
    let mut best = current.clone();
    let mut best_objective = current_objective;
    let mut sizes = ctx.table_sizes(&current);

    // A full sweep of proposals without improving the best
    let patience = (ctx.guest_count() * ctx.table_count()).max(200) as u64;
    let mut stale = 0u64;
    let mut iterations = 0u64;
    let mut converged = false;
    let mut cancelled = false;

    on_progress(0.0);
    if ctx.guest_count() < 2 || ctx.table_count() < 2 {
        on_progress(1.0);
        return SearchRun {
            best,
            best_objective,
            iterations,
            converged: true,
            cancelled,
        };
    }

    while iterations < params.max_iterations {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        if Instant::now() >= params.deadline {
            break;
        }

        let progress = iterations as f64 / params.max_iterations as f64;
        let temperature = (params.initial_temperature * (1.0 - progress)).max(1e-9);
        iterations += 1;

        let Some(mv) = propose(ctx, &current, &sizes, rng) else {
            stale += 1;
            if stale >= patience {
                converged = true;
                break;
            }
            continue;
        };
        apply(&mut current, &mut sizes, mv);
        let candidate = objective(ctx, &current, params.family_split_penalty);
        let delta = candidate - current_objective;

        let accept = delta >= 0.0 || rng.gen::<f64>() < (delta / temperature).exp();
        if accept {
            current_objective = candidate;
            if candidate > best_objective + 1e-9 {
                best_objective = candidate;
                best.clone_from(&current);
                stale = 0;
            } else {
                stale += 1;
            }
        } else {
            undo(&mut current, &mut sizes, mv);
            stale += 1;
        }

        if stale >= patience {
            converged = true;
            break;
        }
        if iterations % 64 == 0 {
            on_progress(iterations as f64 / params.max_iterations as f64);
        }
    }
    on_progress(1.0);

    SearchRun {
        best,
        best_objective,
        iterations,
        converged,
        cancelled,
    }
}

fn propose<R: Rng>(
    ctx: &ScoreContext,
    current: &[Option<usize>],
    sizes: &[usize],
    rng: &mut R,
) -> Option<Move> {
    let n = ctx.guest_count();
    let tables = ctx.table_count();
    if n == 0 || tables < 2 {
        return None;
    }
    let guest = rng.gen_range(0..n);
    let from = current[guest]?;

    if rng.gen_bool(0.5) {
        let to = rng.gen_range(0..tables);
        if to != from && sizes[to] < ctx.capacity(to) {
            return Some(Move::Relocate { guest, from, to });
        }
    }
    let other = rng.gen_range(0..n);
    match current[other] {
        Some(t) if t != from => Some(Move::Swap { a: guest, b: other }),
        _ => None,
    }
}

fn apply(current: &mut [Option<usize>], sizes: &mut [usize], mv: Move) {
    match mv {
        Move::Relocate { guest, from, to } => {
            current[guest] = Some(to);
            sizes[from] -= 1;
            sizes[to] += 1;
        }
        Move::Swap { a, b } => current.swap(a, b),
    }
}

fn undo(current: &mut [Option<usize>], sizes: &mut [usize], mv: Move) {
    match mv {
        Move::Relocate { guest, from, to } => apply(current, sizes, Move::Relocate { guest, from: to, to: from }),
        Move::Swap { a, b } => current.swap(a, b),
    }
}

/// Greedily remove co-seated conflict pairs with relocations or swaps that
/// never exceed capacity. Each applied move strictly lowers the conflict
/// count; among those, the one with the best score wins.
pub fn repair_conflicts(ctx: &ScoreContext, assignment: &mut [Option<usize>]) {
    let mut conflicts = ctx.seated_conflicts(assignment).len();
    if conflicts == 0 || ctx.table_count() < 2 {
        return;
    }
    let mut sizes = ctx.table_sizes(assignment);

    while conflicts > 0 {
        let mut involved: Vec<usize> = ctx
            .seated_conflicts(assignment)
            .into_iter()
            .flat_map(|(a, b)| [a, b])
            .collect();
        involved.sort_unstable();
        involved.dedup();

        let mut best: Option<(usize, f64, Move)> = None;
        for &guest in &involved {
            let Some(from) = assignment[guest] else { continue };
            let relocations = (0..ctx.table_count())
                .filter(|t| *t != from && sizes[*t] < ctx.capacity(*t))
                .map(|to| Move::Relocate { guest, from, to });
            let swaps = (0..ctx.guest_count())
                .filter(|other| matches!(assignment[*other], Some(t) if t != from))
                .map(|other| Move::Swap { a: guest, b: other });

            let moves: Vec<Move> = relocations.chain(swaps).collect();
            for mv in moves {
                apply(assignment, &mut sizes, mv);
                let after = ctx.seated_conflicts(assignment).len();
                if after < conflicts {
                    let overall = ctx.evaluate(assignment).overall;
                    let better = match &best {
                        None => true,
                        Some((c, o, _)) => after < *c || (after == *c && overall > *o + 1e-9),
                    };
                    if better {
                        best = Some((after, overall, mv));
                    }
                }
                undo(assignment, &mut sizes, mv);
            }
        }

        match best {
            Some((after, _, mv)) => {
                apply(assignment, &mut sizes, mv);
                conflicts = after;
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::models::Table;
    use crate::graph::{Guest, GuestGraph, GuestId, RelationshipType};
    use crate::scoring::ScoreWeights;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::time::Duration;

    fn params(max_iterations: u64) -> SearchParams {
        SearchParams {
            max_iterations,
            deadline: Instant::now() + Duration::from_secs(30),
            initial_temperature: 2.0,
            family_split_penalty: 0.0,
        }
    }

    fn family_pairs() -> (GuestGraph, Vec<GuestId>) {
        let mut g = GuestGraph::new();
        let mut ids = Vec::new();
        for i in 0..4 {
            let guest = Guest::new(format!("G{}", i), "A");
            ids.push(guest.id);
            g.add_guest(guest).unwrap();
        }
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Family, 0.9)
            .unwrap();
        g.add_or_update_relationship(ids[2], ids[3], RelationshipType::Family, 0.9)
            .unwrap();
        (g, ids)
    }

    #[test]
    fn test_anneal_finds_pairs_from_bad_start() {
        let (g, _) = family_pairs();
        let tables = vec![Table::new("T1", 2), Table::new("T2", 2)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);
        // Pairs split across the tables
        let start = vec![Some(0), Some(1), Some(0), Some(1)];
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let run = anneal(&ctx, start, &params(2_000), &mut rng, &CancellationToken::new(), |_| {});
        assert_eq!(run.best[0], run.best[1]);
        assert_eq!(run.best[2], run.best[3]);
        assert!((ctx.satisfaction(&run.best) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_anneal_never_exceeds_capacity() {
        let (g, _) = family_pairs();
        let tables = vec![Table::new("T1", 3), Table::new("T2", 3)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);
        let start = vec![Some(0), Some(0), Some(0), Some(1)];
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let run = anneal(&ctx, start, &params(1_000), &mut rng, &CancellationToken::new(), |_| {});
        assert!(ctx.table_sizes(&run.best).iter().all(|s| *s <= 3));
        assert_eq!(run.best.iter().flatten().count(), 4);
    }

    #[test]
    fn test_anneal_stops_when_cancelled() {
        let (g, _) = family_pairs();
        let tables = vec![Table::new("T1", 2), Table::new("T2", 2)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let start = vec![Some(0), Some(1), Some(0), Some(1)];
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let run = anneal(&ctx, start.clone(), &params(1_000), &mut rng, &cancel, |_| {});
        assert!(run.cancelled);
        assert_eq!(run.iterations, 0);
        assert_eq!(run.best, start);
    }

    #[test]
    fn test_repair_separates_conflicts_when_room_exists() {
        let mut g = GuestGraph::new();
        let mut ids = Vec::new();
        for i in 0..4 {
            let guest = Guest::new(format!("G{}", i), "A");
            ids.push(guest.id);
            g.add_guest(guest).unwrap();
        }
        g.add_or_update_relationship(ids[0], ids[1], RelationshipType::Conflict, -0.9)
            .unwrap();
        g.add_or_update_relationship(ids[2], ids[3], RelationshipType::Conflict, -0.9)
            .unwrap();
        let tables = vec![Table::new("T1", 2), Table::new("T2", 2)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);

        // Both tables full, both pairs together: only swaps can help
        let mut assignment = vec![Some(0), Some(0), Some(1), Some(1)];
        repair_conflicts(&ctx, &mut assignment);
        assert!(ctx.seated_conflicts(&assignment).is_empty());
        assert!(ctx.table_sizes(&assignment).iter().all(|s| *s <= 2));
    }

    #[test]
    fn test_repair_leaves_impossible_conflicts() {
        let mut g = GuestGraph::new();
        let a = Guest::new("A", "A");
        let b = Guest::new("B", "A");
        let (ia, ib) = (a.id, b.id);
        g.add_guest(a).unwrap();
        g.add_guest(b).unwrap();
        g.add_or_update_relationship(ia, ib, RelationshipType::Conflict, -0.5)
            .unwrap();
        let tables = vec![Table::new("Only", 2)];
        let ctx = ScoreContext::new(&g, &tables, ScoreWeights::default(), 0.0);
        let mut assignment = vec![Some(0), Some(0)];
        repair_conflicts(&ctx, &mut assignment);
        assert_eq!(ctx.seated_conflicts(&assignment).len(), 1);
    }
}
