//! Graph mutation: multi-layer insert, deletion with connectivity repair,
//! and entry-point maintenance.
//!
//! These functions are generic over [`NodeStore`] so the in-memory and
//! paged indices share one implementation. Callers hold the writer lock
//! for the whole operation; readers never observe a half-linked node.

use crate::error::IndexError;
use crate::hnsw::config::MAX_LEVEL;
use crate::hnsw::graph::NodeStore;
use crate::hnsw::neighbor::{prune_neighbors, select_neighbors};
use crate::hnsw::node::Node;
use crate::hnsw::search::{search_layer, search_layer_closest};
use crate::vector::Vector;
use rand::Rng;
use std::collections::HashSet;

/// Draws a level from the geometric distribution with parameter `ml`,
/// capped at [`MAX_LEVEL`].
pub(crate) fn draw_level<R: Rng>(rng: &mut R, ml: f64) -> u32 {
    let mut level = 0;
    while rng.gen::<f64>() < ml && level < MAX_LEVEL {
        level += 1;
    }
    level
}

/// Inserts a new node into the graph and links it bidirectionally.
///
/// The caller has already assigned `node_id`, validated the vector's
/// dimension, and drawn `level`.
pub(crate) fn link_node<S: NodeStore + ?Sized>(
    store: &mut S,
    node_id: u64,
    row_id: i64,
    vector: Vector,
    level: u32,
) -> Result<(), IndexError> {
    let (entry, max_level) = store.entry_state();
    let Some(entry_id) = entry else {
        // First node becomes the entry point at its own level.
        store.install_node(Node::new(node_id, row_id, vector, level))?;
        store.set_entry_state(Some(node_id), level)?;
        return Ok(());
    };

    // Phase 1: greedy descent through the layers above the new node.
    let mut ep = entry_id;
    let mut lc = max_level;
    while lc > level {
        ep = search_layer_closest(&*store, &vector, ep, lc);
        lc -= 1;
    }

    // Phase 2: beam search + selection from min(level, max_level) down to 0.
    let top = level.min(max_level);
    let ef = store.config().ef_construction as usize;
    let mut node = Node::new(node_id, row_id, vector, level);
    let mut linked: Vec<(u32, Vec<u64>)> = Vec::with_capacity(top as usize + 1);
    for lc in (0..=top).rev() {
        let candidates = search_layer(&*store, node.vector(), ep, ef, lc);
        let budget = store.config().level_budget(lc) as usize;
        let selected = select_neighbors(&*store, node.vector(), &candidates, budget);
        if let Some(&closest) = selected.first() {
            ep = closest;
        }
        node.set_neighbors(lc, selected.clone());
        linked.push((lc, selected));
    }

    store.install_node(node)?;

    // Phase 3: reverse links, pruning each touched list back to budget.
    for (lc, selected) in linked {
        let budget = store.config().level_budget(lc) as usize;
        for neighbor_id in selected {
            let present = store
                .update_node(neighbor_id, |n| n.add_neighbor(lc, node_id))?
                .is_some();
            if present {
                prune_neighbors(store, neighbor_id, lc, budget)?;
            }
        }
    }

    if level > max_level {
        store.set_entry_state(Some(node_id), level)?;
    }
    Ok(())
}

/// Removes a node, repairing its neighbors' connectivity and maintaining
/// the entry point. Returns `false` if the id was absent.
pub(crate) fn unlink_node<S: NodeStore + ?Sized>(
    store: &mut S,
    node_id: u64,
) -> Result<bool, IndexError> {
    let Some(doomed) = store.node(node_id) else {
        return Ok(false);
    };
    let doomed = doomed.into_owned();

    for level in 0..=doomed.level() {
        let budget = store.config().level_budget(level) as usize;
        for &neighbor_id in doomed.neighbors(level) {
            let removed = store
                .update_node(neighbor_id, |n| n.remove_neighbor(level, node_id))?
                .is_some();
            if removed {
                repair_connectivity(store, neighbor_id, level, budget, node_id)?;
            }
        }
    }

    store.discard_node(node_id)?;

    let (entry, _) = store.entry_state();
    if entry == Some(node_id) {
        // The entry point died: promote the highest remaining node.
        let mut replacement: Option<(u64, u32)> = None;
        for id in store.node_ids() {
            let Some(node) = store.node(id) else {
                continue;
            };
            let level = node.level();
            if replacement.map_or(true, |(_, best)| level > best) {
                replacement = Some((id, level));
            }
        }
        match replacement {
            Some((id, level)) => store.set_entry_state(Some(id), level)?,
            None => store.set_entry_state(None, 0)?,
        }
    }
    Ok(true)
}

/// Reconnects a node left sparse by a deletion.
///
/// Triggered when the list at `level` drops below half its budget. Fresh
/// links come from the neighbors-of-neighbors pool: candidates must not be
/// the node itself, the doomed node, or already connected, and must
/// participate in this level. Closest candidates are wired first,
/// bidirectionally, until the list reaches `budget`.
fn repair_connectivity<S: NodeStore + ?Sized>(
    store: &mut S,
    node_id: u64,
    level: u32,
    budget: usize,
    doomed: u64,
) -> Result<(), IndexError> {
    let (center, current) = {
        let Some(node) = store.node(node_id) else {
            return Ok(());
        };
        if node.neighbors(level).len() >= budget / 2 {
            return Ok(());
        }
        (node.vector().clone(), node.neighbors(level).to_vec())
    };

    let metric = store.config().metric;
    let mut excluded: HashSet<u64> = current.iter().copied().collect();
    excluded.insert(node_id);
    excluded.insert(doomed);

    let mut candidates: Vec<(f32, u64)> = Vec::new();
    for &neighbor_id in &current {
        let Some(neighbor) = store.node(neighbor_id) else {
            continue;
        };
        let second_hop: Vec<u64> = neighbor.neighbors(level).to_vec();
        drop(neighbor);
        for id in second_hop {
            if !excluded.insert(id) {
                continue;
            }
            let Some(candidate) = store.node(id) else {
                continue;
            };
            if candidate.level() < level {
                continue;
            }
            candidates.push((metric.distance(&center, candidate.vector()), id));
        }
    }
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut count = current.len();
    for (_, candidate_id) in candidates {
        if count >= budget {
            break;
        }
        store.update_node(node_id, |n| n.add_neighbor(level, candidate_id))?;
        let present = store
            .update_node(candidate_id, |n| n.add_neighbor(level, node_id))?
            .is_some();
        if present {
            prune_neighbors(store, candidate_id, level, budget)?;
        }
        count += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_draw_level_distribution() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let ml = 1.0 / 16f64.ln();
        let levels: Vec<u32> = (0..2000).map(|_| draw_level(&mut rng, ml)).collect();

        // Level 0 dominates for ml ~ 0.36.
        let zeroes = levels.iter().filter(|&&l| l == 0).count();
        assert!(zeroes > 1000, "level 0 should dominate, got {zeroes}/2000");
        assert!(levels.iter().all(|&l| l <= MAX_LEVEL));
    }

    #[test]
    fn test_draw_level_degenerate_ml() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        // ml = 0 never promotes; ml >= 1 always hits the cap.
        assert_eq!(draw_level(&mut rng, 0.0), 0);
        assert_eq!(draw_level(&mut rng, 1.0), MAX_LEVEL);
    }
}
