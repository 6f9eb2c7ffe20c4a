//! Neighbor selection and pruning.

use crate::error::IndexError;
use crate::hnsw::graph::{NodeSource, NodeStore};
use crate::hnsw::search::Candidate;
use crate::vector::Vector;
use std::collections::HashSet;

/// Selects up to `m` neighbor ids from pre-sorted candidates.
///
/// The simple strategy takes the first `m`. The heuristic strategy
/// (config `use_heuristic`) optionally extends the pool with the
/// candidates' level-0 neighbors, then admits a candidate only if it is no
/// farther from the query than from every already-selected neighbor — the
/// diversity rule from the HNSW paper. Rejected candidates backfill in
/// distance order when fewer than `m` survive.
pub(crate) fn select_neighbors<S: NodeSource + ?Sized>(
    src: &S,
    query: &Vector,
    candidates: &[Candidate],
    m: usize,
) -> Vec<u64> {
    let config = src.config();
    if !config.use_heuristic {
        return candidates.iter().take(m).map(|c| c.node_id).collect();
    }

    let metric = config.metric;
    let mut pool: Vec<Candidate> = candidates.to_vec();
    if config.extend_candidates {
        let mut seen: HashSet<u64> = candidates.iter().map(|c| c.node_id).collect();
        for candidate in candidates {
            let Some(node) = src.node(candidate.node_id) else {
                continue;
            };
            let extension: Vec<u64> = node.neighbors(0).to_vec();
            drop(node);
            for id in extension {
                if !seen.insert(id) {
                    continue;
                }
                if let Some(neighbor) = src.node(id) {
                    pool.push(Candidate {
                        distance: metric.distance(query, neighbor.vector()),
                        node_id: id,
                    });
                }
            }
        }
    }
    // Stable sort: equal distances keep candidate order.
    pool.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let mut selected: Vec<u64> = Vec::with_capacity(m);
    let mut rejected: Vec<u64> = Vec::new();
    for candidate in &pool {
        if selected.len() >= m {
            break;
        }
        let Some(node) = src.node(candidate.node_id) else {
            continue;
        };
        let mut diverse = true;
        for &chosen in &selected {
            let Some(other) = src.node(chosen) else {
                continue;
            };
            if metric.distance(node.vector(), other.vector()) < candidate.distance {
                diverse = false;
                break;
            }
        }
        if diverse {
            selected.push(candidate.node_id);
        } else {
            rejected.push(candidate.node_id);
        }
    }

    // Backfill with the closest rejected candidates, preserving order.
    for id in rejected {
        if selected.len() >= m {
            break;
        }
        selected.push(id);
    }
    selected
}

/// Prunes a node's neighbor list at `level` back to `m` entries, keeping
/// the `m` closest to the node's own vector. Ties preserve the original
/// list order (stable sort). Dangling ids are dropped along the way.
pub(crate) fn prune_neighbors<S: NodeStore + ?Sized>(
    store: &mut S,
    id: u64,
    level: u32,
    m: usize,
) -> Result<(), IndexError> {
    let (center, current) = {
        let Some(node) = store.node(id) else {
            return Ok(());
        };
        if node.neighbors(level).len() <= m {
            return Ok(());
        }
        (node.vector().clone(), node.neighbors(level).to_vec())
    };

    let metric = store.config().metric;
    let mut scored: Vec<(f32, u64)> = Vec::with_capacity(current.len());
    for neighbor_id in current {
        let Some(neighbor) = store.node(neighbor_id) else {
            continue;
        };
        scored.push((metric.distance(&center, neighbor.vector()), neighbor_id));
    }
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));

    let kept: Vec<u64> = scored.into_iter().take(m).map(|(_, id)| id).collect();
    store.update_node(id, |node| node.set_neighbors(level, kept))?;
    Ok(())
}
