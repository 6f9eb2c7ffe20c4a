//! Layer search: greedy descent and priority-ordered beam expansion.

use crate::hnsw::graph::NodeSource;
use crate::vector::Vector;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

/// A scored node during search.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Candidate {
    pub distance: f32,
    pub node_id: u64,
}

/// Heap entry for the expansion frontier. Ties on distance pop in
/// insertion order, preserving the reference tie-breaking.
#[derive(Clone, Copy, Debug)]
struct Frontier {
    distance: f32,
    order: u64,
    node_id: u64,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.order == other.order
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.order.cmp(&other.order))
    }
}

/// Greedy 1-best descent on a single layer.
///
/// Starts at `ep` and repeatedly moves to the strictly closest improving
/// neighbor until no neighbor improves. Nonexistent neighbor ids are
/// skipped (post-delete tolerance).
pub(crate) fn search_layer_closest<S: NodeSource + ?Sized>(
    src: &S,
    query: &Vector,
    ep: u64,
    level: u32,
) -> u64 {
    let metric = src.config().metric;
    let Some(start) = src.node(ep) else {
        return ep;
    };
    let mut best = ep;
    let mut best_dist = metric.distance(query, start.vector());
    drop(start);

    loop {
        let Some(current) = src.node(best) else {
            return best;
        };
        let neighbor_ids: Vec<u64> = current.neighbors(level).to_vec();
        drop(current);

        let mut improved = false;
        for id in neighbor_ids {
            let Some(neighbor) = src.node(id) else {
                continue;
            };
            let dist = metric.distance(query, neighbor.vector());
            if dist < best_dist {
                best = id;
                best_dist = dist;
                improved = true;
            }
        }
        if !improved {
            return best;
        }
    }
}

/// Beam search on a single layer.
///
/// Returns up to `ef` candidates sorted ascending by distance. The frontier
/// is expanded closest-first; a neighbor is admitted while the result set
/// is not full, or when it is strictly closer than the current furthest
/// result. Expansion stops once the closest frontier entry is strictly
/// farther than the furthest result and the result set is full.
pub(crate) fn search_layer<S: NodeSource + ?Sized>(
    src: &S,
    query: &Vector,
    ep: u64,
    ef: usize,
    level: u32,
) -> Vec<Candidate> {
    let metric = src.config().metric;
    let mut results: Vec<Candidate> = Vec::new();
    let Some(entry) = src.node(ep) else {
        return results;
    };
    let entry_dist = metric.distance(query, entry.vector());
    drop(entry);

    let mut visited: HashSet<u64> = HashSet::new();
    let mut frontier: BinaryHeap<Reverse<Frontier>> = BinaryHeap::new();
    let mut order: u64 = 0;

    visited.insert(ep);
    frontier.push(Reverse(Frontier {
        distance: entry_dist,
        order,
        node_id: ep,
    }));
    order += 1;
    results.push(Candidate {
        distance: entry_dist,
        node_id: ep,
    });

    while let Some(Reverse(closest)) = frontier.pop() {
        if let Some(furthest) = results.last() {
            if results.len() >= ef && closest.distance > furthest.distance {
                break;
            }
        }

        let Some(node) = src.node(closest.node_id) else {
            continue;
        };
        let neighbor_ids: Vec<u64> = node.neighbors(level).to_vec();
        drop(node);

        for id in neighbor_ids {
            if !visited.insert(id) {
                continue;
            }
            let Some(neighbor) = src.node(id) else {
                continue;
            };
            let dist = metric.distance(query, neighbor.vector());
            drop(neighbor);

            let admit = results.len() < ef
                || results.last().is_some_and(|furthest| dist < furthest.distance);
            if !admit {
                continue;
            }

            frontier.push(Reverse(Frontier {
                distance: dist,
                order,
                node_id: id,
            }));
            order += 1;

            // Insert after equal-distance entries so ties keep arrival order.
            let pos = results.partition_point(|c| c.distance <= dist);
            results.insert(
                pos,
                Candidate {
                    distance: dist,
                    node_id: id,
                },
            );
            if results.len() > ef {
                results.pop();
            }
        }
    }

    results
}

/// Full k-nearest-neighbor search.
///
/// Descends greedily from the top layer to layer 1, beam-searches layer 0
/// with width `ef`, truncates to `k`, recomputes distances, and re-sorts.
/// An empty index yields an empty result.
pub(crate) fn search_knn<S: NodeSource + ?Sized>(
    src: &S,
    query: &Vector,
    k: usize,
    ef: usize,
) -> Vec<Candidate> {
    let (entry, max_level) = src.entry_state();
    let Some(mut ep) = entry else {
        return Vec::new();
    };

    for level in (1..=max_level).rev() {
        ep = search_layer_closest(src, query, ep, level);
    }

    let mut found = search_layer(src, query, ep, ef, 0);
    found.truncate(k);

    let metric = src.config().metric;
    for candidate in &mut found {
        if let Some(node) = src.node(candidate.node_id) {
            candidate.distance = metric.distance(query, node.vector());
        }
    }
    found.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    found
}
