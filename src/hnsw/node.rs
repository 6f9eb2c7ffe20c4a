//! Graph node: identity, vector, and per-level neighbor lists.

use crate::vector::Vector;

const EMPTY: &[u64] = &[];

/// A node in the HNSW graph.
///
/// Identity (`node_id`, `row_id`), vector, and level are fixed at
/// construction; only the neighbor lists change afterwards. Neighbors are
/// plain node ids — the graph is an arena keyed by id, never a web of
/// owning pointers (see the deletion tolerance rules in the search module).
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    node_id: u64,
    row_id: i64,
    vector: Vector,
    level: u32,
    /// One list per level, `0..=level`.
    neighbors: Vec<Vec<u64>>,
}

impl Node {
    /// Creates a node participating in levels `0..=level`, all lists empty.
    #[must_use]
    pub fn new(node_id: u64, row_id: i64, vector: Vector, level: u32) -> Self {
        Self {
            node_id,
            row_id,
            vector,
            level,
            neighbors: vec![Vec::new(); level as usize + 1],
        }
    }

    /// Engine-assigned identifier, unique within one index.
    #[must_use]
    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    /// Caller-supplied external key. Not required to be unique.
    #[must_use]
    pub fn row_id(&self) -> i64 {
        self.row_id
    }

    /// The node's vector.
    #[must_use]
    pub fn vector(&self) -> &Vector {
        &self.vector
    }

    /// Top level this node participates in.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Neighbor ids at `level`. Levels above [`Node::level`] are an empty
    /// list, never an error.
    #[must_use]
    pub fn neighbors(&self, level: u32) -> &[u64] {
        self.neighbors
            .get(level as usize)
            .map_or(EMPTY, Vec::as_slice)
    }

    /// Replaces the neighbor list at `level` wholesale.
    ///
    /// Ignored for levels above [`Node::level`].
    pub fn set_neighbors(&mut self, level: u32, ids: Vec<u64>) {
        if let Some(slot) = self.neighbors.get_mut(level as usize) {
            *slot = ids;
        }
    }

    /// Appends `id` at `level` unless already present.
    pub fn add_neighbor(&mut self, level: u32, id: u64) {
        if let Some(slot) = self.neighbors.get_mut(level as usize) {
            if !slot.contains(&id) {
                slot.push(id);
            }
        }
    }

    /// Removes `id` from the list at `level`. Returns whether it was present.
    pub fn remove_neighbor(&mut self, level: u32, id: u64) -> bool {
        if let Some(slot) = self.neighbors.get_mut(level as usize) {
            if let Some(pos) = slot.iter().position(|&n| n == id) {
                slot.remove(pos);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(level: u32) -> Node {
        Node::new(7, -3, Vector::new(&[1.0, 0.0]), level)
    }

    #[test]
    fn test_identity() {
        let n = node(2);
        assert_eq!(n.node_id(), 7);
        assert_eq!(n.row_id(), -3);
        assert_eq!(n.level(), 2);
        assert_eq!(n.vector().data(), &[1.0, 0.0]);
    }

    #[test]
    fn test_neighbors_out_of_range_is_empty() {
        let n = node(1);
        assert!(n.neighbors(0).is_empty());
        assert!(n.neighbors(1).is_empty());
        assert!(n.neighbors(2).is_empty());
        assert!(n.neighbors(u32::MAX).is_empty());
    }

    #[test]
    fn test_set_and_mutate_neighbors() {
        let mut n = node(1);
        n.set_neighbors(0, vec![1, 2, 3]);
        assert_eq!(n.neighbors(0), &[1, 2, 3]);

        n.add_neighbor(0, 4);
        n.add_neighbor(0, 2); // duplicate, ignored
        assert_eq!(n.neighbors(0), &[1, 2, 3, 4]);

        assert!(n.remove_neighbor(0, 2));
        assert!(!n.remove_neighbor(0, 2));
        assert_eq!(n.neighbors(0), &[1, 3, 4]);

        // Writes above the node's level are ignored.
        n.set_neighbors(5, vec![9]);
        assert!(n.neighbors(5).is_empty());
        n.add_neighbor(5, 9);
        assert!(!n.remove_neighbor(5, 9));
    }
}
