//! Capabilities the graph algorithms operate through, and the common
//! index surface.
//!
//! The search, neighbor-selection, and mutation algorithms are free
//! functions generic over these traits. The in-memory core hands out
//! borrowed nodes; the paged core
//! materializes owned copies from pages through its cache. Neither
//! implementation lets a missing id surface as an error — readers skip
//! dangling references left behind by deletion.

use crate::error::IndexError;
use crate::hnsw::config::HnswConfig;
use crate::hnsw::node::Node;
use crate::vector::Vector;
use std::borrow::Cow;

/// Read access to the node arena.
pub trait NodeSource {
    /// The index configuration.
    fn config(&self) -> &HnswConfig;

    /// Looks up a node by id. `None` for ids that do not resolve, including
    /// dangling neighbor references and pages that fail to read.
    fn node(&self, id: u64) -> Option<Cow<'_, Node>>;

    /// Current entry point and maximum level. The entry point is `Some`
    /// iff the index is non-empty.
    fn entry_state(&self) -> (Option<u64>, u32);
}

/// Mutable access to the node arena, used by insert/delete.
pub(crate) trait NodeStore: NodeSource {
    /// Installs a fully built node.
    fn install_node(&mut self, node: Node) -> Result<(), IndexError>;

    /// Removes a node. Returns `false` if the id was absent.
    fn discard_node(&mut self, id: u64) -> Result<bool, IndexError>;

    /// Applies `apply` to the node and persists the result. `Ok(None)` when
    /// the id does not resolve.
    fn update_node<F, R>(&mut self, id: u64, apply: F) -> Result<Option<R>, IndexError>
    where
        F: FnOnce(&mut Node) -> R;

    /// Updates the entry point and maximum level together.
    fn set_entry_state(&mut self, entry: Option<u64>, max_level: u32) -> Result<(), IndexError>;

    /// All live node ids, in no particular order.
    fn node_ids(&self) -> Vec<u64>;
}

/// One result of a k-nearest-neighbor search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchHit {
    /// The caller-supplied key of the matching node.
    pub row_id: i64,
    /// Distance from the query under the configured metric.
    pub distance: f32,
}

/// The surface shared by the in-memory and paged indices.
///
/// The incremental wrapper composes over anything implementing this trait.
/// Mutating calls return the identity the change log needs (`delete`
/// returns the removed node id, `delete_by_node_id` the removed row id)
/// instead of a bare `bool`; `is_some()` recovers the boolean answer.
pub trait VectorIndex {
    /// Inserts a vector under `row_id` and returns the assigned node id.
    ///
    /// # Errors
    ///
    /// [`IndexError::DimensionMismatch`] if the vector does not match the
    /// configured dimension; pager errors for the paged index.
    fn insert(&self, row_id: i64, vector: Vector) -> Result<u64, IndexError>;

    /// Deletes the first node carrying `row_id` (ascending node-id order).
    /// Returns the removed node id, or `None` if no node matched.
    fn delete(&self, row_id: i64) -> Option<u64>;

    /// Deletes a node by its engine-assigned id. Returns the removed
    /// node's row id, or `None` if the id was absent.
    fn delete_by_node_id(&self, node_id: u64) -> Option<i64>;

    /// Replaces the vector stored under `row_id` (delete + insert).
    /// Returns `Ok(None)` when the row did not exist, otherwise the newly
    /// assigned node id.
    ///
    /// # Errors
    ///
    /// Dimension mismatch is detected before anything is deleted. A pager
    /// failure between delete and re-insert leaves the row deleted and
    /// surfaces the error.
    fn update(&self, row_id: i64, vector: Vector) -> Result<Option<u64>, IndexError>;

    /// Searches for the `k` nearest neighbors using the configured
    /// `ef_search`.
    ///
    /// # Errors
    ///
    /// [`IndexError::DimensionMismatch`] if the query dimension is wrong.
    /// An empty index yields an empty result, not an error.
    fn search_knn(&self, query: &Vector, k: usize) -> Result<Vec<SearchHit>, IndexError>;

    /// Searches with an explicit beam width `ef`.
    ///
    /// # Errors
    ///
    /// Same as [`VectorIndex::search_knn`].
    fn search_knn_with_ef(
        &self,
        query: &Vector,
        k: usize,
        ef: usize,
    ) -> Result<Vec<SearchHit>, IndexError>;

    /// Returns the vector stored under `row_id`, if any (first match in
    /// ascending node-id order).
    fn get_by_row_id(&self, row_id: i64) -> Option<Vector>;

    /// Whether any node carries `row_id`.
    fn contains(&self, row_id: i64) -> bool;

    /// Number of live nodes.
    fn len(&self) -> usize;

    /// Whether the index holds no nodes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured vector dimension.
    fn dimension(&self) -> u32;

    /// A copy of the configuration.
    fn config(&self) -> HnswConfig;
}
