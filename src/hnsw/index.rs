//! In-memory HNSW index.

use crate::error::IndexError;
use crate::hnsw::config::HnswConfig;
use crate::hnsw::graph::{NodeSource, NodeStore, SearchHit, VectorIndex};
use crate::hnsw::insert::{draw_level, link_node, unlink_node};
use crate::hnsw::node::Node;
use crate::hnsw::search;
use crate::persistence::stream::{
    decode_header, decode_node, encode_header, encode_node, ByteReader,
};
use crate::vector::Vector;
use parking_lot::RwLock;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::borrow::Cow;
use std::collections::HashMap;

/// Seed for the level-draw RNG. Tests never rely on specific draws.
pub(crate) const LEVEL_SEED: u64 = 0x9E37_79B9;

/// Mutable index state, guarded by the index's reader/writer lock.
#[derive(Debug)]
pub(crate) struct MemCore {
    config: HnswConfig,
    nodes: HashMap<u64, Node>,
    entry: Option<u64>,
    max_level: u32,
    next_id: u64,
    rng: ChaCha8Rng,
}

impl MemCore {
    fn new(config: HnswConfig) -> Self {
        Self {
            config,
            nodes: HashMap::new(),
            entry: None,
            max_level: 0,
            next_id: 0,
            rng: ChaCha8Rng::seed_from_u64(LEVEL_SEED),
        }
    }

    /// First node carrying `row_id`, in ascending node-id order.
    fn find_row(&self, row_id: i64) -> Option<u64> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.row_id() == row_id)
            .map(|(&id, _)| id)
            .min()
    }
}

impl NodeSource for MemCore {
    fn config(&self) -> &HnswConfig {
        &self.config
    }

    fn node(&self, id: u64) -> Option<Cow<'_, Node>> {
        self.nodes.get(&id).map(Cow::Borrowed)
    }

    fn entry_state(&self) -> (Option<u64>, u32) {
        (self.entry, self.max_level)
    }
}

impl NodeStore for MemCore {
    fn install_node(&mut self, node: Node) -> Result<(), IndexError> {
        self.nodes.insert(node.node_id(), node);
        Ok(())
    }

    fn discard_node(&mut self, id: u64) -> Result<bool, IndexError> {
        Ok(self.nodes.remove(&id).is_some())
    }

    fn update_node<F, R>(&mut self, id: u64, apply: F) -> Result<Option<R>, IndexError>
    where
        F: FnOnce(&mut Node) -> R,
    {
        Ok(self.nodes.get_mut(&id).map(apply))
    }

    fn set_entry_state(&mut self, entry: Option<u64>, max_level: u32) -> Result<(), IndexError> {
        self.entry = entry;
        self.max_level = max_level;
        Ok(())
    }

    fn node_ids(&self) -> Vec<u64> {
        self.nodes.keys().copied().collect()
    }
}

/// An in-memory HNSW index.
///
/// All mutable state sits behind a reader/writer lock: reads
/// (`search_knn`, `len`, `serialize`, ...) run concurrently, mutations are
/// exclusive for their full duration, so a concurrent search observes
/// either the pre- or post-state of a whole insert or delete.
///
/// # Example
///
/// ```rust
/// use proxima::{HnswIndex, Vector, VectorIndex};
///
/// let index = HnswIndex::new(3);
/// index.insert(1, Vector::new(&[1.0, 0.0, 0.0])).unwrap();
/// index.insert(2, Vector::new(&[0.0, 1.0, 0.0])).unwrap();
///
/// let hits = index.search_knn(&Vector::new(&[1.0, 0.0, 0.0]), 1).unwrap();
/// assert_eq!(hits[0].row_id, 1);
/// ```
#[derive(Debug)]
pub struct HnswIndex {
    inner: RwLock<MemCore>,
}

impl HnswIndex {
    /// Creates an empty index with the default configuration for
    /// `dimension`.
    #[must_use]
    pub fn new(dimension: u32) -> Self {
        Self::with_config(HnswConfig::new(dimension))
    }

    /// Creates an empty index with an explicit configuration.
    #[must_use]
    pub fn with_config(config: HnswConfig) -> Self {
        Self {
            inner: RwLock::new(MemCore::new(config)),
        }
    }

    /// Serializes the whole index to the version-1 stream format.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let guard = self.inner.read();
        let core = &*guard;
        let mut buf = Vec::new();
        encode_header(
            &mut buf,
            &core.config,
            core.entry,
            core.max_level,
            core.next_id,
            core.nodes.len() as u64,
        );
        for node in core.nodes.values() {
            encode_node(&mut buf, node);
        }
        buf
    }

    /// Reconstructs an index from [`HnswIndex::serialize`] output.
    ///
    /// Version 1 streams do not carry the distance metric; the decoded
    /// config uses the default (cosine).
    ///
    /// # Errors
    ///
    /// [`IndexError::InvalidMagic`], [`IndexError::InvalidVersion`], or
    /// [`IndexError::CorruptedData`] for malformed input.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut reader = ByteReader::new(bytes);
        let header = decode_header(&mut reader)?;

        // Bounded pre-allocation: a hostile node count fails on decode,
        // not on reserve.
        let mut nodes = HashMap::with_capacity(header.node_count.min(65_536) as usize);
        for _ in 0..header.node_count {
            let node = decode_node(&mut reader)?;
            nodes.insert(node.node_id(), node);
        }
        if nodes.len() as u64 != header.node_count {
            return Err(IndexError::CorruptedData(format!(
                "stream declares {} nodes but {} unique ids decoded",
                header.node_count,
                nodes.len()
            )));
        }

        let entry = if nodes.is_empty() {
            None
        } else {
            if !nodes.contains_key(&header.entry_point) {
                return Err(IndexError::CorruptedData(format!(
                    "entry point {} is not a decoded node",
                    header.entry_point
                )));
            }
            Some(header.entry_point)
        };

        let mut core = MemCore::new(header.config);
        core.nodes = nodes;
        core.entry = entry;
        core.max_level = if entry.is_some() { header.max_level } else { 0 };
        core.next_id = header.next_id;
        Ok(Self {
            inner: RwLock::new(core),
        })
    }

    fn check_dimension(config: &HnswConfig, vector: &Vector) -> Result<(), IndexError> {
        if vector.dimension() != config.dimension as usize {
            return Err(IndexError::DimensionMismatch {
                expected: config.dimension as usize,
                actual: vector.dimension(),
            });
        }
        Ok(())
    }
}

impl VectorIndex for HnswIndex {
    fn insert(&self, row_id: i64, vector: Vector) -> Result<u64, IndexError> {
        let mut guard = self.inner.write();
        let core = &mut *guard;
        Self::check_dimension(&core.config, &vector)?;

        let node_id = core.next_id;
        core.next_id += 1;
        let level = draw_level(&mut core.rng, core.config.ml);
        link_node(core, node_id, row_id, vector, level)?;
        Ok(node_id)
    }

    fn delete(&self, row_id: i64) -> Option<u64> {
        let mut guard = self.inner.write();
        let core = &mut *guard;
        let node_id = core.find_row(row_id)?;
        // In-memory unlink cannot fail.
        match unlink_node(core, node_id) {
            Ok(true) => Some(node_id),
            _ => None,
        }
    }

    fn delete_by_node_id(&self, node_id: u64) -> Option<i64> {
        let mut guard = self.inner.write();
        let core = &mut *guard;
        let row_id = core.nodes.get(&node_id)?.row_id();
        match unlink_node(core, node_id) {
            Ok(true) => Some(row_id),
            _ => None,
        }
    }

    fn update(&self, row_id: i64, vector: Vector) -> Result<Option<u64>, IndexError> {
        let mut guard = self.inner.write();
        let core = &mut *guard;
        Self::check_dimension(&core.config, &vector)?;

        let Some(target) = core.find_row(row_id) else {
            return Ok(None);
        };
        unlink_node(core, target)?;

        let node_id = core.next_id;
        core.next_id += 1;
        let level = draw_level(&mut core.rng, core.config.ml);
        link_node(core, node_id, row_id, vector, level)?;
        Ok(Some(node_id))
    }

    fn search_knn(&self, query: &Vector, k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let ef = self.inner.read().config.ef_search as usize;
        self.search_knn_with_ef(query, k, ef)
    }

    fn search_knn_with_ef(
        &self,
        query: &Vector,
        k: usize,
        ef: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let guard = self.inner.read();
        let core = &*guard;
        Self::check_dimension(&core.config, query)?;

        let found = search::search_knn(core, query, k, ef);
        Ok(found
            .into_iter()
            .filter_map(|c| {
                core.nodes.get(&c.node_id).map(|node| SearchHit {
                    row_id: node.row_id(),
                    distance: c.distance,
                })
            })
            .collect())
    }

    fn get_by_row_id(&self, row_id: i64) -> Option<Vector> {
        let guard = self.inner.read();
        let core = &*guard;
        let id = core.find_row(row_id)?;
        core.nodes.get(&id).map(|n| n.vector().clone())
    }

    fn contains(&self, row_id: i64) -> bool {
        self.inner.read().find_row(row_id).is_some()
    }

    fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    fn dimension(&self) -> u32 {
        self.inner.read().config.dimension
    }

    fn config(&self) -> HnswConfig {
        self.inner.read().config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(values: &[f32]) -> Vector {
        let mut v = Vector::new(values);
        v.normalize();
        v
    }

    #[test]
    fn test_empty_index() {
        let index = HnswIndex::new(3);
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 3);
        let hits = index.search_knn(&unit(&[1.0, 0.0, 0.0]), 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_insert_assigns_monotonic_node_ids() {
        let index = HnswIndex::new(2);
        let a = index.insert(10, unit(&[1.0, 0.0])).unwrap();
        let b = index.insert(20, unit(&[0.0, 1.0])).unwrap();
        assert!(b > a);
        assert_eq!(index.len(), 2);
        assert!(index.contains(10));
        assert!(index.contains(20));
        assert!(!index.contains(30));
    }

    #[test]
    fn test_node_ids_not_reused_after_delete() {
        let index = HnswIndex::new(2);
        let a = index.insert(1, unit(&[1.0, 0.0])).unwrap();
        assert_eq!(index.delete(1), Some(a));
        let b = index.insert(1, unit(&[1.0, 0.0])).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = HnswIndex::new(3);
        let err = index.insert(1, Vector::new(&[1.0, 0.0])).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, actual: 2 }));

        index.insert(1, unit(&[1.0, 0.0, 0.0])).unwrap();
        let err = index.search_knn(&Vector::new(&[1.0]), 1).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_delete_missing_row() {
        let index = HnswIndex::new(2);
        assert_eq!(index.delete(99), None);
        assert_eq!(index.delete_by_node_id(99), None);
    }

    #[test]
    fn test_update_missing_row_is_ok_none() {
        let index = HnswIndex::new(2);
        assert!(index.update(5, unit(&[1.0, 0.0])).unwrap().is_none());

        // Dimension is validated before the row lookup.
        let err = index.update(5, Vector::new(&[1.0])).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_update_replaces_vector() {
        let index = HnswIndex::new(2);
        index.insert(5, unit(&[1.0, 0.0])).unwrap();
        let new_id = index.update(5, unit(&[0.0, 1.0])).unwrap();
        assert!(new_id.is_some());
        assert_eq!(index.len(), 1);
        let stored = index.get_by_row_id(5).unwrap();
        assert!((stored.data()[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_get_by_row_id_first_match() {
        let index = HnswIndex::new(2);
        index.insert(7, unit(&[1.0, 0.0])).unwrap();
        index.insert(7, unit(&[0.0, 1.0])).unwrap();
        // Duplicate row ids: the scan returns the earliest node.
        let got = index.get_by_row_id(7).unwrap();
        assert!((got.data()[0] - 1.0).abs() < 1e-6);
        assert_eq!(index.len(), 2);
    }
}
