//! Incremental index: a change log layered over any backing index.

use crate::changelog::{ChangeLog, Operation, OperationKind};
use crate::error::IndexError;
use crate::hnsw::config::HnswConfig;
use crate::hnsw::graph::{SearchHit, VectorIndex};
use crate::vector::Vector;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A named point in the change-log history.
///
/// Checkpoints are append-only and never invalidated by later changes;
/// `version` is the log sequence at creation time and anchors future
/// delta extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Change-log sequence number at checkpoint time.
    pub version: u64,
    /// Unix timestamp (seconds) of creation.
    pub timestamp: i64,
    /// Nodes held by the index at checkpoint time.
    pub node_count: usize,
}

/// A checkpoint without the timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Change-log sequence number at snapshot time.
    pub version: u64,
    /// Nodes held by the index at snapshot time.
    pub node_count: usize,
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

/// Wraps a backing index and mirrors every successful mutation into a
/// [`ChangeLog`].
///
/// Reads delegate straight through. Mutations run against the backing
/// index first and are recorded only when they succeed. The `version`
/// counter counts attempted mutations (including failed ones) and is
/// distinct from the log's sequence numbers.
///
/// A mutating call is atomic on the backing index, but the wrapper's
/// log append is a separate step; callers interleaving mutations from
/// multiple threads get per-call atomicity, not cross-call ordering
/// between the index and the log.
///
/// # Example
///
/// ```rust
/// use proxima::{HnswIndex, IncrementalIndex, Vector, VectorIndex};
///
/// let index = IncrementalIndex::new(HnswIndex::new(2));
/// index.insert(1, Vector::new(&[1.0, 0.0])).unwrap();
/// index.insert(2, Vector::new(&[0.0, 1.0])).unwrap();
///
/// let checkpoint = index.create_checkpoint();
/// index.insert(3, Vector::new(&[0.5, 0.5])).unwrap();
///
/// let delta = index.operations_since(checkpoint.version);
/// assert_eq!(delta.len(), 1);
/// ```
pub struct IncrementalIndex<I: VectorIndex> {
    index: I,
    log: ChangeLog,
    version: AtomicU64,
    checkpoints: RwLock<Vec<Checkpoint>>,
}

impl<I: VectorIndex> IncrementalIndex<I> {
    /// Wraps a backing index with an empty change log.
    #[must_use]
    pub fn new(index: I) -> Self {
        Self {
            index,
            log: ChangeLog::new(),
            version: AtomicU64::new(0),
            checkpoints: RwLock::new(Vec::new()),
        }
    }

    /// Borrows the backing index.
    pub fn index(&self) -> &I {
        &self.index
    }

    /// Borrows the change log.
    #[must_use]
    pub fn change_log(&self) -> &ChangeLog {
        &self.log
    }

    /// Unwraps the backing index, discarding the log.
    pub fn into_inner(self) -> I {
        self.index
    }

    /// Count of attempted mutations since construction. Failed attempts
    /// count too; this is not the log sequence.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Current log sequence and node count.
    #[must_use]
    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            version: self.log.last_seq(),
            node_count: self.index.len(),
        }
    }

    /// Creates a timestamped checkpoint and appends it to the history.
    pub fn create_checkpoint(&self) -> Checkpoint {
        let checkpoint = Checkpoint {
            version: self.log.last_seq(),
            timestamp: unix_timestamp(),
            node_count: self.index.len(),
        };
        self.checkpoints.write().push(checkpoint);
        checkpoint
    }

    /// Every checkpoint taken so far, oldest first.
    #[must_use]
    pub fn checkpoint_history(&self) -> Vec<Checkpoint> {
        self.checkpoints.read().clone()
    }

    /// Logged operations with `seq > after`.
    #[must_use]
    pub fn operations_since(&self, after: u64) -> Vec<Operation> {
        self.log.operations_since(after)
    }

    /// Logged operations with `start < seq <= end`.
    #[must_use]
    pub fn operations_between(&self, start: u64, end: u64) -> Vec<Operation> {
        self.log.operations_between(start, end)
    }

    /// Replays a slice of operations against the backing index.
    ///
    /// Sequence numbers are ignored — the caller is responsible for
    /// passing a coherent slice. Inserts and updates without a vector are
    /// skipped. Replayed operations are not re-logged. Returns the number
    /// of operations actually applied.
    ///
    /// # Errors
    ///
    /// The first failing operation aborts the delta and surfaces its
    /// error; earlier operations stay applied.
    pub fn apply_delta(&self, ops: &[Operation]) -> Result<usize, IndexError> {
        let mut applied = 0;
        for op in ops {
            match op.kind {
                OperationKind::Insert => {
                    let Some(vector) = &op.vector else {
                        log::debug!("delta: skipping insert of row {} without vector", op.row_id);
                        continue;
                    };
                    self.index.insert(op.row_id, vector.clone())?;
                }
                OperationKind::Delete => {
                    self.index.delete(op.row_id);
                }
                OperationKind::Update => {
                    let Some(vector) = &op.vector else {
                        log::debug!("delta: skipping update of row {} without vector", op.row_id);
                        continue;
                    };
                    self.index.update(op.row_id, vector.clone())?;
                }
            }
            applied += 1;
        }
        Ok(applied)
    }

    /// Empties the change log. The sequence counter keeps advancing.
    pub fn clear_pending_changes(&self) {
        self.log.clear();
    }
}

impl<I: VectorIndex> VectorIndex for IncrementalIndex<I> {
    fn insert(&self, row_id: i64, vector: Vector) -> Result<u64, IndexError> {
        self.version.fetch_add(1, Ordering::SeqCst);
        let node_id = self.index.insert(row_id, vector.clone())?;
        self.log.record_insert(node_id, row_id, &vector);
        Ok(node_id)
    }

    fn delete(&self, row_id: i64) -> Option<u64> {
        self.version.fetch_add(1, Ordering::SeqCst);
        let node_id = self.index.delete(row_id)?;
        self.log.record_delete(node_id, row_id);
        Some(node_id)
    }

    fn delete_by_node_id(&self, node_id: u64) -> Option<i64> {
        self.version.fetch_add(1, Ordering::SeqCst);
        let row_id = self.index.delete_by_node_id(node_id)?;
        self.log.record_delete(node_id, row_id);
        Some(row_id)
    }

    fn update(&self, row_id: i64, vector: Vector) -> Result<Option<u64>, IndexError> {
        self.version.fetch_add(1, Ordering::SeqCst);
        let old = self.index.get_by_row_id(row_id);
        let result = self.index.update(row_id, vector.clone())?;
        if let (Some(node_id), Some(old)) = (result, old) {
            self.log.record_update(node_id, row_id, &old, &vector);
        }
        Ok(result)
    }

    fn search_knn(&self, query: &Vector, k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.index.search_knn(query, k)
    }

    fn search_knn_with_ef(
        &self,
        query: &Vector,
        k: usize,
        ef: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.index.search_knn_with_ef(query, k, ef)
    }

    fn get_by_row_id(&self, row_id: i64) -> Option<Vector> {
        self.index.get_by_row_id(row_id)
    }

    fn contains(&self, row_id: i64) -> bool {
        self.index.contains(row_id)
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn dimension(&self) -> u32 {
        self.index.dimension()
    }

    fn config(&self) -> HnswConfig {
        self.index.config()
    }
}
