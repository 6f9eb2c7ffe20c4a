//! Append-only change log with monotonic sequence numbers.
//!
//! The log records the net history of index mutations for incremental
//! replication and replay. It has its own reader/writer lock, independent
//! of any index lock; every method is atomic on its own.

use crate::vector::Vector;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::mem::size_of;

/// The kind of a logged mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// A vector was inserted.
    Insert,
    /// A row's node was removed.
    Delete,
    /// A row's vector was replaced.
    Update,
}

/// One logged mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Monotonically increasing sequence number, starting at 1.
    pub seq: u64,
    /// What happened.
    pub kind: OperationKind,
    /// Engine-assigned node id the mutation produced or removed.
    pub node_id: u64,
    /// Caller-supplied row key.
    pub row_id: i64,
    /// The new vector for inserts and updates.
    pub vector: Option<Vector>,
    /// The previous vector, updates only.
    pub old_vector: Option<Vector>,
}

struct LogInner {
    ops: Vec<Operation>,
    next_seq: u64,
}

#[derive(Debug)]
struct RowState {
    exists: bool,
    vector: Option<Vector>,
    node_id: u64,
}

/// An append-only operation log.
///
/// Sequence numbers survive [`ChangeLog::clear`]: consumers that captured
/// a sequence via [`ChangeLog::last_seq`] can keep using
/// [`ChangeLog::operations_since`] across clears.
pub struct ChangeLog {
    inner: RwLock<LogInner>,
}

impl ChangeLog {
    /// Creates an empty log. The first recorded operation gets seq 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LogInner {
                ops: Vec::new(),
                next_seq: 1,
            }),
        }
    }

    fn append(&self, build: impl FnOnce(u64) -> Operation) -> u64 {
        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.ops.push(build(seq));
        seq
    }

    /// Records an insert. Returns the assigned sequence number.
    pub fn record_insert(&self, node_id: u64, row_id: i64, vector: &Vector) -> u64 {
        self.append(|seq| Operation {
            seq,
            kind: OperationKind::Insert,
            node_id,
            row_id,
            vector: Some(vector.clone()),
            old_vector: None,
        })
    }

    /// Records a delete. Returns the assigned sequence number.
    pub fn record_delete(&self, node_id: u64, row_id: i64) -> u64 {
        self.append(|seq| Operation {
            seq,
            kind: OperationKind::Delete,
            node_id,
            row_id,
            vector: None,
            old_vector: None,
        })
    }

    /// Records an update with the replaced and replacement vectors.
    /// Returns the assigned sequence number.
    pub fn record_update(&self, node_id: u64, row_id: i64, old: &Vector, new: &Vector) -> u64 {
        self.append(|seq| Operation {
            seq,
            kind: OperationKind::Update,
            node_id,
            row_id,
            vector: Some(new.clone()),
            old_vector: Some(old.clone()),
        })
    }

    /// Number of operations currently held.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.read().ops.len()
    }

    /// Whether the log holds no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().ops.is_empty()
    }

    /// Sequence number of the newest operation, `0` when empty.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.inner.read().ops.last().map_or(0, |op| op.seq)
    }

    /// A copy of every operation, in sequence order.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.inner.read().ops.clone()
    }

    /// Operations with `seq > after`, in original order.
    #[must_use]
    pub fn operations_since(&self, after: u64) -> Vec<Operation> {
        self.inner
            .read()
            .ops
            .iter()
            .filter(|op| op.seq > after)
            .cloned()
            .collect()
    }

    /// Operations with `start < seq <= end`, in original order.
    #[must_use]
    pub fn operations_between(&self, start: u64, end: u64) -> Vec<Operation> {
        self.inner
            .read()
            .ops
            .iter()
            .filter(|op| op.seq > start && op.seq <= end)
            .cloned()
            .collect()
    }

    /// Empties the log without resetting the sequence counter.
    pub fn clear(&self) {
        self.inner.write().ops.clear();
    }

    /// Retains exactly the operations with `seq > before`.
    pub fn truncate_older_than(&self, before: u64) {
        self.inner.write().ops.retain(|op| op.seq > before);
    }

    /// Collapses the log to its net effect per row.
    ///
    /// Each row's history is folded in sequence order; rows whose final
    /// state exists are re-emitted as a single `Insert` carrying the final
    /// vector, in first-touched order, with fresh sequence numbers drawn
    /// from the counter. Rows that ended deleted contribute nothing.
    /// Replaying the compacted log against an empty index of matching
    /// config yields the same `row_id -> vector` bindings as the original.
    /// Compacting twice is a no-op.
    pub fn compact(&self) {
        let mut inner = self.inner.write();
        let before = inner.ops.len();

        let mut rows: IndexMap<i64, RowState> = IndexMap::new();
        for op in &inner.ops {
            let state = rows.entry(op.row_id).or_insert(RowState {
                exists: false,
                vector: None,
                node_id: op.node_id,
            });
            match op.kind {
                OperationKind::Insert => {
                    state.exists = true;
                    state.vector = op.vector.clone();
                    state.node_id = op.node_id;
                }
                OperationKind::Delete => {
                    state.exists = false;
                }
                OperationKind::Update => {
                    if state.exists {
                        state.vector = op.vector.clone();
                    }
                }
            }
        }

        let mut compacted = Vec::new();
        for (row_id, state) in rows {
            if !state.exists {
                continue;
            }
            let Some(vector) = state.vector else {
                continue;
            };
            let seq = inner.next_seq;
            inner.next_seq += 1;
            compacted.push(Operation {
                seq,
                kind: OperationKind::Insert,
                node_id: state.node_id,
                row_id,
                vector: Some(vector),
                old_vector: None,
            });
        }

        log::debug!("change log compacted: {before} ops -> {}", compacted.len());
        inner.ops = compacted;
    }

    /// Estimated heap footprint in bytes.
    ///
    /// Formula: `size_of::<ChangeLog>()` base overhead, plus
    /// `size_of::<Operation>()` per operation, plus `4 * dimension` for
    /// every stored vector (`vector` and `old_vector` counted separately).
    #[must_use]
    pub fn estimate_memory_usage(&self) -> usize {
        let inner = self.inner.read();
        let vectors: usize = inner
            .ops
            .iter()
            .map(|op| {
                op.vector.as_ref().map_or(0, |v| v.dimension() * 4)
                    + op.old_vector.as_ref().map_or(0, |v| v.dimension() * 4)
            })
            .sum();
        size_of::<Self>() + inner.ops.len() * size_of::<Operation>() + vectors
    }
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(values: &[f32]) -> Vector {
        Vector::new(values)
    }

    #[test]
    fn test_sequences_start_at_one() {
        let log = ChangeLog::new();
        assert_eq!(log.last_seq(), 0);
        assert_eq!(log.record_insert(0, 10, &v(&[1.0])), 1);
        assert_eq!(log.record_delete(0, 10), 2);
        assert_eq!(log.last_seq(), 2);
        assert_eq!(log.size(), 2);
    }

    #[test]
    fn test_clear_keeps_counter() {
        let log = ChangeLog::new();
        log.record_insert(0, 1, &v(&[1.0]));
        log.record_insert(1, 2, &v(&[2.0]));
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.last_seq(), 0);
        // The counter survives the clear.
        assert_eq!(log.record_insert(2, 3, &v(&[3.0])), 3);
    }

    #[test]
    fn test_operations_since_and_between() {
        let log = ChangeLog::new();
        for i in 0..5 {
            log.record_insert(i, i as i64, &v(&[i as f32]));
        }
        let since = log.operations_since(3);
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].seq, 4);

        let between = log.operations_between(1, 3);
        assert_eq!(between.len(), 2);
        assert_eq!(between[0].seq, 2);
        assert_eq!(between[1].seq, 3);
    }

    #[test]
    fn test_truncate_older_than() {
        let log = ChangeLog::new();
        for i in 0..4 {
            log.record_insert(i, i as i64, &v(&[0.0]));
        }
        log.truncate_older_than(2);
        let ops = log.operations();
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.seq > 2));
    }

    #[test]
    fn test_compact_collapses_row_history() {
        let log = ChangeLog::new();
        let v1 = v(&[1.0]);
        let v2 = v(&[2.0]);
        let v3 = v(&[3.0]);
        log.record_insert(0, 100, &v1);
        log.record_update(0, 100, &v1, &v2);
        log.record_delete(0, 100);
        log.record_insert(1, 200, &v3);

        log.compact();
        let ops = log.operations();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::Insert);
        assert_eq!(ops[0].row_id, 200);
        assert_eq!(ops[0].vector, Some(v3));
        // Fresh sequence numbers come from the advancing counter.
        assert_eq!(ops[0].seq, 5);
    }

    #[test]
    fn test_compact_is_idempotent() {
        let log = ChangeLog::new();
        let v1 = v(&[1.0]);
        let v2 = v(&[2.0]);
        log.record_insert(0, 1, &v1);
        log.record_update(0, 1, &v1, &v2);
        log.record_insert(1, 2, &v1);

        log.compact();
        let first = log.operations();
        log.compact();
        let second = log.operations();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.row_id, b.row_id);
            assert_eq!(a.vector, b.vector);
        }
    }

    #[test]
    fn test_update_on_deleted_row_is_dropped() {
        let log = ChangeLog::new();
        let v1 = v(&[1.0]);
        let v2 = v(&[2.0]);
        log.record_insert(0, 1, &v1);
        log.record_delete(0, 1);
        // Update after delete has no row to apply to.
        log.record_update(0, 1, &v1, &v2);
        log.compact();
        assert!(log.is_empty());
    }

    #[test]
    fn test_memory_estimate_tracks_vectors() {
        let log = ChangeLog::new();
        let base = log.estimate_memory_usage();
        log.record_insert(0, 1, &v(&[0.0; 16]));
        let one = log.estimate_memory_usage();
        assert_eq!(one, base + size_of::<Operation>() + 64);

        log.record_update(0, 1, &v(&[0.0; 16]), &v(&[1.0; 16]));
        let two = log.estimate_memory_usage();
        assert_eq!(two, one + size_of::<Operation>() + 128);
    }
}
