//! Incremental index: checkpoints, deltas, and compacted replay.

use proxima::{HnswIndex, IncrementalIndex, OperationKind, Vector, VectorIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_unit_vectors(count: usize, seed: u64) -> Vec<Vector> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let raw: [f32; 3] = [
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ];
            let mut v = Vector::new(&raw);
            v.normalize();
            v
        })
        .collect()
}

#[test]
fn test_incremental_matches_full_rebuild() {
    let points = random_unit_vectors(15, 31);

    let full = HnswIndex::new(3);
    let incremental = IncrementalIndex::new(HnswIndex::new(3));
    for (i, point) in points.iter().take(10).enumerate() {
        full.insert(i as i64, point.clone()).unwrap();
        incremental.insert(i as i64, point.clone()).unwrap();
    }

    let query = &points[2];
    let a = full.search_knn(query, 3).unwrap();
    let b = incremental.search_knn(query, 3).unwrap();
    assert_eq!(a[0].row_id, b[0].row_id);

    // Checkpoint, then grow the incremental index by five vectors.
    let checkpoint = incremental.create_checkpoint();
    assert_eq!(checkpoint.version, 10);
    assert_eq!(checkpoint.node_count, 10);

    for (i, point) in points.iter().enumerate().skip(10) {
        incremental.insert(i as i64, point.clone()).unwrap();
    }

    let delta = incremental.operations_since(checkpoint.version);
    assert_eq!(delta.len(), 5);
    assert!(delta.iter().all(|op| op.kind == OperationKind::Insert));

    // A third index that already holds the first ten catches up via the
    // delta alone.
    let follower = IncrementalIndex::new(HnswIndex::new(3));
    for (i, point) in points.iter().take(10).enumerate() {
        follower.insert(i as i64, point.clone()).unwrap();
    }
    let applied = follower.apply_delta(&delta).unwrap();
    assert_eq!(applied, 5);
    assert_eq!(follower.len(), incremental.len());

    let b_top = incremental.search_knn(query, 3).unwrap();
    let f_top = follower.search_knn(query, 3).unwrap();
    let b_rows: Vec<i64> = b_top.iter().map(|h| h.row_id).collect();
    let f_rows: Vec<i64> = f_top.iter().map(|h| h.row_id).collect();
    assert_eq!(b_rows, f_rows);
}

#[test]
fn test_operations_between_slices_history() {
    let index = IncrementalIndex::new(HnswIndex::new(3));
    for (i, point) in random_unit_vectors(8, 5).into_iter().enumerate() {
        index.insert(i as i64, point).unwrap();
    }

    let middle = index.operations_between(2, 5);
    assert_eq!(middle.len(), 3);
    assert_eq!(middle[0].seq, 3);
    assert_eq!(middle[2].seq, 5);

    // Both bounds outside the history: empty slice, not a panic.
    assert!(index.operations_between(100, 200).is_empty());
}

#[test]
fn test_compacted_log_replays_to_same_bindings() {
    let points = random_unit_vectors(8, 17);
    let source = IncrementalIndex::new(HnswIndex::new(3));
    for (i, point) in points.iter().take(6).enumerate() {
        source.insert(i as i64, point.clone()).unwrap();
    }
    source.update(1, points[6].clone()).unwrap();
    source.delete(2);
    source.delete(3);
    source.insert(10, points[7].clone()).unwrap();

    let full_ops = source.change_log().operations();
    source.change_log().compact();
    let compacted_ops = source.change_log().operations();
    assert!(compacted_ops.len() < full_ops.len());
    assert!(compacted_ops
        .iter()
        .all(|op| op.kind == OperationKind::Insert));

    let from_full = IncrementalIndex::new(HnswIndex::new(3));
    from_full.apply_delta(&full_ops).unwrap();
    let from_compacted = IncrementalIndex::new(HnswIndex::new(3));
    from_compacted.apply_delta(&compacted_ops).unwrap();

    assert_eq!(from_full.len(), from_compacted.len());
    for row in [0i64, 1, 4, 5, 10] {
        let a = from_full.get_by_row_id(row).expect("row missing");
        let b = from_compacted.get_by_row_id(row).expect("row missing");
        assert_eq!(a, b, "row {row} diverged");
    }
    for row in [2i64, 3] {
        assert!(!from_full.contains(row));
        assert!(!from_compacted.contains(row));
    }
}

#[test]
fn test_checkpoint_history_is_append_only() {
    let index = IncrementalIndex::new(HnswIndex::new(3));
    let points = random_unit_vectors(4, 23);

    let c0 = index.create_checkpoint();
    index.insert(1, points[0].clone()).unwrap();
    let c1 = index.create_checkpoint();
    index.insert(2, points[1].clone()).unwrap();
    index.clear_pending_changes();
    let c2 = index.create_checkpoint();

    let history = index.checkpoint_history();
    assert_eq!(history, vec![c0, c1, c2]);
    assert_eq!(c0.version, 0);
    assert_eq!(c1.version, 1);
    // Clearing the log empties it; last_seq reports 0 again, but the
    // next record resumes past the old sequences.
    assert_eq!(c2.version, 0);
    index.insert(3, points[2].clone()).unwrap();
    assert_eq!(index.change_log().last_seq(), 3);
}
