//! Property tests for graph invariants.
//!
//! The serialized stream is the ground truth: tests decode it with the
//! documented layout and check the structural invariants hold after every
//! kind of mutation.

use proptest::prelude::*;
use proxima::{HnswIndex, Vector, VectorIndex};
use std::collections::HashMap;

struct NodeRec {
    level: u32,
    neighbors: Vec<Vec<u64>>,
}

struct StreamState {
    m: u32,
    m_max0: u32,
    entry_point: u64,
    max_level: u32,
    next_id: u64,
    nodes: HashMap<u64, NodeRec>,
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> u64 {
    let v = u64::from_le_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    v
}

/// Decodes the version-1 stream layout.
fn parse_stream(bytes: &[u8]) -> StreamState {
    let mut pos = 0;
    assert_eq!(read_u32(bytes, &mut pos), 0x4853_5748, "magic");
    assert_eq!(read_u32(bytes, &mut pos), 1, "version");
    let m = read_u32(bytes, &mut pos);
    let m_max0 = read_u32(bytes, &mut pos);
    let _ef_construction = read_u32(bytes, &mut pos);
    let _ef_search = read_u32(bytes, &mut pos);
    let _dimension = read_u32(bytes, &mut pos);
    pos += 8; // ml
    let entry_point = read_u64(bytes, &mut pos);
    let max_level = read_u32(bytes, &mut pos);
    let next_id = read_u64(bytes, &mut pos);
    let node_count = read_u64(bytes, &mut pos);
    pos += 8; // flags + reserved

    let mut nodes = HashMap::new();
    for _ in 0..node_count {
        let node_id = read_u64(bytes, &mut pos);
        let _row_id = read_u64(bytes, &mut pos);
        let level = read_u32(bytes, &mut pos);
        let vec_len = read_u32(bytes, &mut pos) as usize;
        pos += vec_len;

        let mut neighbors = Vec::with_capacity(level as usize + 1);
        for _ in 0..=level {
            let count = read_u32(bytes, &mut pos) as usize;
            let mut ids = Vec::with_capacity(count);
            for _ in 0..count {
                ids.push(read_u64(bytes, &mut pos));
            }
            neighbors.push(ids);
        }
        nodes.insert(node_id, NodeRec { level, neighbors });
    }
    assert_eq!(pos, bytes.len(), "stream fully consumed");

    StreamState {
        m,
        m_max0,
        entry_point,
        max_level,
        next_id,
        nodes,
    }
}

/// Checks every structural invariant the index promises after a completed
/// mutation.
fn check_invariants(index: &HnswIndex) {
    let state = parse_stream(&index.serialize());
    assert_eq!(state.nodes.len(), index.len(), "len == node count");
    if state.nodes.is_empty() {
        return;
    }

    assert!(
        state.nodes.contains_key(&state.entry_point),
        "entry point {} is live",
        state.entry_point
    );
    let top = state.nodes.values().map(|n| n.level).max().unwrap();
    assert_eq!(state.max_level, top, "max level tracks the highest node");
    let max_id = state.nodes.keys().max().unwrap();
    assert!(state.next_id > *max_id, "next id beyond every live id");
    assert_eq!(
        state.nodes[&state.entry_point].level,
        state.max_level,
        "entry point sits at the top level"
    );

    for (id, node) in &state.nodes {
        assert_eq!(node.neighbors.len() as u32, node.level + 1);
        for (level, list) in node.neighbors.iter().enumerate() {
            let budget = if level == 0 { state.m_max0 } else { state.m };
            assert!(
                list.len() <= budget as usize,
                "node {id} level {level} holds {} > {budget}",
                list.len()
            );
            for neighbor in list {
                assert!(
                    state.nodes.contains_key(neighbor),
                    "node {id} references dead neighbor {neighbor} at level {level}"
                );
                assert_ne!(neighbor, id, "node {id} is its own neighbor");
            }
        }
    }
}

fn unit_vector(raw: &[f32]) -> Vector {
    let mut v = Vector::new(raw);
    v.normalize();
    v
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_insert_preserves_invariants(
        vectors in prop::collection::vec(
            prop::collection::vec(-10.0f32..10.0, 4),
            1..40
        ),
    ) {
        let index = HnswIndex::new(4);
        for (i, raw) in vectors.iter().enumerate() {
            index.insert(i as i64, unit_vector(raw)).unwrap();
        }
        check_invariants(&index);
    }

    #[test]
    fn prop_delete_preserves_invariants(
        vectors in prop::collection::vec(
            prop::collection::vec(-10.0f32..10.0, 4),
            5..30
        ),
        delete_mask in prop::collection::vec(any::<bool>(), 5..30),
    ) {
        let index = HnswIndex::new(4);
        for (i, raw) in vectors.iter().enumerate() {
            index.insert(i as i64, unit_vector(raw)).unwrap();
        }

        let mut expected = vectors.len();
        for (i, doomed) in delete_mask.iter().enumerate().take(vectors.len()) {
            if *doomed {
                prop_assert!(index.delete(i as i64).is_some());
                expected -= 1;
                check_invariants(&index);
            }
        }
        prop_assert_eq!(index.len(), expected);
    }

    #[test]
    fn prop_update_preserves_invariants(
        vectors in prop::collection::vec(
            prop::collection::vec(-10.0f32..10.0, 4),
            2..20
        ),
    ) {
        let index = HnswIndex::new(4);
        for (i, raw) in vectors.iter().enumerate() {
            index.insert(i as i64, unit_vector(raw)).unwrap();
        }
        // Rotate every vector onto its neighbor's position.
        for i in 0..vectors.len() {
            let next = &vectors[(i + 1) % vectors.len()];
            prop_assert!(index.update(i as i64, unit_vector(next)).unwrap().is_some());
        }
        check_invariants(&index);
        prop_assert_eq!(index.len(), vectors.len());
    }

    #[test]
    fn prop_search_returns_sorted_live_rows(
        vectors in prop::collection::vec(
            prop::collection::vec(-10.0f32..10.0, 4),
            1..30
        ),
        query in prop::collection::vec(-10.0f32..10.0, 4),
        k in 1usize..10,
    ) {
        let index = HnswIndex::new(4);
        for (i, raw) in vectors.iter().enumerate() {
            index.insert(i as i64, unit_vector(raw)).unwrap();
        }

        let hits = index.search_knn(&unit_vector(&query), k).unwrap();
        prop_assert!(hits.len() <= k);
        for pair in hits.windows(2) {
            prop_assert!(pair[0].distance <= pair[1].distance);
        }
        for hit in &hits {
            prop_assert!(index.contains(hit.row_id));
        }
    }

    #[test]
    fn prop_serialize_roundtrip_preserves_results(
        vectors in prop::collection::vec(
            prop::collection::vec(-10.0f32..10.0, 4),
            1..25
        ),
    ) {
        let index = HnswIndex::new(4);
        for (i, raw) in vectors.iter().enumerate() {
            index.insert(i as i64, unit_vector(raw)).unwrap();
        }
        let restored = HnswIndex::deserialize(&index.serialize()).unwrap();
        prop_assert_eq!(restored.len(), index.len());

        for raw in vectors.iter().take(5) {
            let q = unit_vector(raw);
            let a = index.search_knn(&q, 3).unwrap();
            let b = restored.search_knn(&q, 3).unwrap();
            prop_assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(b.iter()) {
                prop_assert_eq!(x.row_id, y.row_id);
            }
        }
    }
}
