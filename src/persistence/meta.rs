//! On-page layouts for the persistent index.
//!
//! # Meta page
//!
//! Byte 0 is the page-type tag ([`PAGE_KIND_META`]), bytes 1..72 hold the
//! stream header fields rearranged for page storage (same field order,
//! six reserved bytes instead of seven), and the node directory starts at
//! byte 72: packed 12-byte entries of `(node_id: u64, page_no: u32)` until
//! the page ends. A single meta page is the limit — when the directory is
//! full the mutation fails with [`IndexError::DirectoryFull`].
//!
//! # Node page
//!
//! Byte 0 is [`PAGE_KIND_NODE`], followed by one stream node record.
//! Exactly one node per page.

use crate::error::IndexError;
use crate::hnsw::config::HnswConfig;
use crate::hnsw::node::Node;
use crate::pager::{PAGE_KIND_META, PAGE_KIND_NODE};
use crate::persistence::stream::{
    decode_node, encode_node, ByteReader, STREAM_MAGIC, STREAM_VERSION,
};
use std::collections::HashMap;

/// Offset of the first directory entry within the meta page.
pub const META_DIRECTORY_OFFSET: usize = 72;

/// Size of one directory entry: node id (8) + page number (4).
pub const META_DIRECTORY_ENTRY: usize = 12;

const FLAG_HEURISTIC: u8 = 1;
const FLAG_EXTEND: u8 = 1 << 1;

/// Number of directory slots a meta page of `page_size` bytes holds.
#[must_use]
pub fn directory_capacity(page_size: usize) -> usize {
    page_size.saturating_sub(META_DIRECTORY_OFFSET) / META_DIRECTORY_ENTRY
}

/// Everything the meta page persists.
#[derive(Debug)]
pub(crate) struct MetaState {
    pub config: HnswConfig,
    pub entry_point: Option<u64>,
    pub max_level: u32,
    pub next_id: u64,
    pub directory: HashMap<u64, u32>,
}

/// Writes the full meta page, directory included.
///
/// The directory is emitted in ascending node-id order so the page bytes
/// are deterministic for a given state.
pub(crate) fn encode_meta_page(
    page: &mut [u8],
    config: &HnswConfig,
    entry_point: Option<u64>,
    max_level: u32,
    next_id: u64,
    directory: &HashMap<u64, u32>,
) -> Result<(), IndexError> {
    let capacity = directory_capacity(page.len());
    if directory.len() > capacity {
        return Err(IndexError::DirectoryFull { capacity });
    }

    page.fill(0);
    page[0] = PAGE_KIND_META;
    page[1..5].copy_from_slice(&STREAM_MAGIC.to_le_bytes());
    page[5..9].copy_from_slice(&STREAM_VERSION.to_le_bytes());
    page[9..13].copy_from_slice(&config.m.to_le_bytes());
    page[13..17].copy_from_slice(&config.m_max0.to_le_bytes());
    page[17..21].copy_from_slice(&config.ef_construction.to_le_bytes());
    page[21..25].copy_from_slice(&config.ef_search.to_le_bytes());
    page[25..29].copy_from_slice(&config.dimension.to_le_bytes());
    page[29..37].copy_from_slice(&config.ml.to_bits().to_le_bytes());
    page[37..45].copy_from_slice(&entry_point.unwrap_or(0).to_le_bytes());
    page[45..49].copy_from_slice(&max_level.to_le_bytes());
    page[49..57].copy_from_slice(&next_id.to_le_bytes());
    page[57..65].copy_from_slice(&(directory.len() as u64).to_le_bytes());
    let mut flags = 0u8;
    if config.use_heuristic {
        flags |= FLAG_HEURISTIC;
    }
    if config.extend_candidates {
        flags |= FLAG_EXTEND;
    }
    page[65] = flags;
    // Bytes 66..72 stay reserved zeros.

    let mut entries: Vec<(u64, u32)> = directory.iter().map(|(&id, &p)| (id, p)).collect();
    entries.sort_unstable_by_key(|&(id, _)| id);
    let mut offset = META_DIRECTORY_OFFSET;
    for (node_id, page_no) in entries {
        page[offset..offset + 8].copy_from_slice(&node_id.to_le_bytes());
        page[offset + 8..offset + 12].copy_from_slice(&page_no.to_le_bytes());
        offset += META_DIRECTORY_ENTRY;
    }
    Ok(())
}

/// Parses a meta page.
///
/// # Errors
///
/// [`IndexError::InvalidMetaPage`] for a wrong page-type byte or an
/// inconsistent directory, [`IndexError::InvalidMagic`] /
/// [`IndexError::InvalidVersion`] for header mismatches.
pub(crate) fn decode_meta_page(page: &[u8]) -> Result<MetaState, IndexError> {
    if page.len() < META_DIRECTORY_OFFSET {
        return Err(IndexError::InvalidMetaPage(format!(
            "page of {} bytes cannot hold a meta header",
            page.len()
        )));
    }
    if page[0] != PAGE_KIND_META {
        return Err(IndexError::InvalidMetaPage(format!(
            "wrong page type byte {:#04x}",
            page[0]
        )));
    }

    let mut reader = ByteReader::new(&page[1..META_DIRECTORY_OFFSET]);
    let magic = reader.read_u32()?;
    if magic != STREAM_MAGIC {
        return Err(IndexError::InvalidMagic(magic));
    }
    let version = reader.read_u32()?;
    if version != STREAM_VERSION {
        return Err(IndexError::InvalidVersion(version));
    }

    let m = reader.read_u32()?;
    let m_max0 = reader.read_u32()?;
    let ef_construction = reader.read_u32()?;
    let ef_search = reader.read_u32()?;
    let dimension = reader.read_u32()?;
    let ml = reader.read_f64()?;
    let entry_point = reader.read_u64()?;
    let max_level = reader.read_u32()?;
    let next_id = reader.read_u64()?;
    let node_count = reader.read_u64()?;
    let flags = reader.read_u8()?;

    let mut config = HnswConfig::new(dimension);
    config.m = m;
    config.m_max0 = m_max0;
    config.ef_construction = ef_construction;
    config.ef_search = ef_search;
    config.ml = ml;
    config.use_heuristic = flags & FLAG_HEURISTIC != 0;
    config.extend_candidates = flags & FLAG_EXTEND != 0;

    let node_count = usize::try_from(node_count)
        .map_err(|_| IndexError::InvalidMetaPage("node count overflows usize".into()))?;
    let capacity = directory_capacity(page.len());
    if node_count > capacity {
        return Err(IndexError::InvalidMetaPage(format!(
            "directory claims {node_count} entries, page holds {capacity}"
        )));
    }

    let mut directory = HashMap::with_capacity(node_count);
    let mut offset = META_DIRECTORY_OFFSET;
    for _ in 0..node_count {
        let node_id = u64::from_le_bytes(
            page[offset..offset + 8]
                .try_into()
                .map_err(|_| IndexError::InvalidMetaPage("short directory entry".into()))?,
        );
        let page_no = u32::from_le_bytes(
            page[offset + 8..offset + 12]
                .try_into()
                .map_err(|_| IndexError::InvalidMetaPage("short directory entry".into()))?,
        );
        if directory.insert(node_id, page_no).is_some() {
            return Err(IndexError::InvalidMetaPage(format!(
                "duplicate directory entry for node {node_id}"
            )));
        }
        offset += META_DIRECTORY_ENTRY;
    }

    let entry_point = if directory.is_empty() {
        None
    } else {
        Some(entry_point)
    };
    Ok(MetaState {
        config,
        entry_point,
        max_level: if directory.is_empty() { 0 } else { max_level },
        next_id,
        directory,
    })
}

/// Writes one node into a node page.
///
/// # Errors
///
/// [`IndexError::PageOverflow`] when the record does not fit.
pub(crate) fn encode_node_page(page: &mut [u8], node: &Node) -> Result<(), IndexError> {
    let mut record = Vec::new();
    encode_node(&mut record, node);
    let needed = 1 + record.len();
    if needed > page.len() {
        return Err(IndexError::PageOverflow {
            needed,
            page_size: page.len(),
        });
    }
    page.fill(0);
    page[0] = PAGE_KIND_NODE;
    page[1..needed].copy_from_slice(&record);
    Ok(())
}

/// Reads the node stored in a node page, verifying it is `expect_id`.
///
/// # Errors
///
/// [`IndexError::NodeNotFound`] when the page-type byte is wrong or the
/// page holds a different node (a directory entry pointing nowhere);
/// [`IndexError::CorruptedData`] for a malformed record.
pub(crate) fn decode_node_page(page: &[u8], expect_id: u64) -> Result<Node, IndexError> {
    if page.is_empty() || page[0] != PAGE_KIND_NODE {
        return Err(IndexError::NodeNotFound(expect_id));
    }
    let mut reader = ByteReader::new(&page[1..]);
    let node = decode_node(&mut reader)?;
    if node.node_id() != expect_id {
        return Err(IndexError::NodeNotFound(expect_id));
    }
    Ok(node)
}
