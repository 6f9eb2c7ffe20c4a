//! Unified error hierarchy for Proxima.
//!
//! Graph algorithms themselves never fail: they tolerate missing neighbor
//! ids by skipping them. Every error here arises at a boundary — argument
//! validation, stream decoding, or the pager.

use crate::pager::PagerError;
use thiserror::Error;

/// Errors surfaced by index operations and the persistence codecs.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A vector's dimension does not match the index configuration.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was configured with.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// The stream or meta page does not start with the expected magic number.
    #[error("invalid magic number: {0:#010x}")]
    InvalidMagic(u32),

    /// The stream or meta page was written by an unsupported format version.
    #[error("unsupported format version: {0}")]
    InvalidVersion(u32),

    /// The stream ended early or contains inconsistent lengths.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The meta page is structurally invalid (wrong type byte, bad directory).
    #[error("invalid meta page: {0}")]
    InvalidMetaPage(String),

    /// A directory entry exists but the referenced page does not hold the node.
    #[error("node {0} not found")]
    NodeNotFound(u64),

    /// The meta-page directory is exhausted. Overflow directories are a
    /// deliberate non-goal; callers size pages for their expected node count.
    #[error("meta page directory full ({capacity} entries)")]
    DirectoryFull {
        /// Number of directory slots a single meta page holds.
        capacity: usize,
    },

    /// A node record does not fit in a single page.
    #[error("node record of {needed} bytes exceeds page size {page_size}")]
    PageOverflow {
        /// Bytes required for the record (including the type byte).
        needed: usize,
        /// The pager's page size.
        page_size: usize,
    },

    /// A lower-level pager failure.
    #[error("pager error: {0}")]
    Pager(#[from] PagerError),
}
