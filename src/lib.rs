//! # Proxima
//!
//! Embedded HNSW vector index with page-backed persistence and
//! incremental change logs.
//!
//! Three operating modes share one algorithmic core:
//!
//! - [`HnswIndex`] — in-memory, with a bit-exact stream serializer.
//! - [`PagedHnswIndex`] — persistent, one meta page plus one page per
//!   node over any [`pager::Pager`].
//! - [`IncrementalIndex`] — layers a [`ChangeLog`] (monotonic sequence
//!   numbers, compaction, checkpoints, delta replay) over either.
//!
//! All indices expose the same surface through [`VectorIndex`]. Every
//! index guards its state with a reader/writer lock: searches run
//! concurrently, mutations are exclusive for their full duration.
//!
//! ## Example
//!
//! ```rust
//! use proxima::{HnswIndex, Vector, VectorIndex};
//!
//! let index = HnswIndex::new(3);
//! for (row, data) in [(1, [1.0, 0.0, 0.0]), (2, [0.0, 1.0, 0.0])] {
//!     let mut v = Vector::new(&data);
//!     v.normalize();
//!     index.insert(row, v).unwrap();
//! }
//!
//! let mut query = Vector::new(&[0.9, 0.1, 0.0]);
//! query.normalize();
//! let hits = index.search_knn(&query, 1).unwrap();
//! assert_eq!(hits[0].row_id, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

/// Change-log records and the log itself.
pub mod changelog;

/// Unified error handling.
pub mod error;

/// HNSW graph, configuration, and the in-memory index.
pub mod hnsw;

/// Incremental index wrapper.
pub mod incremental;

/// Page storage abstraction and reference pagers.
pub mod pager;

/// Stream codec and the paged index.
pub mod persistence;

/// Vector value type and distance kernels.
pub mod vector;

pub use changelog::{ChangeLog, Operation, OperationKind};
pub use error::IndexError;
pub use hnsw::{DistanceMetric, HnswConfig, HnswIndex, SearchHit, VectorIndex};
pub use incremental::{Checkpoint, IncrementalIndex, IndexSnapshot};
pub use persistence::PagedHnswIndex;
pub use vector::Vector;

/// The crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
