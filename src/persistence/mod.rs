//! Persistence: the whole-index stream codec and the paged index.

/// Meta-page and node-page layouts.
pub mod meta;
/// The disk-persistent index.
pub mod paged;
/// Whole-index stream format.
pub mod stream;

pub use meta::directory_capacity;
pub use paged::PagedHnswIndex;
pub use stream::{STREAM_HEADER_LEN, STREAM_MAGIC, STREAM_VERSION};
