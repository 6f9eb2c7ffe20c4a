//! Fixed-size page storage.
//!
//! The persistent index treats the pager as a black box that hands out
//! zeroed pages, reads and writes them by number, tracks dirty state, and
//! flushes on [`Pager::sync`].
//!
//! # Allocation invalidates page borrows
//!
//! A pager is free to relocate its backing memory when it grows (an mmap
//! regrowth, a reallocated arena). The trait encodes that hazard in the
//! borrow checker: [`Pager::read`] and [`Pager::write`] lend bytes
//! borrowed from the pager itself, so holding page data across an
//! [`Pager::allocate`] call does not compile. Decoded-node caches built on
//! top must still be dropped after every allocation — see the persistent
//! index.

/// File-backed pager.
pub mod file;
/// In-memory pager.
pub mod mem;

pub use file::FilePager;
pub use mem::MemPager;

use thiserror::Error;

/// Page-type tag for the index meta page.
pub const PAGE_KIND_META: u8 = 0x11;

/// Page-type tag for node pages.
pub const PAGE_KIND_NODE: u8 = 0x12;

/// Failures raised by a pager implementation.
#[derive(Debug, Error)]
pub enum PagerError {
    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The page number does not name an allocated page.
    #[error("page {0} out of bounds")]
    PageOutOfBounds(u32),

    /// The backing store failed validation (bad magic, checksum).
    #[error("backing store corrupted: {0}")]
    Corrupted(String),
}

/// Fixed-size page allocation, access, and durability.
pub trait Pager {
    /// Size of every page in bytes.
    fn page_size(&self) -> usize;

    /// Number of allocated pages.
    fn page_count(&self) -> u32;

    /// Allocates a fresh zeroed page and returns its number.
    ///
    /// May relocate previously returned page memory; the borrow rules
    /// above make stale access impossible.
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures.
    fn allocate(&mut self) -> Result<u32, PagerError>;

    /// Borrows a page's bytes for reading.
    ///
    /// # Errors
    ///
    /// [`PagerError::PageOutOfBounds`] for unallocated numbers; I/O errors
    /// from a backing store.
    fn read(&mut self, page_no: u32) -> Result<&[u8], PagerError>;

    /// Borrows a page's bytes for writing and marks the page dirty.
    ///
    /// # Errors
    ///
    /// Same as [`Pager::read`].
    fn write(&mut self, page_no: u32) -> Result<&mut [u8], PagerError>;

    /// Records the page's type tag (advisory runtime metadata; the
    /// authoritative tag is the first byte of the page payload).
    ///
    /// # Errors
    ///
    /// [`PagerError::PageOutOfBounds`] for unallocated numbers.
    fn set_page_type(&mut self, page_no: u32, kind: u8) -> Result<(), PagerError>;

    /// Flushes dirty pages to the backing store.
    ///
    /// # Errors
    ///
    /// I/O errors from the backing store.
    fn sync(&mut self) -> Result<(), PagerError>;
}
