//! In-memory pager: zeroed pages in a vector, dirty flags, no durability.
//!
//! The reference [`Pager`] implementation, used by tests and by hosts that
//! want a purely transient paged index.

use super::{Pager, PagerError};

#[derive(Debug)]
struct PageBuf {
    data: Vec<u8>,
    kind: u8,
    dirty: bool,
}

/// A pager holding all pages in memory.
#[derive(Debug)]
pub struct MemPager {
    page_size: usize,
    pages: Vec<PageBuf>,
}

impl MemPager {
    /// Creates a pager with the given page size.
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
        }
    }

    /// Number of pages currently marked dirty.
    #[must_use]
    pub fn dirty_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.dirty).count()
    }

    /// The advisory type tag of a page, if allocated.
    #[must_use]
    pub fn page_kind(&self, page_no: u32) -> Option<u8> {
        self.pages.get(page_no as usize).map(|p| p.kind)
    }
}

impl Pager for MemPager {
    fn page_size(&self) -> usize {
        self.page_size
    }

    #[allow(clippy::cast_possible_truncation)]
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn allocate(&mut self) -> Result<u32, PagerError> {
        #[allow(clippy::cast_possible_truncation)]
        let page_no = self.pages.len() as u32;
        self.pages.push(PageBuf {
            data: vec![0u8; self.page_size],
            kind: 0,
            dirty: true,
        });
        Ok(page_no)
    }

    fn read(&mut self, page_no: u32) -> Result<&[u8], PagerError> {
        self.pages
            .get(page_no as usize)
            .map(|p| p.data.as_slice())
            .ok_or(PagerError::PageOutOfBounds(page_no))
    }

    fn write(&mut self, page_no: u32) -> Result<&mut [u8], PagerError> {
        let page = self
            .pages
            .get_mut(page_no as usize)
            .ok_or(PagerError::PageOutOfBounds(page_no))?;
        page.dirty = true;
        Ok(page.data.as_mut_slice())
    }

    fn set_page_type(&mut self, page_no: u32, kind: u8) -> Result<(), PagerError> {
        let page = self
            .pages
            .get_mut(page_no as usize)
            .ok_or(PagerError::PageOutOfBounds(page_no))?;
        page.kind = kind;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), PagerError> {
        for page in &mut self.pages {
            page.dirty = false;
        }
        Ok(())
    }
}
