//! File-backed pager.
//!
//! # File layout
//!
//! A 16-byte header followed by pages at `16 + page_no * page_size`:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 4    | Magic `"PXPG"` |
//! | 4      | 4    | page size (u32 LE) |
//! | 8      | 4    | page count (u32 LE) |
//! | 12     | 4    | CRC32 of bytes 0..12 |
//!
//! Pages load lazily and stay resident; [`Pager::sync`] rewrites dirty
//! pages plus the header. Page-type tags are runtime-only metadata — the
//! authoritative tag is the first byte each codec writes into the page.

use super::{Pager, PagerError};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const FILE_MAGIC: [u8; 4] = *b"PXPG";
const FILE_HEADER_LEN: u64 = 16;

/// A pager persisting pages to a single file.
pub struct FilePager {
    file: File,
    page_size: usize,
    page_count: u32,
    loaded: HashMap<u32, Vec<u8>>,
    dirty: HashSet<u32>,
    kinds: HashMap<u32, u8>,
}

impl FilePager {
    /// Creates a new pager file, truncating any existing file at `path`.
    ///
    /// # Errors
    ///
    /// I/O errors opening or writing the file.
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self, PagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut pager = Self {
            file,
            page_size,
            page_count: 0,
            loaded: HashMap::new(),
            dirty: HashSet::new(),
            kinds: HashMap::new(),
        };
        pager.write_header()?;
        Ok(pager)
    }

    /// Opens an existing pager file.
    ///
    /// # Errors
    ///
    /// [`PagerError::Corrupted`] when the header fails validation; I/O
    /// errors otherwise.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PagerError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut header = [0u8; FILE_HEADER_LEN as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;

        if header[0..4] != FILE_MAGIC {
            return Err(PagerError::Corrupted("bad file magic".into()));
        }
        let stored_crc = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);
        let actual_crc = crc32fast::hash(&header[0..12]);
        if stored_crc != actual_crc {
            return Err(PagerError::Corrupted(format!(
                "header checksum mismatch: stored {stored_crc:#010x}, computed {actual_crc:#010x}"
            )));
        }
        let page_size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if page_size == 0 {
            return Err(PagerError::Corrupted("page size is zero".into()));
        }
        let page_count = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);

        Ok(Self {
            file,
            page_size,
            page_count,
            loaded: HashMap::new(),
            dirty: HashSet::new(),
            kinds: HashMap::new(),
        })
    }

    fn write_header(&mut self) -> Result<(), PagerError> {
        let mut header = [0u8; FILE_HEADER_LEN as usize];
        header[0..4].copy_from_slice(&FILE_MAGIC);
        #[allow(clippy::cast_possible_truncation)]
        header[4..8].copy_from_slice(&(self.page_size as u32).to_le_bytes());
        header[8..12].copy_from_slice(&self.page_count.to_le_bytes());
        let crc = crc32fast::hash(&header[0..12]);
        header[12..16].copy_from_slice(&crc.to_le_bytes());
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        Ok(())
    }

    fn page_offset(&self, page_no: u32) -> u64 {
        FILE_HEADER_LEN + u64::from(page_no) * self.page_size as u64
    }

    fn ensure_loaded(&mut self, page_no: u32) -> Result<(), PagerError> {
        if page_no >= self.page_count {
            return Err(PagerError::PageOutOfBounds(page_no));
        }
        if self.loaded.contains_key(&page_no) {
            return Ok(());
        }
        let mut data = vec![0u8; self.page_size];
        self.file.seek(SeekFrom::Start(self.page_offset(page_no)))?;
        self.file.read_exact(&mut data)?;
        self.loaded.insert(page_no, data);
        Ok(())
    }
}

impl Pager for FilePager {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn allocate(&mut self) -> Result<u32, PagerError> {
        let page_no = self.page_count;
        self.page_count += 1;
        self.loaded.insert(page_no, vec![0u8; self.page_size]);
        self.dirty.insert(page_no);
        Ok(page_no)
    }

    fn read(&mut self, page_no: u32) -> Result<&[u8], PagerError> {
        self.ensure_loaded(page_no)?;
        Ok(self.loaded[&page_no].as_slice())
    }

    fn write(&mut self, page_no: u32) -> Result<&mut [u8], PagerError> {
        self.ensure_loaded(page_no)?;
        self.dirty.insert(page_no);
        self.loaded
            .get_mut(&page_no)
            .map(Vec::as_mut_slice)
            .ok_or(PagerError::PageOutOfBounds(page_no))
    }

    fn set_page_type(&mut self, page_no: u32, kind: u8) -> Result<(), PagerError> {
        if page_no >= self.page_count {
            return Err(PagerError::PageOutOfBounds(page_no));
        }
        self.kinds.insert(page_no, kind);
        Ok(())
    }

    fn sync(&mut self) -> Result<(), PagerError> {
        let mut pending: Vec<u32> = self.dirty.iter().copied().collect();
        pending.sort_unstable();
        for page_no in pending {
            let offset = self.page_offset(page_no);
            if let Some(data) = self.loaded.get(&page_no) {
                self.file.seek(SeekFrom::Start(offset))?;
                self.file.write_all(data)?;
            }
        }
        self.dirty.clear();
        self.write_header()?;
        self.file.sync_all()?;
        Ok(())
    }
}
