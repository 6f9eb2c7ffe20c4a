//! Disk-persistent HNSW index over a pager.
//!
//! One meta page (header + node directory) plus one page per node. Graph
//! algorithms are the same free functions the in-memory index uses; node
//! access routes through a read-through cache of decoded nodes keyed by
//! node id.
//!
//! The cache is dropped in full immediately after every page allocation:
//! allocation may relocate pager memory, and while the borrow rules of
//! [`Pager`] already prevent holding raw page bytes across an allocation,
//! dropping decoded state too keeps the cache's lifecycle aligned with
//! the pager's and costs only a refill. Deleted node pages are leaked —
//! free-list reuse is a non-goal.

use crate::error::IndexError;
use crate::hnsw::config::HnswConfig;
use crate::hnsw::graph::{NodeSource, NodeStore, SearchHit, VectorIndex};
use crate::hnsw::index::LEVEL_SEED;
use crate::hnsw::insert::{draw_level, link_node, unlink_node};
use crate::hnsw::node::Node;
use crate::hnsw::search;
use crate::pager::{Pager, PAGE_KIND_META, PAGE_KIND_NODE};
use crate::persistence::meta::{
    decode_meta_page, decode_node_page, directory_capacity, encode_meta_page, encode_node_page,
    META_DIRECTORY_ENTRY, META_DIRECTORY_OFFSET,
};
use crate::vector::Vector;
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::borrow::Cow;
use std::collections::HashMap;

/// Pager handle plus the decoded-node cache. Reads fault nodes in under
/// the outer read lock, so both live behind one mutex; write paths reach
/// them lock-free through `get_mut`.
#[derive(Debug)]
struct PagedIo<P> {
    pager: P,
    cache: HashMap<u64, Node>,
}

#[derive(Debug)]
struct PagedCore<P: Pager> {
    config: HnswConfig,
    meta_page: u32,
    entry: Option<u64>,
    max_level: u32,
    next_id: u64,
    directory: HashMap<u64, u32>,
    io: Mutex<PagedIo<P>>,
    rng: ChaCha8Rng,
}

fn flush_meta<P: Pager>(
    io: &mut PagedIo<P>,
    meta_page: u32,
    config: &HnswConfig,
    entry: Option<u64>,
    max_level: u32,
    next_id: u64,
    directory: &HashMap<u64, u32>,
) -> Result<(), IndexError> {
    let page = io.pager.write(meta_page)?;
    encode_meta_page(page, config, entry, max_level, next_id, directory)
}

impl<P: Pager> PagedCore<P> {
    /// First node carrying `row_id`, scanning in ascending node-id order.
    fn find_row(&self, row_id: i64) -> Option<u64> {
        let mut ids: Vec<u64> = self.directory.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .find(|&id| self.node(id).is_some_and(|n| n.row_id() == row_id))
    }
}

impl<P: Pager> NodeSource for PagedCore<P> {
    fn config(&self) -> &HnswConfig {
        &self.config
    }

    fn node(&self, id: u64) -> Option<Cow<'_, Node>> {
        let page_no = *self.directory.get(&id)?;
        let mut io = self.io.lock();
        if let Some(node) = io.cache.get(&id) {
            return Some(Cow::Owned(node.clone()));
        }
        let node = {
            let page = match io.pager.read(page_no) {
                Ok(page) => page,
                Err(err) => {
                    log::warn!("skipping node {id}: page {page_no} read failed: {err}");
                    return None;
                }
            };
            match decode_node_page(page, id) {
                Ok(node) => node,
                Err(err) => {
                    log::warn!("skipping node {id}: page {page_no} decode failed: {err}");
                    return None;
                }
            }
        };
        io.cache.insert(id, node.clone());
        Some(Cow::Owned(node))
    }

    fn entry_state(&self) -> (Option<u64>, u32) {
        (self.entry, self.max_level)
    }
}

impl<P: Pager> NodeStore for PagedCore<P> {
    fn install_node(&mut self, node: Node) -> Result<(), IndexError> {
        let io = self.io.get_mut();
        let capacity = directory_capacity(io.pager.page_size());
        if self.directory.len() >= capacity {
            return Err(IndexError::DirectoryFull { capacity });
        }

        let page_no = io.pager.allocate()?;
        // Allocation may have moved pager memory: drop every decoded node.
        io.cache.clear();
        io.pager.set_page_type(page_no, PAGE_KIND_NODE)?;
        encode_node_page(io.pager.write(page_no)?, &node)?;

        self.directory.insert(node.node_id(), page_no);
        io.cache.insert(node.node_id(), node);
        flush_meta(
            io,
            self.meta_page,
            &self.config,
            self.entry,
            self.max_level,
            self.next_id,
            &self.directory,
        )
    }

    fn discard_node(&mut self, id: u64) -> Result<bool, IndexError> {
        if self.directory.remove(&id).is_none() {
            return Ok(false);
        }
        // The node's page is leaked intentionally.
        let io = self.io.get_mut();
        io.cache.remove(&id);
        flush_meta(
            io,
            self.meta_page,
            &self.config,
            self.entry,
            self.max_level,
            self.next_id,
            &self.directory,
        )?;
        Ok(true)
    }

    fn update_node<F, R>(&mut self, id: u64, apply: F) -> Result<Option<R>, IndexError>
    where
        F: FnOnce(&mut Node) -> R,
    {
        let Some(&page_no) = self.directory.get(&id) else {
            return Ok(None);
        };
        let io = self.io.get_mut();
        if !io.cache.contains_key(&id) {
            let node = {
                let page = io.pager.read(page_no)?;
                decode_node_page(page, id)?
            };
            io.cache.insert(id, node);
        }

        let PagedIo { pager, cache } = io;
        let Some(node) = cache.get_mut(&id) else {
            return Ok(None);
        };
        let result = apply(node);
        encode_node_page(pager.write(page_no)?, node)?;
        Ok(Some(result))
    }

    fn set_entry_state(&mut self, entry: Option<u64>, max_level: u32) -> Result<(), IndexError> {
        self.entry = entry;
        self.max_level = max_level;
        flush_meta(
            self.io.get_mut(),
            self.meta_page,
            &self.config,
            entry,
            max_level,
            self.next_id,
            &self.directory,
        )
    }

    fn node_ids(&self) -> Vec<u64> {
        self.directory.keys().copied().collect()
    }
}

/// A disk-persistent HNSW index.
///
/// Shares the in-memory index's surface; `sync` and `meta_page` are the
/// persistent-only additions. Reads run under the reader lock (node
/// faults serialize briefly on the internal cache mutex), mutations hold
/// the writer lock for their full duration and rewrite the meta page
/// after every change to the directory, entry point, max level, or id
/// counter.
///
/// # Example
///
/// ```rust
/// use proxima::pager::MemPager;
/// use proxima::{HnswConfig, PagedHnswIndex, Vector, VectorIndex};
///
/// let index = PagedHnswIndex::create(MemPager::new(4096), HnswConfig::new(2)).unwrap();
/// index.insert(1, Vector::new(&[1.0, 0.0])).unwrap();
/// index.sync().unwrap();
///
/// let hits = index.search_knn(&Vector::new(&[1.0, 0.0]), 1).unwrap();
/// assert_eq!(hits[0].row_id, 1);
/// ```
#[derive(Debug)]
pub struct PagedHnswIndex<P: Pager> {
    inner: RwLock<PagedCore<P>>,
}

impl<P: Pager> PagedHnswIndex<P> {
    /// Initializes a fresh index on the pager: allocates and writes the
    /// meta page.
    ///
    /// # Errors
    ///
    /// [`IndexError::InvalidMetaPage`] when the page size cannot hold a
    /// meta header plus at least one directory entry; pager errors
    /// otherwise.
    pub fn create(mut pager: P, config: HnswConfig) -> Result<Self, IndexError> {
        if pager.page_size() < META_DIRECTORY_OFFSET + META_DIRECTORY_ENTRY {
            return Err(IndexError::InvalidMetaPage(format!(
                "page size {} cannot hold a meta page",
                pager.page_size()
            )));
        }
        let meta_page = pager.allocate()?;
        pager.set_page_type(meta_page, PAGE_KIND_META)?;
        encode_meta_page(
            pager.write(meta_page)?,
            &config,
            None,
            0,
            0,
            &HashMap::new(),
        )?;

        Ok(Self {
            inner: RwLock::new(PagedCore {
                config,
                meta_page,
                entry: None,
                max_level: 0,
                next_id: 0,
                directory: HashMap::new(),
                io: Mutex::new(PagedIo {
                    pager,
                    cache: HashMap::new(),
                }),
                rng: ChaCha8Rng::seed_from_u64(LEVEL_SEED),
            }),
        })
    }

    /// Opens an index previously written through this type.
    ///
    /// The meta page does not carry the distance metric; the decoded
    /// config uses the default (cosine). Reopen through
    /// [`PagedHnswIndex::open_with_metric`] for other metrics.
    ///
    /// # Errors
    ///
    /// [`IndexError::InvalidMetaPage`] / [`IndexError::InvalidMagic`] /
    /// [`IndexError::InvalidVersion`] when the meta page fails
    /// validation; pager errors otherwise.
    pub fn open(pager: P, meta_page: u32) -> Result<Self, IndexError> {
        Self::open_inner(pager, meta_page, None)
    }

    /// Opens an index, overriding the metric the meta page cannot store.
    ///
    /// # Errors
    ///
    /// Same as [`PagedHnswIndex::open`].
    pub fn open_with_metric(
        pager: P,
        meta_page: u32,
        metric: crate::hnsw::config::DistanceMetric,
    ) -> Result<Self, IndexError> {
        Self::open_inner(pager, meta_page, Some(metric))
    }

    fn open_inner(
        mut pager: P,
        meta_page: u32,
        metric: Option<crate::hnsw::config::DistanceMetric>,
    ) -> Result<Self, IndexError> {
        let mut state = {
            let page = pager.read(meta_page)?;
            decode_meta_page(page)?
        };
        if let Some(metric) = metric {
            state.config.metric = metric;
        }
        log::info!(
            "opened paged index: {} nodes, dimension {}",
            state.directory.len(),
            state.config.dimension
        );

        Ok(Self {
            inner: RwLock::new(PagedCore {
                config: state.config,
                meta_page,
                entry: state.entry_point,
                max_level: state.max_level,
                next_id: state.next_id,
                directory: state.directory,
                io: Mutex::new(PagedIo {
                    pager,
                    cache: HashMap::new(),
                }),
                rng: ChaCha8Rng::seed_from_u64(LEVEL_SEED),
            }),
        })
    }

    /// Flushes dirty pages through the pager.
    ///
    /// # Errors
    ///
    /// Pager I/O errors.
    pub fn sync(&self) -> Result<(), IndexError> {
        let mut guard = self.inner.write();
        let core = &mut *guard;
        core.io.get_mut().pager.sync()?;
        Ok(())
    }

    /// The page number holding the index meta page.
    #[must_use]
    pub fn meta_page(&self) -> u32 {
        self.inner.read().meta_page
    }

    /// Consumes the index and returns the pager.
    pub fn into_pager(self) -> P {
        self.inner.into_inner().io.into_inner().pager
    }

    fn check_dimension(config: &HnswConfig, vector: &Vector) -> Result<(), IndexError> {
        if vector.dimension() != config.dimension as usize {
            return Err(IndexError::DimensionMismatch {
                expected: config.dimension as usize,
                actual: vector.dimension(),
            });
        }
        Ok(())
    }
}

impl<P: Pager> VectorIndex for PagedHnswIndex<P> {
    fn insert(&self, row_id: i64, vector: Vector) -> Result<u64, IndexError> {
        let mut guard = self.inner.write();
        let core = &mut *guard;
        Self::check_dimension(&core.config, &vector)?;

        // Fail before consuming an id when the directory cannot grow.
        let capacity = directory_capacity(core.io.get_mut().pager.page_size());
        if core.directory.len() >= capacity {
            return Err(IndexError::DirectoryFull { capacity });
        }

        let node_id = core.next_id;
        core.next_id += 1;
        let level = draw_level(&mut core.rng, core.config.ml);
        link_node(core, node_id, row_id, vector, level)?;
        Ok(node_id)
    }

    fn delete(&self, row_id: i64) -> Option<u64> {
        let mut guard = self.inner.write();
        let core = &mut *guard;
        let node_id = core.find_row(row_id)?;
        match unlink_node(core, node_id) {
            Ok(true) => Some(node_id),
            Ok(false) => None,
            Err(err) => {
                log::warn!("delete of row {row_id} failed mid-write: {err}");
                None
            }
        }
    }

    fn delete_by_node_id(&self, node_id: u64) -> Option<i64> {
        let mut guard = self.inner.write();
        let core = &mut *guard;
        let row_id = core.node(node_id)?.row_id();
        match unlink_node(core, node_id) {
            Ok(true) => Some(row_id),
            Ok(false) => None,
            Err(err) => {
                log::warn!("delete of node {node_id} failed mid-write: {err}");
                None
            }
        }
    }

    fn update(&self, row_id: i64, vector: Vector) -> Result<Option<u64>, IndexError> {
        let mut guard = self.inner.write();
        let core = &mut *guard;
        Self::check_dimension(&core.config, &vector)?;

        let Some(target) = core.find_row(row_id) else {
            return Ok(None);
        };
        unlink_node(core, target)?;

        let node_id = core.next_id;
        core.next_id += 1;
        let level = draw_level(&mut core.rng, core.config.ml);
        link_node(core, node_id, row_id, vector, level)?;
        Ok(Some(node_id))
    }

    fn search_knn(&self, query: &Vector, k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let ef = self.inner.read().config.ef_search as usize;
        self.search_knn_with_ef(query, k, ef)
    }

    fn search_knn_with_ef(
        &self,
        query: &Vector,
        k: usize,
        ef: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let guard = self.inner.read();
        let core = &*guard;
        Self::check_dimension(&core.config, query)?;

        let found = search::search_knn(core, query, k, ef);
        Ok(found
            .into_iter()
            .filter_map(|c| {
                core.node(c.node_id).map(|node| SearchHit {
                    row_id: node.row_id(),
                    distance: c.distance,
                })
            })
            .collect())
    }

    fn get_by_row_id(&self, row_id: i64) -> Option<Vector> {
        let guard = self.inner.read();
        let core = &*guard;
        let id = core.find_row(row_id)?;
        core.node(id).map(|n| n.vector().clone())
    }

    fn contains(&self, row_id: i64) -> bool {
        self.inner.read().find_row(row_id).is_some()
    }

    fn len(&self) -> usize {
        self.inner.read().directory.len()
    }

    fn dimension(&self) -> u32 {
        self.inner.read().config.dimension
    }

    fn config(&self) -> HnswConfig {
        self.inner.read().config.clone()
    }
}
