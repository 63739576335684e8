//! DiskRTree implementation.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::bounding_box::BoundingBox;
use crate::dataset::RowId;
use crate::errors::{SindexError, SindexResult};
use crate::hilbert::sort_by_hilbert;
use crate::spatial_rtree::SpatialRTree;

use super::persistence::IntegrityReport;
use super::rtree_cache::PageCache;
use super::rtree_constants::{DEFAULT_CACHE_PAGES, MAX_INTERNAL_CHILDREN, MAX_LEAF_ENTRIES};
use super::rtree_storage::{Storage, StorageWriter};
use super::rtree_types::{BuildStats, ChildRef, FileHeader, LeafEntry, Node, PageId, RTreeStats};

/// A read-only, Hilbert packed R-tree stored in a single file.
///
/// Trees are written in one pass by [`DiskRTree::bulk_load`] and opened with
/// [`DiskRTree::open`]. Opening reads only the header; nodes are decoded on
/// first access and kept in an LRU cache. Clones share the same file mapping
/// and cache.
#[derive(Clone)]
pub struct DiskRTree {
    inner: Arc<DiskRTreeInner>,
}

struct DiskRTreeInner {
    storage: Storage,
    cache: Mutex<PageCache>,
    header: FileHeader,
    /// Statistics tracking
    stats: RTreeStatistics,
    /// Is the tree closed?
    closed: RwLock<bool>,
}

/// Internal statistics tracking
struct RTreeStatistics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    disk_reads: AtomicU64,
}

impl RTreeStatistics {
    fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            disk_reads: AtomicU64::new(0),
        }
    }
}

impl DiskRTree {
    /// Opens an existing index file.
    ///
    /// Only the header is read. All tree nodes remain on disk until a query
    /// touches them.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be opened, `IndexCorrupt` if it is not a
    /// complete index.
    pub fn open(path: impl AsRef<Path>) -> SindexResult<Self> {
        Self::open_with_cache_size(path, DEFAULT_CACHE_PAGES)
    }

    /// Open with custom cache size (number of pages)
    pub fn open_with_cache_size(path: impl AsRef<Path>, cache_pages: usize) -> SindexResult<Self> {
        let storage = Storage::open(path.as_ref())?;
        let header = storage.read_header()?;
        debug!(
            "Opened R-tree {} ({} entries, height {}, {} pages)",
            path.as_ref().display(),
            header.entry_count,
            header.height,
            header.page_count
        );

        Ok(Self {
            inner: Arc::new(DiskRTreeInner {
                storage,
                cache: Mutex::new(PageCache::new(cache_pages)),
                header,
                stats: RTreeStatistics::new(),
                closed: RwLock::new(false),
            }),
        })
    }

    /// Writes a new index file containing `entries`.
    ///
    /// # Algorithm
    /// 1. Sort entries by the Hilbert index of their centers over the global extent
    /// 2. Pack consecutive runs into full leaves
    /// 3. Pack consecutive runs of nodes into parents until one root remains
    ///
    /// Every node except the last one on each level is full, so the tree has
    /// the minimum possible height. Pages are written leaves first and the
    /// header last; a file interrupted mid-write has no valid header.
    ///
    /// Entries are held in memory for the sort, 40 bytes each.
    ///
    /// # Example
    /// ```no_run
    /// use sindex::{BoundingBox, DiskRTree};
    ///
    /// let entries = vec![
    ///     (0u64, BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
    ///     (1u64, BoundingBox::new(2.0, 2.0, 3.0, 3.0)),
    /// ];
    /// DiskRTree::bulk_load("cities_sindex.idx", entries).unwrap();
    /// let tree = DiskRTree::open("cities_sindex.idx").unwrap();
    /// ```
    pub fn bulk_load<I>(path: impl AsRef<Path>, entries: I) -> SindexResult<BuildStats>
    where
        I: IntoIterator<Item = (RowId, BoundingBox)>,
    {
        let path = path.as_ref();
        let mut entries: Vec<(RowId, BoundingBox)> = entries.into_iter().collect();
        if let Some((_, bbox)) = entries.iter().find(|(_, b)| !b.is_valid()) {
            return Err(SindexError::InvalidBoundingBox(*bbox));
        }
        sort_by_hilbert(&mut entries);

        let mut writer = StorageWriter::create(path)?;
        let mut stats = BuildStats {
            entries: entries.len() as u64,
            ..BuildStats::default()
        };

        // Level 0: leaves. An empty tree still gets one (empty) root leaf.
        let mut level: Vec<ChildRef> = Vec::new();
        let leaf_runs: Vec<&[(RowId, BoundingBox)]> = if entries.is_empty() {
            vec![&entries[..]]
        } else {
            entries.chunks(MAX_LEAF_ENTRIES).collect()
        };
        for run in leaf_runs {
            let node = Node::Leaf {
                entries: run
                    .iter()
                    .map(|&(id, bbox)| LeafEntry { bbox, id })
                    .collect(),
            };
            let bbox = node.compute_bbox();
            let page_id = writer.append(&node)?;
            level.push(ChildRef { bbox, page_id });
            stats.leaf_pages += 1;
        }
        stats.height = 1;

        while level.len() > 1 {
            let mut parents = Vec::with_capacity(level.len() / MAX_INTERNAL_CHILDREN + 1);
            for run in level.chunks(MAX_INTERNAL_CHILDREN) {
                let node = Node::Internal {
                    children: run.to_vec(),
                    level: stats.height,
                };
                let bbox = node.compute_bbox();
                let page_id = writer.append(&node)?;
                parents.push(ChildRef { bbox, page_id });
                stats.internal_pages += 1;
            }
            level = parents;
            stats.height += 1;
        }

        let root = level
            .first()
            .ok_or_else(|| SindexError::InvalidOperation("bulk load produced no root".into()))?;
        let header = FileHeader {
            root_page: root.page_id,
            page_count: writer.page_count(),
            entry_count: stats.entries,
            height: stats.height,
            extent: (stats.entries > 0).then_some(root.bbox),
            ..FileHeader::new()
        };
        stats.file_bytes = writer.finish(&header)?;

        debug!(
            "Bulk loaded R-tree {} ({} entries, {} leaves, {} internal, height {})",
            path.display(),
            stats.entries,
            stats.leaf_pages,
            stats.internal_pages,
            stats.height
        );
        Ok(stats)
    }

    /// Check if tree is closed
    fn check_closed(&self) -> SindexResult<()> {
        if *self.inner.closed.read() {
            Err(SindexError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn path(&self) -> &Path {
        self.inner.storage.path()
    }

    /// Union of all indexed boxes, `None` for an empty tree.
    pub fn extent(&self) -> Option<BoundingBox> {
        self.inner.header.extent
    }

    pub fn height(&self) -> u32 {
        self.inner.header.height
    }

    /// Get comprehensive statistics
    pub fn stats(&self) -> RTreeStats {
        let header = &self.inner.header;
        RTreeStats {
            total_entries: header.entry_count,
            page_count: header.page_count,
            cached_pages: self.inner.cache.lock().len() as u64,
            cache_hits: self.inner.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.inner.stats.cache_misses.load(Ordering::Relaxed),
            disk_reads: self.inner.stats.disk_reads.load(Ordering::Relaxed),
            tree_height: header.height,
        }
    }

    /// Walks every page of the file and reports what is wrong with it.
    ///
    /// Reads bypass the cache. Checks:
    /// - every page decodes and its checksum matches
    /// - node levels decrease by one towards the leaves
    /// - each child box covers everything below it
    /// - every page is reachable exactly once from the root
    /// - the entry count and extent agree with the header
    pub fn check_integrity(&self) -> SindexResult<IntegrityReport> {
        self.check_closed()?;

        let header = &self.inner.header;
        let storage = &self.inner.storage;
        let mut report = IntegrityReport::new();
        let mut visited = vec![false; header.page_count as usize];

        // (page, expected level, box the parent recorded for it)
        let mut pending: Vec<(PageId, u32, Option<BoundingBox>)> =
            vec![(header.root_page, header.height - 1, None)];

        while let Some((page_id, expected_level, recorded)) = pending.pop() {
            match visited.get_mut(page_id as usize) {
                Some(seen) if !*seen => *seen = true,
                Some(_) => {
                    report.fail(format!("Page {} is referenced more than once", page_id));
                    continue;
                }
                None => {
                    report.fail(format!("Page {} does not exist", page_id));
                    continue;
                }
            }

            report.pages_checked += 1;
            let node = match storage.read_page(page_id) {
                Ok(node) => node,
                Err(e) => {
                    report.corrupt_page(page_id, e);
                    continue;
                }
            };

            if node.level() != expected_level {
                report.fail(format!(
                    "Page {} is at level {}, expected {}",
                    page_id,
                    node.level(),
                    expected_level
                ));
            }
            if node.is_overfull() {
                report.fail(format!("Page {} holds {} items", page_id, node.len()));
            }
            if let Some(recorded) = recorded {
                let actual = node.compute_bbox();
                if node.is_empty() || !recorded.contains(&actual) {
                    report.fail(format!(
                        "Page {} extends beyond its parent entry {}",
                        page_id, recorded
                    ));
                }
            }

            match node {
                Node::Leaf { entries } => report.entries_found += entries.len() as u64,
                Node::Internal { children, .. } => {
                    for child in children {
                        pending.push((
                            child.page_id,
                            expected_level.saturating_sub(1),
                            Some(child.bbox),
                        ));
                    }
                }
            }
        }

        report.orphaned_pages = (1..header.page_count)
            .filter(|&p| !visited[p as usize])
            .collect();
        if !report.orphaned_pages.is_empty() {
            report.fail(format!(
                "{} page(s) unreachable from the root",
                report.orphaned_pages.len()
            ));
        }
        if report.entries_found != header.entry_count {
            report.fail(format!(
                "Found {} entries, header records {}",
                report.entries_found, header.entry_count
            ));
        }

        Ok(report)
    }

    /// Read a node - first checks cache, then decodes it from the file.
    fn read_node(&self, page_id: PageId) -> SindexResult<Arc<Node>> {
        if let Some(node) = self.inner.cache.lock().get(page_id) {
            self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(node);
        }

        self.inner.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.inner.stats.disk_reads.fetch_add(1, Ordering::Relaxed);
        let node = Arc::new(self.inner.storage.read_page(page_id)?);
        self.inner.cache.lock().insert(page_id, node.clone());
        Ok(node)
    }

    /// Recursive search for intersecting entries.
    /// LAZY: Only loads pages that intersect the query box.
    fn search_recursive(
        &self,
        page_id: PageId,
        query: &BoundingBox,
        results: &mut Vec<RowId>,
    ) -> SindexResult<()> {
        let node = self.read_node(page_id)?;

        match node.as_ref() {
            Node::Leaf { entries } => {
                results.extend(
                    entries
                        .iter()
                        .filter(|e| e.bbox.intersects(query))
                        .map(|e| e.id),
                );
            }
            Node::Internal { children, .. } => {
                for child in children {
                    if child.bbox.intersects(query) {
                        self.search_recursive(child.page_id, query, results)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl SpatialRTree for DiskRTree {
    fn find_intersecting_keys(&self, key: &BoundingBox) -> SindexResult<Vec<RowId>> {
        self.check_closed()?;
        key.validate()?;

        let mut results = Vec::new();
        let hits_extent = self.extent().is_some_and(|extent| extent.intersects(key));
        if hits_extent {
            self.search_recursive(self.inner.header.root_page, key, &mut results)?;
        }
        results.sort_unstable();
        Ok(results)
    }

    fn size(&self) -> u64 {
        self.inner.header.entry_count
    }

    fn close(&self) -> SindexResult<()> {
        let mut closed = self.inner.closed.write();
        if !*closed {
            self.inner.cache.lock().clear();
            *closed = true;
        }
        Ok(())
    }
}
