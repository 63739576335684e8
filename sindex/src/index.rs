//! Persistent, lazily built spatial indexes keyed by dataset file.
//!
//! Each dataset gets one index artifact next to it, `<stem><suffix>.idx`.
//! The artifact acts as a file-keyed cache: [`SpatialIndexStore::ensure`]
//! opens it when present and builds it otherwise. Deleting the artifact is
//! the only way to invalidate it; no attempt is made to notice that the
//! dataset changed after the index was built.
//!
//! Builds write into a temporary file in the dataset directory and publish it
//! with an exclusive link, so an interrupted build leaves nothing behind and
//! of several concurrent builders exactly one wins.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
#[cfg(unix)]
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use parking_lot::RwLock;

use crate::bounding_box::BoundingBox;
use crate::bounds_stream::{BoundsStream, LogProgress, ProgressListener};
use crate::config::SindexConfig;
use crate::dataset::{GeoDataset, ParquetDataset, RowId};
use crate::disk_rtree::{DiskRTree, IntegrityReport, RTreeStats};
use crate::errors::{SindexError, SindexResult};
use crate::spatial_rtree::SpatialRTree;

/// Extension of every index artifact.
pub const INDEX_EXTENSION: &str = "idx";

/// Derives the index artifact path for `dataset`: `<dir>/<stem><suffix>.idx`.
///
/// # Examples
///
/// ```rust
/// use std::path::Path;
/// use sindex::index_path_for;
///
/// let path = index_path_for(Path::new("/data/cities.parquet"), "_sindex");
/// assert_eq!(path, Path::new("/data/cities_sindex.idx"));
/// ```
pub fn index_path_for(dataset: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = dataset.file_stem().unwrap_or_default().to_os_string();
    name.push(suffix);
    name.push(".");
    name.push(INDEX_EXTENSION);
    dataset.with_file_name(name)
}

/// Identifies one artifact file, so a deleted and rebuilt index is not
/// mistaken for the one already mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArtifactId {
    len: u64,
    modified: Option<SystemTime>,
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
}

impl ArtifactId {
    fn of(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
            #[cfg(unix)]
            dev: meta.dev(),
            #[cfg(unix)]
            ino: meta.ino(),
        })
    }
}

/// An open, read-only index for one dataset.
///
/// Cheap to clone; clones share the page cache.
#[derive(Clone)]
pub struct IndexHandle {
    tree: DiskRTree,
    dataset: PathBuf,
    artifact: ArtifactId,
}

impl IndexHandle {
    /// Location of the index artifact.
    pub fn path(&self) -> &Path {
        self.tree.path()
    }

    /// Dataset the index was built from.
    pub fn dataset_path(&self) -> &Path {
        &self.dataset
    }

    /// Number of indexed rows.
    pub fn len(&self) -> u64 {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Union of all indexed boxes.
    pub fn extent(&self) -> Option<BoundingBox> {
        self.tree.extent()
    }

    pub fn stats(&self) -> RTreeStats {
        self.tree.stats()
    }

    /// Row ids of every row whose box intersects `bbox`, boundary included,
    /// in ascending order.
    pub fn intersect(&self, bbox: &BoundingBox) -> SindexResult<Vec<RowId>> {
        self.tree.find_intersecting_keys(bbox)
    }

    /// Walks the whole index file and reports its health.
    pub fn check_integrity(&self) -> SindexResult<IntegrityReport> {
        self.tree.check_integrity()
    }

    /// Releases the cached pages. Every clone of this handle fails with
    /// `Closed` afterwards.
    pub fn close(&self) -> SindexResult<()> {
        self.tree.close()
    }
}

/// Owns the index artifacts of any number of datasets.
///
/// Opened handles are memoized per artifact path, so repeated queries against
/// one dataset share a single memory map and page cache. A memoized handle is
/// dropped once its artifact is deleted or replaced on disk.
#[derive(Clone)]
pub struct SpatialIndexStore {
    inner: Arc<SpatialIndexStoreInner>,
}

struct SpatialIndexStoreInner {
    config: SindexConfig,
    index_registry: RwLock<HashMap<PathBuf, IndexHandle>>,
}

impl SpatialIndexStore {
    pub fn new(config: SindexConfig) -> Self {
        Self {
            inner: Arc::new(SpatialIndexStoreInner {
                config,
                index_registry: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &SindexConfig {
        &self.inner.config
    }

    /// Index artifact path for `dataset` under this store's suffix.
    pub fn index_path(&self, dataset: &Path) -> PathBuf {
        index_path_for(dataset, self.inner.config.index_suffix())
    }

    /// Opens the index of the GeoParquet file at `file`, building it first if
    /// it does not exist yet.
    ///
    /// The dataset is only opened when a build is needed.
    pub fn ensure(&self, file: impl AsRef<Path>) -> SindexResult<IndexHandle> {
        let file = file.as_ref();
        if let Some(handle) = self.lookup(file) {
            return Ok(handle);
        }

        let index_path = self.index_path(file);
        if index_path.exists() {
            log::debug!("Opening existing spatial index at {:?}", index_path);
            return self.open_and_register(file, index_path);
        }
        let dataset = ParquetDataset::open(file, self.inner.config.geometry_column())?;
        self.ensure_dataset(&dataset)
    }

    /// Opens the index of `dataset`, building it first if it does not exist.
    ///
    /// A build drains the whole geometry column once and blocks until the
    /// artifact is published.
    ///
    /// # Errors
    ///
    /// - `DatasetUnavailable` if a build is needed and the dataset cannot be scanned
    /// - `IndexBuildFailed` if the scan or the write fails part way; nothing is published
    /// - `IndexCorrupt` if an existing artifact cannot be opened; it is left in place
    pub fn ensure_dataset(&self, dataset: &dyn GeoDataset) -> SindexResult<IndexHandle> {
        if let Some(handle) = self.lookup(dataset.path()) {
            return Ok(handle);
        }

        let index_path = self.index_path(dataset.path());
        if !index_path.exists() {
            self.build(dataset, &index_path)?;
        } else {
            log::debug!("Opening existing spatial index at {:?}", index_path);
        }

        self.open_and_register(dataset.path(), index_path)
    }

    /// Row ids intersecting `bbox` in the index behind `handle`.
    pub fn intersect(&self, handle: &IndexHandle, bbox: &BoundingBox) -> SindexResult<Vec<RowId>> {
        handle.intersect(bbox)
    }

    /// Checks the integrity of the existing index of `file`.
    ///
    /// Never builds; fails with `InvalidOperation` when there is no index.
    pub fn verify(&self, file: impl AsRef<Path>) -> SindexResult<IntegrityReport> {
        let file = file.as_ref();
        let handle = match self.lookup(file) {
            Some(handle) => handle,
            None => {
                let index_path = self.index_path(file);
                if !index_path.exists() {
                    return Err(SindexError::InvalidOperation(format!(
                        "no spatial index for {}",
                        file.display()
                    )));
                }
                self.open_handle(file, &index_path)?
            }
        };
        handle.check_integrity()
    }

    /// Deletes the index artifact of `file`, if any.
    ///
    /// Returns whether an artifact was removed. Handles obtained earlier keep
    /// working against the old file contents until dropped.
    pub fn drop_index(&self, file: impl AsRef<Path>) -> SindexResult<bool> {
        let index_path = self.index_path(file.as_ref());
        self.inner.index_registry.write().remove(&index_path);

        match std::fs::remove_file(&index_path) {
            Ok(()) => {
                log::debug!("Dropped spatial index at {:?}", index_path);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SindexError::Io(e)),
        }
    }

    /// Closes every memoized handle and forgets it.
    ///
    /// Later calls to [`SpatialIndexStore::ensure`] reopen the artifacts.
    pub fn close(&self) -> SindexResult<()> {
        let handles: Vec<IndexHandle> = self
            .inner
            .index_registry
            .write()
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in handles {
            handle.close()?;
        }
        Ok(())
    }

    /// Returns the memoized handle of `dataset` if the artifact on disk is
    /// still the file it was opened from.
    fn lookup(&self, dataset: &Path) -> Option<IndexHandle> {
        let index_path = self.index_path(dataset);
        let cached = self.inner.index_registry.read().get(&index_path).cloned()?;

        match ArtifactId::of(&index_path) {
            Ok(current) if current == cached.artifact => Some(cached),
            Ok(_) => {
                log::debug!("Spatial index at {:?} was replaced, reopening it", index_path);
                self.forget(&index_path, &cached);
                None
            }
            Err(_) => {
                log::debug!("Spatial index at {:?} was deleted, forgetting it", index_path);
                self.forget(&index_path, &cached);
                None
            }
        }
    }

    /// Removes `stale` from the registry unless another thread already
    /// replaced it.
    fn forget(&self, index_path: &Path, stale: &IndexHandle) {
        let mut registry = self.inner.index_registry.write();
        if registry
            .get(index_path)
            .is_some_and(|current| current.artifact == stale.artifact)
        {
            registry.remove(index_path);
        }
    }

    fn open_and_register(&self, dataset: &Path, index_path: PathBuf) -> SindexResult<IndexHandle> {
        let handle = self.open_handle(dataset, &index_path)?;
        self.inner
            .index_registry
            .write()
            .insert(index_path, handle.clone());
        Ok(handle)
    }

    fn open_handle(&self, dataset: &Path, index_path: &Path) -> SindexResult<IndexHandle> {
        // Taken before mapping: a file swapped in between shows up as a
        // mismatch on the next lookup and is reopened.
        let artifact =
            ArtifactId::of(index_path).map_err(|e| SindexError::index_corrupt(index_path, e))?;
        let tree = DiskRTree::open_with_cache_size(index_path, self.inner.config.cache_pages())
            .map_err(|e| match e {
                SindexError::IndexCorrupt { .. } => e,
                other => SindexError::index_corrupt(index_path, other),
            })?;
        Ok(IndexHandle {
            tree,
            dataset: dataset.to_path_buf(),
            artifact,
        })
    }

    fn build(&self, dataset: &dyn GeoDataset, index_path: &Path) -> SindexResult<()> {
        log::debug!("Creating new spatial index at {:?}", index_path);
        let started = Instant::now();

        let log_progress = LogProgress;
        let progress: &dyn ProgressListener = match self.inner.config.progress() {
            Some(listener) => listener.as_ref(),
            None => &log_progress,
        };

        let stream = BoundsStream::open(dataset, self.inner.config.batch_size(), Some(progress))?;
        let entries = stream
            .collect::<SindexResult<Vec<_>>>()
            .map_err(|e| SindexError::build_failed(index_path, e))?;

        let dir = match index_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".sindex-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| SindexError::build_failed(index_path, e.into()))?;

        let stats = DiskRTree::bulk_load(temp.path(), entries)
            .map_err(|e| SindexError::build_failed(index_path, e))?;

        match temp.persist_noclobber(index_path) {
            Ok(_) => {
                log::info!(
                    "Built spatial index {:?}: {} entries, height {}, {} bytes in {:?}",
                    index_path,
                    stats.entries,
                    stats.height,
                    stats.file_bytes,
                    started.elapsed()
                );
                Ok(())
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                // The temp file is removed when `e.file` drops.
                log::debug!(
                    "Spatial index {:?} was published by another builder, using it",
                    index_path
                );
                Ok(())
            }
            Err(e) => Err(SindexError::build_failed(index_path, e.error.into())),
        }
    }
}
