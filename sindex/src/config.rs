//! Configuration for index construction and range queries.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::bounds_stream::ProgressListener;
use crate::disk_rtree::DEFAULT_CACHE_PAGES;
use crate::errors::{SindexError, SindexResult};

/// Rows decoded per batch while building an index.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Name of the WKB geometry column.
pub const DEFAULT_GEOMETRY_COLUMN: &str = "geometry";

/// Appended to the dataset's file stem to name its index artifact.
pub const DEFAULT_INDEX_SUFFIX: &str = "_sindex";

/// Settings shared by the index store, the random reader and the query service.
///
/// Create one through [`SindexConfig::builder`]; `SindexConfig::default()`
/// gives the stock settings. Cloning is cheap.
///
/// # Examples
///
/// ```rust
/// use sindex::SindexConfig;
///
/// let config = SindexConfig::builder()
///     .batch_size(50_000)
///     .geometry_column("geom")
///     .build()
///     .unwrap();
/// assert_eq!(config.batch_size(), 50_000);
/// ```
#[derive(Clone)]
pub struct SindexConfig {
    batch_size: usize,
    geometry_column: String,
    index_suffix: String,
    cache_pages: usize,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl SindexConfig {
    /// Creates a new builder with default settings.
    pub fn builder() -> SindexConfigBuilder {
        SindexConfigBuilder::new()
    }

    /// Rows per batch while streaming bounds out of the dataset.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Name of the WKB encoded geometry column.
    pub fn geometry_column(&self) -> &str {
        &self.geometry_column
    }

    /// Suffix used to derive `<stem><suffix>.idx` from a dataset path.
    pub fn index_suffix(&self) -> &str {
        &self.index_suffix
    }

    /// Number of decoded index pages kept in the LRU cache per open index.
    pub fn cache_pages(&self) -> usize {
        self.cache_pages
    }

    /// Observer notified while an index is being built, if any.
    pub fn progress(&self) -> Option<&Arc<dyn ProgressListener>> {
        self.progress.as_ref()
    }
}

impl Default for SindexConfig {
    fn default() -> Self {
        SindexConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            geometry_column: DEFAULT_GEOMETRY_COLUMN.to_string(),
            index_suffix: DEFAULT_INDEX_SUFFIX.to_string(),
            cache_pages: DEFAULT_CACHE_PAGES,
            progress: None,
        }
    }
}

impl Debug for SindexConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SindexConfig")
            .field("batch_size", &self.batch_size)
            .field("geometry_column", &self.geometry_column)
            .field("index_suffix", &self.index_suffix)
            .field("cache_pages", &self.cache_pages)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Fluent builder for [`SindexConfig`].
pub struct SindexConfigBuilder {
    config: SindexConfig,
}

impl SindexConfigBuilder {
    pub fn new() -> SindexConfigBuilder {
        SindexConfigBuilder {
            config: SindexConfig::default(),
        }
    }

    /// Sets the number of rows read per batch during index builds.
    ///
    /// Larger batches amortize per-batch overhead at the cost of memory.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn geometry_column(mut self, column: impl Into<String>) -> Self {
        self.config.geometry_column = column.into();
        self
    }

    pub fn index_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.index_suffix = suffix.into();
        self
    }

    pub fn cache_pages(mut self, cache_pages: usize) -> Self {
        self.config.cache_pages = cache_pages;
        self
    }

    /// Registers an observer for build progress.
    pub fn progress(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.config.progress = Some(listener);
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for a zero batch size or cache size, and for
    /// an empty geometry column name or index suffix.
    pub fn build(self) -> SindexResult<SindexConfig> {
        let config = self.config;
        if config.batch_size == 0 {
            return Err(SindexError::InvalidOperation(
                "batch size must be greater than zero".into(),
            ));
        }
        if config.cache_pages == 0 {
            return Err(SindexError::InvalidOperation(
                "cache size must be greater than zero".into(),
            ));
        }
        if config.geometry_column.is_empty() {
            return Err(SindexError::InvalidOperation(
                "geometry column name must not be empty".into(),
            ));
        }
        if config.index_suffix.is_empty() {
            return Err(SindexError::InvalidOperation(
                "index suffix must not be empty".into(),
            ));
        }
        Ok(config)
    }
}

impl Default for SindexConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
