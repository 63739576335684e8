//! Bounding box range queries over GeoParquet files.

use std::path::Path;
use std::time::Instant;

use log::info;

use crate::bounding_box::BoundingBox;
use crate::config::SindexConfig;
use crate::dataset::{GeoDataset, ParquetDataset};
use crate::errors::SindexResult;
use crate::index::SpatialIndexStore;
use crate::reader::{ColumnarRandomReader, QueryResult};

/// Answers "which rows intersect this box" for any number of datasets.
///
/// Each query resolves (and on first use builds) the dataset's index, asks
/// it for candidate row ids, then reads exactly those rows. Results are in
/// ascending row id order, so identical queries against an unchanged dataset
/// return identical results.
///
/// # Examples
///
/// ```rust,no_run
/// use sindex::{BoundingBox, RangeQueryService, SindexConfig};
///
/// let service = RangeQueryService::new(SindexConfig::default());
/// let result = service
///     .query("cities.parquet", &BoundingBox::new(4.0, 50.0, 6.0, 52.0))
///     .unwrap();
/// println!("{} rows in {}", result.len(), result.crs());
/// ```
#[derive(Clone)]
pub struct RangeQueryService {
    store: SpatialIndexStore,
    reader: ColumnarRandomReader,
}

impl RangeQueryService {
    pub fn new(config: SindexConfig) -> Self {
        Self {
            reader: ColumnarRandomReader::new(config.clone()),
            store: SpatialIndexStore::new(config),
        }
    }

    /// The store holding this service's indexes.
    pub fn store(&self) -> &SpatialIndexStore {
        &self.store
    }

    /// Rows of the GeoParquet file at `file` whose geometry's bounding box
    /// intersects `bbox`, boundary included.
    pub fn query(&self, file: impl AsRef<Path>, bbox: &BoundingBox) -> SindexResult<QueryResult> {
        bbox.validate()?;
        let dataset = ParquetDataset::open(file, self.store.config().geometry_column())?;
        self.query_dataset(&dataset, bbox)
    }

    /// Same as [`RangeQueryService::query`] for an already opened dataset.
    ///
    /// Either the whole result is returned or an error; never a partial result.
    pub fn query_dataset(
        &self,
        dataset: &dyn GeoDataset,
        bbox: &BoundingBox,
    ) -> SindexResult<QueryResult> {
        bbox.validate()?;

        let started = Instant::now();
        let handle = self.store.ensure_dataset(dataset)?;
        let row_ids = handle.intersect(bbox)?;
        let index_time = started.elapsed();

        let started = Instant::now();
        let result = self.reader.take_from(dataset, &row_ids)?;
        let read_time = started.elapsed();

        info!(
            "Query {} on {}: {} rows, index {:?}, read {:?}",
            bbox,
            dataset.path().display(),
            result.len(),
            index_time,
            read_time
        );
        Ok(result)
    }
}
