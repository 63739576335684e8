//! Random-access reads of whole rows by row id.

use std::path::Path;

use arrow::record_batch::RecordBatch;
use geo::Geometry;

use crate::bounding_box::BoundingBox;
use crate::config::SindexConfig;
use crate::crs::Crs;
use crate::dataset::{check_row_ids, GeoDataset, ParquetDataset, RowId};
use crate::errors::{SindexError, SindexResult};
use crate::geometry::{decode_geometries, geometry_bounds};

/// Rows read from a dataset, in request order.
///
/// Row `i` of every accessor belongs together: `row_ids()[i]` was decoded
/// into `geometries()[i]` with box `bounds()[i]`, and its other columns are
/// row `i` of `attributes()`.
#[derive(Debug, Clone)]
pub struct QueryResult {
    row_ids: Vec<RowId>,
    geometries: Vec<Geometry<f64>>,
    bounds: Vec<BoundingBox>,
    attributes: RecordBatch,
    crs: Crs,
}

impl QueryResult {
    pub fn row_ids(&self) -> &[RowId] {
        &self.row_ids
    }

    pub fn geometries(&self) -> &[Geometry<f64>] {
        &self.geometries
    }

    /// Bounding box of each geometry.
    pub fn bounds(&self) -> &[BoundingBox] {
        &self.bounds
    }

    /// All non-geometry columns.
    pub fn attributes(&self) -> &RecordBatch {
        &self.attributes
    }

    /// Coordinate reference system of every geometry in the result.
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn len(&self) -> usize {
        self.row_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }

    /// Iterates `(row id, geometry)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (RowId, &Geometry<f64>)> + '_ {
        self.row_ids.iter().copied().zip(self.geometries.iter())
    }
}

/// Materializes rows by id together with their decoded geometry and CRS.
#[derive(Debug, Clone)]
pub struct ColumnarRandomReader {
    config: SindexConfig,
}

impl ColumnarRandomReader {
    pub fn new(config: SindexConfig) -> Self {
        Self { config }
    }

    /// Reads `row_ids` from the GeoParquet file at `file`.
    pub fn take(&self, file: impl AsRef<Path>, row_ids: &[RowId]) -> SindexResult<QueryResult> {
        let dataset = ParquetDataset::open(file, self.config.geometry_column())?;
        self.take_from(&dataset, row_ids)
    }

    /// Reads `row_ids` from `dataset`, preserving order and duplicates.
    ///
    /// An empty id list gives an empty result. The CRS is resolved and every
    /// id is bounds checked before any row is read.
    ///
    /// # Errors
    ///
    /// - `MissingCrs` if the dataset carries no CRS for its geometry column
    /// - `InvalidRowId` for the first id outside `[0, total_rows)`
    /// - `CorruptGeometry` if a requested geometry is null, empty or undecodable
    pub fn take_from(&self, dataset: &dyn GeoDataset, row_ids: &[RowId]) -> SindexResult<QueryResult> {
        let crs = Crs::from_geo_metadata(
            dataset.geo_metadata().as_deref(),
            dataset.geometry_column(),
            dataset.path(),
        )?;
        check_row_ids(row_ids, dataset.total_rows()?)?;

        let batch = dataset.take(row_ids)?;
        if batch.num_rows() != row_ids.len() {
            return Err(SindexError::dataset_unavailable(
                dataset.path(),
                format!("requested {} rows, read {}", row_ids.len(), batch.num_rows()),
            ));
        }

        let schema = batch.schema();
        let geometry_index = schema.index_of(dataset.geometry_column()).map_err(|_| {
            SindexError::dataset_unavailable(
                dataset.path(),
                format!("no geometry column '{}'", dataset.geometry_column()),
            )
        })?;

        let geometries = decode_geometries(batch.column(geometry_index), row_ids)?;
        let bounds = geometries
            .iter()
            .zip(row_ids)
            .map(|(geometry, &row_id)| geometry_bounds(geometry, row_id))
            .collect::<SindexResult<Vec<_>>>()?;

        let attribute_columns: Vec<usize> = (0..schema.fields().len())
            .filter(|&i| i != geometry_index)
            .collect();
        let attributes = batch
            .project(&attribute_columns)
            .map_err(|e| SindexError::dataset_unavailable(dataset.path(), e))?;

        Ok(QueryResult {
            row_ids: row_ids.to_vec(),
            geometries,
            bounds,
            attributes,
            crs,
        })
    }
}
