//! Columnar dataset access.
//!
//! The index only needs three things from a dataset: its row count, a scan of
//! the geometry column in fixed-size batches, and a random-access "take" of
//! whole rows by position. [`GeoDataset`] captures exactly that, and
//! [`ParquetDataset`] implements it on top of the Arrow Parquet reader.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{ArrayRef, UInt64Array};
use arrow::compute::{concat_batches, take_record_batch};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{
    ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder, RowSelection,
    RowSelector,
};
use parquet::arrow::ProjectionMask;

use crate::crs::GEO_METADATA_KEY;
use crate::errors::{SindexError, SindexResult};

/// Physical position of a row in the dataset's full scan order.
pub type RowId = u64;

/// Batches of the encoded geometry column, in scan order.
pub type GeometryBatches<'a> = Box<dyn Iterator<Item = SindexResult<ArrayRef>> + 'a>;

/// A read-only columnar dataset with a WKB geometry column.
///
/// Implementations must stream geometry batches in strictly increasing,
/// gap-free row order; the index derives row ids from that order.
pub trait GeoDataset {
    /// Location of the dataset; the index artifact lives next to it.
    fn path(&self) -> &Path;

    /// Total number of rows.
    fn total_rows(&self) -> SindexResult<u64>;

    /// Name of the geometry column.
    fn geometry_column(&self) -> &str;

    /// Streams the geometry column in batches of at most `batch_size` rows.
    fn geometry_batches(&self, batch_size: usize) -> SindexResult<GeometryBatches<'_>>;

    /// Reads all columns of the given rows, in request order, duplicates kept.
    fn take(&self, row_ids: &[RowId]) -> SindexResult<RecordBatch>;

    /// Raw value of the GeoParquet `geo` metadata key, if present.
    fn geo_metadata(&self) -> Option<String>;
}

/// Fails with `InvalidRowId` on the first id outside `[0, total_rows)`.
pub fn check_row_ids(row_ids: &[RowId], total_rows: u64) -> SindexResult<()> {
    match row_ids.iter().find(|&&id| id >= total_rows) {
        Some(&row_id) => Err(SindexError::InvalidRowId {
            row_id,
            total_rows,
        }),
        None => Ok(()),
    }
}

/// A GeoParquet file.
///
/// The footer is parsed once on open and reused by every scan and take.
pub struct ParquetDataset {
    path: PathBuf,
    geometry_column: String,
    metadata: ArrowReaderMetadata,
}

impl ParquetDataset {
    /// Opens a Parquet file and reads its footer.
    ///
    /// # Errors
    ///
    /// `DatasetUnavailable` if the file cannot be opened or is not Parquet.
    pub fn open(path: impl AsRef<Path>, geometry_column: &str) -> SindexResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| SindexError::dataset_unavailable(&path, e))?;
        let metadata = ArrowReaderMetadata::load(&file, ArrowReaderOptions::default())
            .map_err(|e| SindexError::dataset_unavailable(&path, e))?;

        Ok(Self {
            path,
            geometry_column: geometry_column.to_string(),
            metadata,
        })
    }

    /// Arrow schema of the file.
    pub fn schema(&self) -> SchemaRef {
        self.metadata.schema().clone()
    }

    fn reader_builder(&self) -> SindexResult<ParquetRecordBatchReaderBuilder<File>> {
        let file =
            File::open(&self.path).map_err(|e| SindexError::dataset_unavailable(&self.path, e))?;
        Ok(ParquetRecordBatchReaderBuilder::new_with_metadata(
            file,
            self.metadata.clone(),
        ))
    }

    fn geometry_index(&self) -> SindexResult<usize> {
        self.metadata
            .schema()
            .index_of(&self.geometry_column)
            .map_err(|_| {
                SindexError::dataset_unavailable(
                    &self.path,
                    format!("no geometry column '{}'", self.geometry_column),
                )
            })
    }
}

impl GeoDataset for ParquetDataset {
    fn path(&self) -> &Path {
        &self.path
    }

    fn total_rows(&self) -> SindexResult<u64> {
        let num_rows = self.metadata.metadata().file_metadata().num_rows();
        u64::try_from(num_rows).map_err(|_| {
            SindexError::dataset_unavailable(&self.path, format!("invalid row count {}", num_rows))
        })
    }

    fn geometry_column(&self) -> &str {
        &self.geometry_column
    }

    fn geometry_batches(&self, batch_size: usize) -> SindexResult<GeometryBatches<'_>> {
        let column = self.geometry_index()?;
        let builder = self.reader_builder()?;
        let projection = ProjectionMask::roots(builder.parquet_schema(), [column]);
        let reader = builder
            .with_projection(projection)
            .with_batch_size(batch_size)
            .build()
            .map_err(|e| SindexError::dataset_unavailable(&self.path, e))?;

        let path = self.path.clone();
        Ok(Box::new(reader.map(move |batch| {
            batch
                .map(|batch| batch.column(0).clone())
                .map_err(|e| SindexError::dataset_unavailable(&path, e))
        })))
    }

    fn take(&self, row_ids: &[RowId]) -> SindexResult<RecordBatch> {
        let total_rows = self.total_rows()?;
        check_row_ids(row_ids, total_rows)?;
        if row_ids.is_empty() {
            return Ok(RecordBatch::new_empty(self.schema()));
        }

        // Parquet row selections are ascending and unique, so read the sorted
        // distinct rows once and reorder them afterwards.
        let mut distinct = row_ids.to_vec();
        distinct.sort_unstable();
        distinct.dedup();

        let reader = self
            .reader_builder()?
            .with_row_selection(row_selection(&distinct, total_rows))
            .with_batch_size(distinct.len())
            .build()
            .map_err(|e| SindexError::dataset_unavailable(&self.path, e))?;

        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SindexError::dataset_unavailable(&self.path, e))?;
        let selected = concat_batches(&self.schema(), &batches)
            .map_err(|e| SindexError::dataset_unavailable(&self.path, e))?;

        if selected.num_rows() != distinct.len() {
            return Err(SindexError::dataset_unavailable(
                &self.path,
                format!(
                    "expected {} rows from take, read {}",
                    distinct.len(),
                    selected.num_rows()
                ),
            ));
        }

        let positions = UInt64Array::from_iter_values(
            row_ids
                .iter()
                .map(|id| distinct.partition_point(|d| d < id) as u64),
        );
        take_record_batch(&selected, &positions)
            .map_err(|e| SindexError::dataset_unavailable(&self.path, e))
    }

    fn geo_metadata(&self) -> Option<String> {
        self.metadata
            .metadata()
            .file_metadata()
            .key_value_metadata()?
            .iter()
            .find(|kv| kv.key == GEO_METADATA_KEY)
            .and_then(|kv| kv.value.clone())
    }
}

/// Builds a selection over `[0, total_rows)` covering exactly `sorted_ids`.
fn row_selection(sorted_ids: &[RowId], total_rows: u64) -> RowSelection {
    let mut selectors = Vec::new();
    let mut cursor: u64 = 0;
    let mut i = 0;

    while i < sorted_ids.len() {
        let start = sorted_ids[i];
        let mut end = start + 1;
        i += 1;
        while i < sorted_ids.len() && sorted_ids[i] == end {
            end += 1;
            i += 1;
        }

        if start > cursor {
            selectors.push(RowSelector::skip((start - cursor) as usize));
        }
        selectors.push(RowSelector::select((end - start) as usize));
        cursor = end;
    }

    if total_rows > cursor {
        selectors.push(RowSelector::skip((total_rows - cursor) as usize));
    }
    RowSelection::from(selectors)
}
