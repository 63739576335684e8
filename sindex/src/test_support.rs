//! Fixtures shared by the unit tests.

use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BinaryArray, Int64Array, UInt64Array};
use arrow::compute::{concat, take};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use geo::{Geometry, Point};
use geozero::{CoordDimensions, ToWkb};
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;

use crate::crs::GEO_METADATA_KEY;
use crate::dataset::{check_row_ids, GeoDataset, GeometryBatches, RowId};
use crate::errors::{SindexError, SindexResult};

const GEO_METADATA: &str = r#"{"version":"1.1.0","primary_column":"geometry","columns":{"geometry":{"encoding":"WKB","geometry_types":["Point"],"crs":{"id":{"authority":"EPSG","code":4326}}}}}"#;

/// Routes `log` records to the test harness output.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn to_wkb(geometry: &Geometry<f64>) -> Vec<u8> {
    geometry.to_wkb(CoordDimensions::xy()).unwrap()
}

/// A WKB column of points.
pub fn point_batch(points: &[(f64, f64)]) -> ArrayRef {
    let encoded: Vec<Vec<u8>> = points
        .iter()
        .map(|&(x, y)| to_wkb(&Point::new(x, y).into()))
        .collect();
    Arc::new(BinaryArray::from_iter_values(encoded))
}

pub struct PointRow {
    pub id: i64,
    pub x: f64,
    pub y: f64,
}

impl PointRow {
    pub fn new(id: i64, x: f64, y: f64) -> Self {
        Self { id, x, y }
    }
}

/// Writes a GeoParquet file with an `id` column and a WKB `geometry` column.
pub fn write_points(
    path: &Path,
    rows: &[PointRow],
    row_group_size: usize,
) -> Result<(), Box<dyn Error>> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("geometry", DataType::Binary, true),
    ]));
    let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.id)));
    let points: Vec<(f64, f64)> = rows.iter().map(|r| (r.x, r.y)).collect();
    let batch = RecordBatch::try_new(schema.clone(), vec![ids, point_batch(&points)])?;

    let props = WriterProperties::builder()
        .set_max_row_group_size(row_group_size)
        .set_key_value_metadata(Some(vec![KeyValue::new(
            GEO_METADATA_KEY.to_string(),
            GEO_METADATA.to_string(),
        )]))
        .build();
    let mut writer = ArrowWriter::try_new(File::create(path)?, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// In-memory dataset made of prepared geometry batches.
///
/// Counts full scans and takes so tests can assert when the dataset was
/// actually read.
pub struct StubDataset {
    path: PathBuf,
    batches: Vec<ArrayRef>,
    available: bool,
    geo_metadata: Option<String>,
    scans: AtomicUsize,
    takes: AtomicUsize,
}

impl StubDataset {
    pub fn from_batches(batches: Vec<ArrayRef>) -> Self {
        Self {
            path: PathBuf::from("stub.parquet"),
            batches,
            available: true,
            geo_metadata: Some(GEO_METADATA.to_string()),
            scans: AtomicUsize::new(0),
            takes: AtomicUsize::new(0),
        }
    }

    /// A dataset whose row count and scans always fail.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::from_batches(Vec::new())
        }
    }

    pub fn at(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    pub fn without_crs(mut self) -> Self {
        self.geo_metadata = None;
        self
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn takes(&self) -> usize {
        self.takes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> SindexResult<()> {
        if self.available {
            Ok(())
        } else {
            Err(SindexError::dataset_unavailable(&self.path, "stub is offline"))
        }
    }
}

impl GeoDataset for StubDataset {
    fn path(&self) -> &Path {
        &self.path
    }

    fn total_rows(&self) -> SindexResult<u64> {
        self.check_available()?;
        Ok(self.batches.iter().map(|b| b.len() as u64).sum())
    }

    fn geometry_column(&self) -> &str {
        "geometry"
    }

    fn geometry_batches(&self, _batch_size: usize) -> SindexResult<GeometryBatches<'_>> {
        self.check_available()?;
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.batches.iter().cloned().map(Ok)))
    }

    fn take(&self, row_ids: &[RowId]) -> SindexResult<RecordBatch> {
        check_row_ids(row_ids, self.total_rows()?)?;
        self.takes.fetch_add(1, Ordering::SeqCst);

        let column: ArrayRef = if self.batches.is_empty() {
            Arc::new(BinaryArray::from_iter_values(Vec::<Vec<u8>>::new()))
        } else {
            let parts: Vec<&dyn Array> = self.batches.iter().map(|b| b.as_ref()).collect();
            concat(&parts).map_err(|e| SindexError::dataset_unavailable(&self.path, e))?
        };
        let indices = UInt64Array::from_iter_values(row_ids.iter().copied());
        let taken =
            take(&column, &indices, None).map_err(|e| SindexError::dataset_unavailable(&self.path, e))?;

        let schema = Arc::new(Schema::new(vec![Field::new(
            "geometry",
            taken.data_type().clone(),
            true,
        )]));
        RecordBatch::try_new(schema, vec![taken])
            .map_err(|e| SindexError::dataset_unavailable(&self.path, e))
    }

    fn geo_metadata(&self) -> Option<String> {
        self.geo_metadata.clone()
    }
}
