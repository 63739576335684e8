use arrow::array::{ArrayRef, BinaryArray, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use geo::{BoundingRect, Geometry, LineString, Point, Polygon};
use geozero::{CoordDimensions, ToWkb};
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use sindex::{BoundingBox, RangeQueryService, RowId, SindexConfig, SindexError, SindexResult};
use std::backtrace::Backtrace;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{env, fs, thread};

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread to avoid thread exhaustion when running many tests in parallel.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> SindexResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> SindexResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> SindexResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => match after(ctx) {
                        Ok(_) => Ok(()),
                        Err(e) => Err((format!("After run failed: {:?}", e), backtrace.to_string())),
                    },
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_error = Some(e.clone());
                last_backtrace = Some(bt);
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Error: {}", e);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    format!("Unknown panic: {:?}", panic_err.type_id())
                };

                let message = format!("Panic: {}", err_msg);
                last_backtrace = Some(Backtrace::capture().to_string());

                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("{}", message);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
                last_error = Some(message);
            }
        }
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// A scratch directory plus a query service with default settings.
#[derive(Clone)]
pub struct TestContext {
    dir: PathBuf,
    service: RangeQueryService,
}

impl TestContext {
    pub fn new(dir: PathBuf, service: RangeQueryService) -> Self {
        Self { dir, service }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn service(&self) -> RangeQueryService {
        self.service.clone()
    }

    /// Path of a file named `name` inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

pub fn random_dir() -> PathBuf {
    env::temp_dir().join(format!("sindex-{}", uuid::Uuid::new_v4()))
}

pub fn create_test_context() -> SindexResult<TestContext> {
    create_test_context_with(SindexConfig::default())
}

pub fn create_test_context_with(config: SindexConfig) -> SindexResult<TestContext> {
    let dir = random_dir();
    fs::create_dir_all(&dir)?;
    Ok(TestContext::new(dir, RangeQueryService::new(config)))
}

pub fn cleanup(ctx: TestContext) -> SindexResult<()> {
    if ctx.dir().exists() {
        fs::remove_dir_all(ctx.dir())?;
    }
    Ok(())
}

/// Files left behind by interrupted or lost index builds.
pub fn leftover_temp_files(dir: &Path) -> SindexResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.starts_with(".sindex-") && name.ends_with(".tmp") {
            found.push(path);
        }
    }
    Ok(found)
}

/// One row of a fixture dataset.
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: i64,
    pub name: String,
    pub geometry: Geometry<f64>,
}

impl Feature {
    pub fn new(id: i64, geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            id,
            name: format!("feature-{}", id),
            geometry: geometry.into(),
        }
    }

    pub fn point(id: i64, x: f64, y: f64) -> Self {
        Self::new(id, Point::new(x, y))
    }

    pub fn bounds(&self) -> BoundingBox {
        self.geometry
            .bounding_rect()
            .map(BoundingBox::from)
            .unwrap_or_else(|| panic!("feature {} has an empty geometry", self.id))
    }
}

fn to_io(e: impl std::fmt::Display) -> SindexError {
    SindexError::Io(io::Error::other(e.to_string()))
}

/// Writes `features` as GeoParquet with columns `id`, `name` and a WKB
/// `geometry` column tagged with `crs` (EPSG:4326 when `Some("EPSG:4326")`).
///
/// With `crs` set to `None` the `geo` metadata is omitted entirely.
pub fn write_geoparquet(
    path: &Path,
    features: &[Feature],
    row_group_size: usize,
    crs: Option<&str>,
) -> SindexResult<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("geometry", DataType::Binary, true),
    ]));

    let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(features.iter().map(|f| f.id)));
    let names: ArrayRef = Arc::new(StringArray::from_iter_values(
        features.iter().map(|f| f.name.as_str()),
    ));
    let wkb = features
        .iter()
        .map(|f| f.geometry.to_wkb(CoordDimensions::xy()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_io)?;
    let geometries: ArrayRef = Arc::new(BinaryArray::from_iter_values(wkb));
    let batch = RecordBatch::try_new(schema.clone(), vec![ids, names, geometries]).map_err(to_io)?;

    let mut props = WriterProperties::builder().set_max_row_group_size(row_group_size.max(1));
    if let Some(crs) = crs {
        let (authority, code) = crs.split_once(':').unwrap_or(("EPSG", crs));
        props = props.set_key_value_metadata(Some(vec![KeyValue::new(
            "geo".to_string(),
            geo_metadata(authority, code),
        )]));
    }

    let mut writer =
        ArrowWriter::try_new(File::create(path)?, schema, Some(props.build())).map_err(to_io)?;
    writer.write(&batch).map_err(to_io)?;
    writer.close().map_err(to_io)?;
    Ok(())
}

/// Writes raw geometry payloads, nulls included, next to an `id` column.
pub fn write_raw_geometries(path: &Path, payloads: &[Option<Vec<u8>>]) -> SindexResult<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("geometry", DataType::Binary, true),
    ]));
    let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(0..payloads.len() as i64));
    let geometries: ArrayRef = Arc::new(BinaryArray::from_iter(payloads.iter().cloned()));
    let batch = RecordBatch::try_new(schema.clone(), vec![ids, geometries]).map_err(to_io)?;

    let props = WriterProperties::builder()
        .set_key_value_metadata(Some(vec![KeyValue::new(
            "geo".to_string(),
            geo_metadata("EPSG", "4326"),
        )]))
        .build();
    let mut writer = ArrowWriter::try_new(File::create(path)?, schema, Some(props)).map_err(to_io)?;
    writer.write(&batch).map_err(to_io)?;
    writer.close().map_err(to_io)?;
    Ok(())
}

/// WKB encoding of `geometry`.
pub fn wkb(geometry: &Geometry<f64>) -> Vec<u8> {
    geometry
        .to_wkb(CoordDimensions::xy())
        .unwrap_or_else(|e| panic!("cannot encode {:?}: {}", geometry, e))
}

fn geo_metadata(authority: &str, code: &str) -> String {
    json!({
        "version": "1.1.0",
        "primary_column": "geometry",
        "columns": {
            "geometry": {
                "encoding": "WKB",
                "geometry_types": [],
                "crs": { "id": { "authority": authority, "code": code } }
            }
        }
    })
    .to_string()
}

/// Uniformly scattered points in `[0, extent)²`.
pub fn random_points(count: usize, extent: f64, seed: u64) -> Vec<Feature> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            Feature::point(
                i as i64,
                rng.random_range(0.0..extent),
                rng.random_range(0.0..extent),
            )
        })
        .collect()
}

/// Points, line strings and triangles in `[0, extent)²`.
pub fn random_shapes(count: usize, extent: f64, seed: u64) -> Vec<Feature> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let x = rng.random_range(0.0..extent);
            let y = rng.random_range(0.0..extent);
            let w = rng.random_range(0.0..extent / 50.0);
            let h = rng.random_range(0.0..extent / 50.0);
            let geometry: Geometry<f64> = match i % 3 {
                0 => Point::new(x, y).into(),
                1 => LineString::from(vec![(x, y), (x + w, y + h)]).into(),
                _ => Polygon::new(
                    LineString::from(vec![(x, y), (x + w, y), (x, y + h), (x, y)]),
                    vec![],
                )
                .into(),
            };
            Feature::new(i as i64, geometry)
        })
        .collect()
}

/// A random, valid query box inside `[0, extent)²` at most `max_size` wide.
pub fn random_box(rng: &mut StdRng, extent: f64, max_size: f64) -> BoundingBox {
    let x = rng.random_range(0.0..extent);
    let y = rng.random_range(0.0..extent);
    let w = rng.random_range(0.0..max_size);
    let h = rng.random_range(0.0..max_size);
    BoundingBox::new(x, y, x + w, y + h)
}

/// Expected answer of a range query, computed by checking every feature.
pub fn brute_force(features: &[Feature], bbox: &BoundingBox) -> Vec<RowId> {
    features
        .iter()
        .enumerate()
        .filter(|(_, f)| f.bounds().intersects(bbox))
        .map(|(row, _)| row as RowId)
        .collect()
}
