use arrow::array::{Array, Int64Array, StringArray};
use geo::{Geometry, Point};
use sindex::{BoundingBox, ColumnarRandomReader, ErrorKind, QueryResult, SindexConfig, SindexError};
use sindex_int_test::test_util::{cleanup, create_test_context, run_test, write_geoparquet, Feature};

fn ids(result: &QueryResult) -> Vec<i64> {
    let column = result
        .attributes()
        .column_by_name("id")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    (0..column.len()).map(|i| column.value(i)).collect()
}

fn grid(n: i64) -> Vec<Feature> {
    (0..n)
        .map(|i| Feature::point(1_000 + i, (i % 10) as f64, (i / 10) as f64))
        .collect()
}

#[test]
fn test_take_across_row_groups() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("grid.parquet");
            write_geoparquet(&path, &grid(100), 7, Some("EPSG:4326"))?;

            let reader = ColumnarRandomReader::new(SindexConfig::default());
            let result = reader.take(&path, &[99, 0, 50, 6, 7, 50])?;
            assert_eq!(ids(&result), vec![1_099, 1_000, 1_050, 1_006, 1_007, 1_050]);
            assert_eq!(result.geometries()[0], Geometry::Point(Point::new(9.0, 9.0)));
            assert_eq!(result.bounds()[2], BoundingBox::point(0.0, 5.0));

            let names = result
                .attributes()
                .column_by_name("name")
                .unwrap()
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap();
            assert_eq!(names.value(1), "feature-1000");
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_take_out_of_range() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("small.parquet");
            write_geoparquet(&path, &grid(5), 10, Some("EPSG:4326"))?;

            let err = ColumnarRandomReader::new(SindexConfig::default())
                .take(&path, &[4, 5])
                .unwrap_err();
            match err {
                SindexError::InvalidRowId { row_id, total_rows } => {
                    assert_eq!(row_id, 5);
                    assert_eq!(total_rows, 5);
                }
                other => panic!("unexpected error {other}"),
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_dataset_without_crs() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("nocrs.parquet");
            write_geoparquet(&path, &grid(5), 10, None)?;

            let err = ColumnarRandomReader::new(SindexConfig::default())
                .take(&path, &[0])
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MissingCrs);

            // The index can still be built, but the query as a whole fails.
            let err = ctx
                .service()
                .query(&path, &BoundingBox::new(0.0, 0.0, 1.0, 1.0))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MissingCrs);
            assert!(ctx.file("nocrs_sindex.idx").exists());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_custom_crs_identifier() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("projected.parquet");
            write_geoparquet(&path, &grid(3), 10, Some("EPSG:3857"))?;

            let result = ColumnarRandomReader::new(SindexConfig::default()).take(&path, &[2])?;
            assert_eq!(result.crs().identifier().as_deref(), Some("EPSG:3857"));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
