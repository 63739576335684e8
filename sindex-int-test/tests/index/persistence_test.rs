//! Integration tests for index artifacts on disk.

use sindex::{
    index_path_for, BoundingBox, ErrorKind, RangeQueryService, SindexConfig, SpatialIndexStore,
};
use sindex_int_test::test_util::{
    cleanup, create_test_context, create_test_context_with, random_points, run_test,
    write_geoparquet,
};
use std::fs;

#[test]
fn test_index_written_next_to_dataset() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("cities.parquet");
            write_geoparquet(&path, &random_points(100, 10.0, 1), 50, Some("EPSG:4326"))?;
            assert!(!ctx.file("cities_sindex.idx").exists());

            ctx.service().query(&path, &BoundingBox::new(0.0, 0.0, 1.0, 1.0))?;
            assert!(ctx.file("cities_sindex.idx").exists());
            assert_eq!(index_path_for(&path, "_sindex"), ctx.file("cities_sindex.idx"));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_custom_suffix() {
    run_test(
        || {
            let config = SindexConfig::builder().index_suffix(".rtree").build()?;
            create_test_context_with(config)
        },
        |ctx| {
            let path = ctx.file("roads.parquet");
            write_geoparquet(&path, &random_points(10, 10.0, 2), 50, Some("EPSG:4326"))?;

            ctx.service().query(&path, &BoundingBox::new(0.0, 0.0, 10.0, 10.0))?;
            assert!(ctx.file("roads.rtree.idx").exists());
            assert!(!ctx.file("roads_sindex.idx").exists());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_index_survives_new_service() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("reuse.parquet");
            write_geoparquet(&path, &random_points(1_000, 100.0, 3), 200, Some("EPSG:4326"))?;
            let bbox = BoundingBox::new(10.0, 10.0, 40.0, 40.0);

            let first = ctx.service().query(&path, &bbox)?;
            let index = ctx.file("reuse_sindex.idx");
            let built = fs::read(&index)?;

            let fresh = RangeQueryService::new(SindexConfig::default());
            let second = fresh.query(&path, &bbox)?;
            assert_eq!(first.row_ids(), second.row_ids());
            assert_eq!(fs::read(&index)?, built);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_rebuild_is_byte_identical() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("stable.parquet");
            write_geoparquet(&path, &random_points(2_500, 100.0, 4), 300, Some("EPSG:4326"))?;

            let store = ctx.service().store().clone();
            let handle = store.ensure(&path)?;
            let first = fs::read(handle.path())?;
            drop(handle);

            assert!(store.drop_index(&path)?);
            let handle = store.ensure(&path)?;
            assert_eq!(fs::read(handle.path())?, first);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_corrupt_artifact_is_reported() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("broken.parquet");
            write_geoparquet(&path, &random_points(10, 10.0, 5), 50, Some("EPSG:4326"))?;
            let index = ctx.file("broken_sindex.idx");
            fs::write(&index, vec![0xAB; 100])?;

            let err = ctx
                .service()
                .query(&path, &BoundingBox::new(0.0, 0.0, 10.0, 10.0))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::IndexCorrupt);
            assert_eq!(fs::read(&index)?, vec![0xAB; 100]);

            // Deleting the artifact is how a caller recovers.
            fs::remove_file(&index)?;
            let result = ctx
                .service()
                .query(&path, &BoundingBox::new(0.0, 0.0, 10.0, 10.0))?;
            assert_eq!(result.len(), 10);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_truncated_artifact_is_reported() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("cut.parquet");
            write_geoparquet(&path, &random_points(5_000, 10.0, 6), 1_000, Some("EPSG:4326"))?;

            let store = SpatialIndexStore::new(SindexConfig::default());
            let index = store.ensure(&path)?.path().to_path_buf();
            let bytes = fs::read(&index)?;
            fs::write(&index, &bytes[..bytes.len() / 2])?;

            let err = SpatialIndexStore::new(SindexConfig::default())
                .ensure(&path)
                .err()
                .unwrap();
            assert_eq!(err.kind(), ErrorKind::IndexCorrupt);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_verify_reports_healthy_index() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("healthy.parquet");
            write_geoparquet(&path, &random_points(20_000, 1_000.0, 8), 4_096, Some("EPSG:4326"))?;
            let store = ctx.service().store().clone();

            let err = store.verify(&path).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidOperation);

            let handle = store.ensure(&path)?;
            assert_eq!(handle.len(), 20_000);
            assert!(handle.extent().is_some());

            let report = store.verify(&path)?;
            assert!(report.is_valid, "{}", report);
            assert_eq!(report.entries_found, 20_000);
            assert!(report.orphaned_pages.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
