use rand::rngs::StdRng;
use rand::SeedableRng;
use sindex::{read_by_bounds, BoundingBox, ErrorKind, SindexConfig};
use sindex_int_test::test_util::{
    brute_force, cleanup, create_test_context, create_test_context_with, random_box,
    random_points, run_test, write_geoparquet, Feature,
};

#[test]
fn test_three_point_dataset() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("three.parquet");
            let features = vec![
                Feature::point(1, 0.0, 0.0),
                Feature::point(2, 5.0, 5.0),
                Feature::point(3, 10.0, 10.0),
            ];
            write_geoparquet(&path, &features, 2, Some("EPSG:4326"))?;

            let service = ctx.service();
            let result = service.query(&path, &BoundingBox::new(4.0, 4.0, 6.0, 6.0))?;
            assert_eq!(result.row_ids(), &[1]);
            assert_eq!(result.bounds(), &[BoundingBox::point(5.0, 5.0)]);
            assert_eq!(result.crs().identifier().as_deref(), Some("EPSG:4326"));

            let result = service.query(&path, &BoundingBox::new(-1.0, -1.0, 11.0, 11.0))?;
            assert_eq!(result.row_ids(), &[0, 1, 2]);
            assert_eq!(result.attributes().num_rows(), 3);
            assert_eq!(result.attributes().num_columns(), 2);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_random_points_match_brute_force() {
    run_test(
        || {
            let config = SindexConfig::builder().batch_size(777).cache_pages(8).build()?;
            create_test_context_with(config)
        },
        |ctx| {
            let extent = 1_000.0;
            let features = random_points(5_000, extent, 42);
            let path = ctx.file("points.parquet");
            write_geoparquet(&path, &features, 1_000, Some("EPSG:4326"))?;

            let service = ctx.service();
            let mut rng = StdRng::seed_from_u64(4242);
            for _ in 0..50 {
                let bbox = random_box(&mut rng, extent, 150.0);
                let result = service.query(&path, &bbox)?;
                let expected = brute_force(&features, &bbox);
                assert_eq!(result.row_ids(), expected.as_slice(), "query {}", bbox);
                for (row_id, _) in result.iter() {
                    assert!(features[row_id as usize].bounds().intersects(&bbox));
                }
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_repeated_query_is_identical() {
    run_test(
        || create_test_context(),
        |ctx| {
            let features = random_points(2_000, 100.0, 3);
            let path = ctx.file("repeat.parquet");
            write_geoparquet(&path, &features, 500, Some("EPSG:4326"))?;

            let bbox = BoundingBox::new(20.0, 20.0, 60.0, 45.0);
            let first = ctx.service().query(&path, &bbox)?;
            let second = ctx.service().query(&path, &bbox)?;
            assert_eq!(first.row_ids(), second.row_ids());
            assert_eq!(first.geometries(), second.geometries());
            assert_eq!(first.attributes(), second.attributes());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_boundary_contact_counts_as_intersection() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("edges.parquet");
            let features = vec![
                Feature::point(1, 5.0, 5.0),
                Feature::point(2, 5.0, 7.0),
                Feature::point(3, 5.000001, 5.0),
            ];
            write_geoparquet(&path, &features, 10, Some("EPSG:4326"))?;

            let result = ctx.service().query(&path, &BoundingBox::new(0.0, 0.0, 5.0, 5.0))?;
            assert_eq!(result.row_ids(), &[0]);

            let result = ctx.service().query(&path, &BoundingBox::point(5.0, 7.0))?;
            assert_eq!(result.row_ids(), &[1]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_empty_dataset() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("empty.parquet");
            write_geoparquet(&path, &[], 10, Some("EPSG:4326"))?;

            let result = ctx.service().query(&path, &BoundingBox::new(-180.0, -90.0, 180.0, 90.0))?;
            assert!(result.is_empty());
            assert!(ctx.file("empty_sindex.idx").exists());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_read_by_bounds() {
    run_test(
        || create_test_context(),
        |ctx| {
            let features = random_points(300, 10.0, 9);
            let path = ctx.file("default.parquet");
            write_geoparquet(&path, &features, 64, Some("EPSG:4326"))?;

            let bbox = BoundingBox::new(2.0, 2.0, 4.0, 4.0);
            let result = read_by_bounds(&path, &bbox)?;
            assert_eq!(result.row_ids(), brute_force(&features, &bbox).as_slice());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_invalid_box_is_rejected_before_indexing() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("three.parquet");
            write_geoparquet(&path, &[Feature::point(1, 0.0, 0.0)], 2, Some("EPSG:4326"))?;

            let err = ctx
                .service()
                .query(&path, &BoundingBox::new(1.0, 0.0, 0.0, 1.0))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidBoundingBox);

            let err = ctx
                .service()
                .query(&path, &BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidBoundingBox);
            assert!(!ctx.file("three_sindex.idx").exists());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_missing_dataset() {
    run_test(
        || create_test_context(),
        |ctx| {
            let err = ctx
                .service()
                .query(ctx.file("missing.parquet"), &BoundingBox::point(0.0, 0.0))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DatasetUnavailable);
            assert!(!ctx.file("missing_sindex.idx").exists());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
