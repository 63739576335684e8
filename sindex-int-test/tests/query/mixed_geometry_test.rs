use geo::{line_string, polygon, Geometry, MultiPoint, Point};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sindex::{BoundingBox, ErrorKind, SindexError};
use sindex_int_test::test_util::{
    brute_force, cleanup, create_test_context, leftover_temp_files, random_box, random_shapes,
    run_test, wkb, write_geoparquet, write_raw_geometries, Feature,
};

#[test]
fn test_shapes_match_brute_force() {
    run_test(
        || create_test_context(),
        |ctx| {
            let extent = 500.0;
            let features = random_shapes(3_000, extent, 17);
            let path = ctx.file("shapes.parquet");
            write_geoparquet(&path, &features, 256, Some("EPSG:4326"))?;

            let service = ctx.service();
            let mut rng = StdRng::seed_from_u64(1717);
            for _ in 0..40 {
                let bbox = random_box(&mut rng, extent, 60.0);
                let result = service.query(&path, &bbox)?;
                assert_eq!(result.row_ids(), brute_force(&features, &bbox).as_slice());
                for (i, &row_id) in result.row_ids().iter().enumerate() {
                    assert_eq!(result.bounds()[i], features[row_id as usize].bounds());
                    assert_eq!(result.geometries()[i], features[row_id as usize].geometry);
                }
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_box_overlap_is_candidate_not_exact() {
    run_test(
        || create_test_context(),
        |ctx| {
            // The triangle's box covers (9, 9) while the triangle itself does not.
            let triangle: Geometry<f64> = polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 0.0, y: 10.0),
                (x: 0.0, y: 0.0),
            ]
            .into();
            let diagonal: Geometry<f64> =
                line_string![(x: 20.0, y: 20.0), (x: 30.0, y: 30.0)].into();
            let cluster: Geometry<f64> =
                MultiPoint::new(vec![Point::new(40.0, 40.0), Point::new(45.0, 41.0)]).into();
            let features = vec![
                Feature::new(1, triangle),
                Feature::new(2, diagonal),
                Feature::new(3, cluster),
            ];
            let path = ctx.file("mixed.parquet");
            write_geoparquet(&path, &features, 10, Some("EPSG:4326"))?;

            let service = ctx.service();
            assert_eq!(service.query(&path, &BoundingBox::point(9.0, 9.0))?.row_ids(), &[0]);
            assert_eq!(
                service
                    .query(&path, &BoundingBox::new(29.0, 21.0, 29.5, 21.5))?
                    .row_ids(),
                &[1]
            );
            assert_eq!(
                service
                    .query(&path, &BoundingBox::new(42.0, 40.5, 43.0, 40.6))?
                    .row_ids(),
                &[2]
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_corrupt_geometry_aborts_build() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("corrupt.parquet");
            let good = wkb(&Point::new(1.0, 1.0).into());
            write_raw_geometries(&path, &[Some(good.clone()), Some(vec![1, 1, 0]), Some(good)])?;

            let err = ctx
                .service()
                .query(&path, &BoundingBox::new(0.0, 0.0, 2.0, 2.0))
                .unwrap_err();
            match err {
                SindexError::IndexBuildFailed { source, .. } => {
                    assert_eq!(source.kind(), ErrorKind::CorruptGeometry);
                }
                other => panic!("unexpected error {other}"),
            }
            assert!(!ctx.file("corrupt_sindex.idx").exists());
            assert!(leftover_temp_files(ctx.dir())?.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_null_geometry_aborts_build() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("nulls.parquet");
            let good = wkb(&Point::new(1.0, 1.0).into());
            write_raw_geometries(&path, &[Some(good), None])?;

            let err = ctx
                .service()
                .query(&path, &BoundingBox::new(0.0, 0.0, 2.0, 2.0))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::IndexBuildFailed);
            assert!(!ctx.file("nulls_sindex.idx").exists());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
