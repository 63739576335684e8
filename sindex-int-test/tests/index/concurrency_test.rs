use sindex::{BoundingBox, RangeQueryService, SindexConfig};
use sindex_int_test::test_util::{
    brute_force, cleanup, create_test_context, leftover_temp_files, random_points, run_test,
    write_geoparquet,
};
use std::thread;

#[test]
fn test_shared_service_across_threads() {
    run_test(
        || create_test_context(),
        |ctx| {
            let features = random_points(4_000, 100.0, 21);
            let path = ctx.file("shared.parquet");
            write_geoparquet(&path, &features, 1_000, Some("EPSG:4326"))?;

            let service = ctx.service();
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let service = service.clone();
                    let path = path.clone();
                    let offset = i as f64 * 10.0;
                    thread::spawn(move || {
                        let bbox = BoundingBox::new(offset, offset, offset + 15.0, offset + 15.0);
                        service.query(&path, &bbox).map(|r| (bbox, r.row_ids().to_vec()))
                    })
                })
                .collect();

            for handle in handles {
                let (bbox, row_ids) = handle.join().expect("query thread panicked")?;
                assert_eq!(row_ids, brute_force(&features, &bbox));
            }
            assert!(leftover_temp_files(ctx.dir())?.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_independent_builders_race() {
    run_test(
        || create_test_context(),
        |ctx| {
            let features = random_points(20_000, 1_000.0, 22);
            let path = ctx.file("race.parquet");
            write_geoparquet(&path, &features, 2_000, Some("EPSG:4326"))?;
            let bbox = BoundingBox::new(100.0, 100.0, 300.0, 250.0);

            // Separate services share nothing in memory, like separate processes.
            let handles: Vec<_> = (0..6)
                .map(|_| {
                    let path = path.clone();
                    thread::spawn(move || {
                        RangeQueryService::new(SindexConfig::default())
                            .query(&path, &bbox)
                            .map(|r| r.row_ids().to_vec())
                    })
                })
                .collect();

            let expected = brute_force(&features, &bbox);
            for handle in handles {
                let row_ids = handle.join().expect("builder thread panicked")?;
                assert_eq!(row_ids, expected);
            }
            assert!(ctx.file("race_sindex.idx").exists());
            assert!(leftover_temp_files(ctx.dir())?.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
