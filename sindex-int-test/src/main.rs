use rand::rngs::StdRng;
use rand::SeedableRng;
use sindex::SindexResult;
use sindex_int_test::test_util::{
    brute_force, cleanup, create_test_context, random_box, random_points, write_geoparquet,
};

fn main() -> SindexResult<()> {
    colog::init();
    println!("Starting stress test...");
    let ctx = create_test_context()?;

    let count = 1_000_000;
    let extent = 10_000.0;
    let features = random_points(count, extent, 7);
    let path = ctx.file("stress.parquet");

    let start = std::time::Instant::now();
    write_geoparquet(&path, &features, 100_000, Some("EPSG:4326"))?;
    println!("Wrote {} rows in {:?}", count, start.elapsed());

    let service = ctx.service();
    let start = std::time::Instant::now();
    let handle = service.store().ensure(&path)?;
    println!(
        "Built index with {} entries in {:?}",
        handle.len(),
        start.elapsed()
    );

    let mut rng = StdRng::seed_from_u64(11);
    let queries = 1_000;
    let mut matched = 0;
    let start = std::time::Instant::now();
    for _ in 0..queries {
        let bbox = random_box(&mut rng, extent, 100.0);
        matched += handle.intersect(&bbox)?.len();
    }
    println!(
        "Ran {} index lookups ({} hits) in {:?}",
        queries,
        matched,
        start.elapsed()
    );
    println!("Cache: {:?}", handle.stats());

    let mut rng = StdRng::seed_from_u64(13);
    let start = std::time::Instant::now();
    for _ in 0..20 {
        let bbox = random_box(&mut rng, extent, 200.0);
        let result = service.query(&path, &bbox)?;
        assert_eq!(result.row_ids(), brute_force(&features, &bbox).as_slice());
    }
    println!("Ran 20 verified range queries in {:?}", start.elapsed());

    println!("Integrity: {}", handle.check_integrity()?);
    cleanup(ctx)
}
