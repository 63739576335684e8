//! Range query integration tests.
//!
//! These tests run full queries against GeoParquet files on disk and check
//! every answer against a brute force scan of the same fixtures.

mod range_query_test;
mod mixed_geometry_test;
