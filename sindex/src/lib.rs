//! # sindex - Persistent Spatial Indexes for GeoParquet
//!
//! This crate answers bounding box range queries over GeoParquet files
//! without scanning them. The first query against a file builds a packed
//! R-tree over the bounding box of every row and persists it next to the
//! file; later queries, from this process or any other, reuse it.
//!
//! ## Features
//!
//! - **Lazy**: Indexes are built on first use, never ahead of time
//! - **Persistent**: One `<stem>_sindex.idx` file per dataset, published atomically
//! - **Disk-Based Storage**: Pages memory mapped, decoded on demand
//! - **LRU Cache**: Frequently visited pages kept decoded in memory
//! - **Streaming Build**: Geometries are decoded batch by batch
//! - **Random Reads**: Only the matching rows are read back from the dataset
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sindex::{read_by_bounds, BoundingBox};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let result = read_by_bounds("cities.parquet", &BoundingBox::new(4.0, 50.0, 6.0, 52.0))?;
//! for (row_id, geometry) in result.iter() {
//!     println!("{row_id}: {geometry:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## R-Tree API
//!
//! ```rust,no_run
//! use sindex::{BoundingBox, DiskRTree, SpatialRTree};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let path = std::path::Path::new("boxes.idx");
//! DiskRTree::bulk_load(path, vec![(0, BoundingBox::new(0.0, 0.0, 10.0, 10.0))])?;
//!
//! let tree = DiskRTree::open(path)?;
//! let hits = tree.find_intersecting_keys(&BoundingBox::new(5.0, 5.0, 15.0, 15.0))?;
//! assert_eq!(hits, vec![0]);
//! # Ok(())
//! # }
//! ```

// Core R-Tree modules
pub mod bounding_box;
pub mod disk_rtree;
pub mod hilbert;
pub mod spatial_rtree;

// Dataset access
pub mod bounds_stream;
pub mod crs;
pub mod dataset;
pub mod geometry;

// Index lifecycle and queries
pub mod config;
pub mod errors;
pub mod index;
pub mod query;
pub mod reader;

#[cfg(test)]
mod test_support;

use std::path::Path;

// Re-export R-Tree types
pub use bounding_box::BoundingBox;
pub use disk_rtree::{BuildStats, DiskRTree, IntegrityReport, RTreeStats};
pub use spatial_rtree::SpatialRTree;

// Re-export dataset types
pub use bounds_stream::{BoundsStream, LogProgress, ProgressListener};
pub use crs::{Crs, GeoColumnMetadata, GeoMetadata};
pub use dataset::{GeoDataset, ParquetDataset, RowId};

// Re-export service types
pub use config::{SindexConfig, SindexConfigBuilder};
pub use errors::{ErrorKind, SindexError, SindexResult};
pub use index::{index_path_for, IndexHandle, SpatialIndexStore};
pub use query::RangeQueryService;
pub use reader::{ColumnarRandomReader, QueryResult};

/// Reads every row of the GeoParquet file at `file` whose geometry's
/// bounding box intersects `bbox`, with default settings.
///
/// Builds and persists the file's index if it does not exist yet. Callers
/// issuing many queries should keep a [`RangeQueryService`] instead, so the
/// opened index and its page cache are reused.
pub fn read_by_bounds(file: impl AsRef<Path>, bbox: &BoundingBox) -> SindexResult<QueryResult> {
    RangeQueryService::new(SindexConfig::default()).query(file, bbox)
}
