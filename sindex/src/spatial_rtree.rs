//! Query interface of a spatial index.

use crate::bounding_box::BoundingBox;
use crate::dataset::RowId;
use crate::errors::SindexResult;

/// An R-tree mapping bounding boxes to dataset row ids.
pub trait SpatialRTree: Send + Sync {
    /// Finds the ids of all entries whose box intersects `key`, boundary
    /// included, in ascending order without duplicates.
    fn find_intersecting_keys(&self, key: &BoundingBox) -> SindexResult<Vec<RowId>>;

    /// Gets the number of entries in the rtree.
    fn size(&self) -> u64;

    /// Closes this RTree instance and releases its cached pages.
    fn close(&self) -> SindexResult<()>;
}
