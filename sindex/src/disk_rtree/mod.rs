//! Disk-based R-tree used as the persistent spatial index.
//!
//! - Fixed size, checksummed pages in a single file
//! - Hilbert packed bulk loading, written once and never modified
//! - Read-only memory mapped access with an LRU cache of decoded pages
//! - Lazy loading: a query decodes only the pages whose boxes it touches

pub mod persistence;
pub mod rtree_cache;
pub mod rtree_constants;
pub mod rtree_storage;
pub mod rtree_types;
mod rtree_impl;

pub use persistence::IntegrityReport;
pub use rtree_constants::DEFAULT_CACHE_PAGES;
pub use rtree_impl::DiskRTree;
pub use rtree_types::{BuildStats, ChildRef, FileHeader, LeafEntry, Node, PageId, RTreeStats};
