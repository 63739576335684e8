//! Constants for the on-disk R-tree format.

/// Fixed page size. Page 0 holds the file header, pages 1.. hold nodes.
pub const PAGE_SIZE: usize = 16384;

/// Bytes in front of every page payload: payload length and CRC32.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Maximum number of entries per leaf node.
///
/// A leaf entry encodes to 40 bytes, so a full leaf stays well inside a page.
pub const MAX_LEAF_ENTRIES: usize = 256;

/// Maximum children per internal node.
pub const MAX_INTERNAL_CHILDREN: usize = 256;

/// Default cache size in number of pages (16MB with 16KB pages)
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Magic number for file format identification
pub const MAGIC: u32 = 0x5349_4458; // "SIDX"

/// File format version
pub const VERSION: u32 = 1;
