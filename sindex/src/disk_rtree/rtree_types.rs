//! Core types of the on-disk R-tree: nodes, the file header and statistics.

use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::dataset::RowId;

use super::rtree_constants::{MAGIC, MAX_INTERNAL_CHILDREN, MAX_LEAF_ENTRIES, PAGE_SIZE, VERSION};

/// Page ID - position of a node in the index file
pub type PageId = u64;

// ============================================================================
// Statistics
// ============================================================================

/// Runtime statistics of an open tree.
#[derive(Debug, Clone, Default)]
pub struct RTreeStats {
    pub total_entries: u64,
    pub page_count: u64,
    pub cached_pages: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub disk_reads: u64,
    pub tree_height: u32,
}

impl RTreeStats {
    /// Fraction of page lookups served from the cache.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits.saturating_add(self.cache_misses);
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Outcome of a bulk load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildStats {
    pub entries: u64,
    pub leaf_pages: u64,
    pub internal_pages: u64,
    pub height: u32,
    pub file_bytes: u64,
}

// ============================================================================
// Node Types
// ============================================================================

/// An entry in a leaf node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafEntry {
    pub bbox: BoundingBox,
    pub id: RowId,
}

/// A child reference in an internal node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRef {
    pub bbox: BoundingBox,
    pub page_id: PageId,
}

/// Node types in the R-Tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Leaf node containing actual entries
    Leaf { entries: Vec<LeafEntry> },
    /// Internal node containing child references
    Internal {
        children: Vec<ChildRef>,
        level: u32, // Height from leaf level (leaves are 0)
    },
}

impl Node {
    /// Get the bounding box enclosing all children/entries
    pub fn compute_bbox(&self) -> BoundingBox {
        match self {
            Node::Leaf { entries } => entries
                .iter()
                .fold(BoundingBox::empty(), |acc, e| acc.union(&e.bbox)),
            Node::Internal { children, .. } => children
                .iter()
                .fold(BoundingBox::empty(), |acc, c| acc.union(&c.bbox)),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn level(&self) -> u32 {
        match self {
            Node::Leaf { .. } => 0,
            Node::Internal { level, .. } => *level,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Leaf { entries } => entries.len(),
            Node::Internal { children, .. } => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the node holds more items than its kind allows.
    pub fn is_overfull(&self) -> bool {
        match self {
            Node::Leaf { entries } => entries.len() > MAX_LEAF_ENTRIES,
            Node::Internal { children, .. } => children.len() > MAX_INTERNAL_CHILDREN,
        }
    }
}

// ============================================================================
// File Header
// ============================================================================

/// Contents of page 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    pub root_page: PageId,
    /// Number of pages in the file, header page included.
    pub page_count: u64,
    pub entry_count: u64,
    /// Number of node levels; a lone root leaf has height 1.
    pub height: u32,
    /// Union of all entry boxes, `None` for an empty tree.
    pub extent: Option<BoundingBox>,
}

impl FileHeader {
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_size: PAGE_SIZE as u32,
            root_page: 0,
            page_count: 1,
            entry_count: 0,
            height: 0,
            extent: None,
        }
    }

    /// Checks the format identifiers and internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.magic != MAGIC {
            return Err(format!("bad magic number {:#x}", self.magic));
        }
        if self.version != VERSION {
            return Err(format!("unsupported format version {}", self.version));
        }
        if self.page_size as usize != PAGE_SIZE {
            return Err(format!("unsupported page size {}", self.page_size));
        }
        if self.root_page == 0 || self.root_page >= self.page_count {
            return Err(format!(
                "root page {} outside of {} pages",
                self.root_page, self.page_count
            ));
        }
        if self.height == 0 {
            return Err("tree height must be at least 1".into());
        }
        if self.entry_count > 0 && self.extent.is_none() {
            return Err("non-empty tree without extent".into());
        }
        Ok(())
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}
