//! LRU cache for decoded R-tree pages.
//!
//! Pages are decoded on first access only and shared as `Arc<Node>`, so a
//! cache hit never copies a node. Nothing is ever written back; index files
//! are immutable once published.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::rtree_types::{Node, PageId};

/// LRU cache for R-Tree pages
pub struct PageCache {
    pages: LruCache<PageId, Arc<Node>>,
}

impl PageCache {
    /// Creates a cache holding at most `max_pages` pages (at least one).
    pub fn new(max_pages: usize) -> Self {
        let capacity = NonZeroUsize::new(max_pages).unwrap_or(NonZeroUsize::MIN);
        Self {
            pages: LruCache::new(capacity),
        }
    }

    /// Returns a cached page and marks it most recently used.
    pub fn get(&mut self, page_id: PageId) -> Option<Arc<Node>> {
        self.pages.get(&page_id).cloned()
    }

    /// Caches a page, evicting the least recently used one when full.
    pub fn insert(&mut self, page_id: PageId, node: Arc<Node>) {
        self.pages.put(page_id, node);
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
