//! Integrity reporting for index files.

use std::fmt::{Display, Formatter};

use super::rtree_types::PageId;

/// Result of walking every page of an index file.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityReport {
    /// Total pages checked
    pub pages_checked: u64,
    /// Leaf entries reachable from the root
    pub entries_found: u64,
    /// Pages that failed to decode or verify
    pub corrupted_pages: Vec<PageId>,
    /// Pages never reached from the root
    pub orphaned_pages: Vec<PageId>,
    /// Summary of findings
    pub is_valid: bool,
    /// Detailed error messages
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self {
            pages_checked: 0,
            entries_found: 0,
            corrupted_pages: Vec::new(),
            orphaned_pages: Vec::new(),
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// Records a structural problem that is not tied to an unreadable page.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(message.into());
    }

    /// Records a page that could not be read.
    pub fn corrupt_page(&mut self, page_id: PageId, message: impl Display) {
        self.corrupted_pages.push(page_id);
        self.fail(format!("Page {}: {}", page_id, message));
    }
}

impl Default for IntegrityReport {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for IntegrityReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_valid {
            write!(
                f,
                "ok: {} pages, {} entries",
                self.pages_checked, self.entries_found
            )
        } else {
            write!(
                f,
                "{} problem(s) in {} pages: {}",
                self.errors.len(),
                self.pages_checked,
                self.errors.join("; ")
            )
        }
    }
}
