//! Page table for paged arrays
//!
//! Maps logical element indices to pages. An array of length `L` is divided
//! into `ceil(L / elements_per_page)` pages; every page is full except
//! possibly the last one.
//!
//! ```text
//! Array (1000 elements, 256 per page)
//! ├── Page 0:  elements 0 - 255      → block A (256)
//! ├── Page 1:  elements 256 - 511    → block B (256)
//! ├── Page 2:  elements 512 - 767    → block C (256)
//! └── Page 3:  elements 768 - 999    → block D (232)
//! ```

use pagearray_common::BlockId;
use std::ops::Range;

/// Page index within an array
pub type PageIndex = usize;

/// Position of one element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLocation {
    /// Page holding the element
    pub page: PageIndex,
    /// Element offset within the page
    pub offset: usize,
}

/// A run of elements within a single page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRange {
    /// Page identifier
    pub page: PageIndex,
    /// Element offset within the page
    pub offset_in_page: usize,
    /// Number of elements in this run
    pub length: usize,
}

/// One registered page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDescriptor {
    /// Backing store block holding the page
    pub block: BlockId,
    /// Number of elements in the page
    pub capacity: usize,
}

/// Page-level changes needed to move a table to a new length
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizePlan {
    /// Page count after the resize; pages at or beyond it are released
    pub page_count: usize,
    /// Surviving pages whose capacity changes, as `(page, new capacity)`
    pub resized: Vec<(PageIndex, usize)>,
    /// Pages appended after the surviving ones; each page's capacity
    /// comes from [`PageTable::page_capacity_for`]
    pub added: Range<PageIndex>,
}

impl ResizePlan {
    /// Check whether the plan touches nothing
    pub fn is_noop(&self, current_pages: usize) -> bool {
        self.page_count == current_pages && self.resized.is_empty() && self.added.is_empty()
    }
}

/// Ordered page descriptors of one array
#[derive(Debug, Clone)]
pub struct PageTable {
    elements_per_page: usize,
    pages: Vec<PageDescriptor>,
}

impl PageTable {
    /// Create an empty page table
    ///
    /// `elements_per_page` must be non-zero; profiles are validated before
    /// a table is built.
    pub const fn new(elements_per_page: usize) -> Self {
        debug_assert!(elements_per_page > 0);
        Self {
            elements_per_page,
            pages: Vec::new(),
        }
    }

    /// Get the number of elements per full page
    pub const fn elements_per_page(&self) -> usize {
        self.elements_per_page
    }

    /// Number of pages needed to hold `length` elements
    pub const fn page_count_for(&self, length: usize) -> usize {
        length.div_ceil(self.elements_per_page)
    }

    /// Capacity of `page` in an array of `length` elements
    pub fn page_capacity_for(&self, length: usize, page: PageIndex) -> usize {
        let start = page * self.elements_per_page;
        length.saturating_sub(start).min(self.elements_per_page)
    }

    /// Translate an element index to page coordinates
    ///
    /// Pure arithmetic; callers bounds-check the index against the array
    /// length first.
    pub const fn locate(&self, index: usize) -> PageLocation {
        PageLocation {
            page: index / self.elements_per_page,
            offset: index % self.elements_per_page,
        }
    }

    /// Convert an element range to per-page runs
    ///
    /// Returns the runs covering `[start, start + length)` in increasing
    /// order.
    pub fn range_to_pages(&self, start: usize, length: usize) -> Vec<PageRange> {
        if length == 0 {
            return Vec::new();
        }

        let end = start + length;
        let start_page = start / self.elements_per_page;
        let end_page = (end - 1) / self.elements_per_page;

        let mut ranges = Vec::with_capacity(end_page - start_page + 1);

        for page in start_page..=end_page {
            let page_start = page * self.elements_per_page;
            let page_end = page_start + self.elements_per_page;

            // Intersection of [start, end) and [page_start, page_end)
            let range_start = start.max(page_start);
            let range_end = end.min(page_end);

            ranges.push(PageRange {
                page,
                offset_in_page: range_start - page_start,
                length: range_end - range_start,
            });
        }

        ranges
    }

    /// Work out which pages to release, resize and add for `new_length`
    pub fn plan_resize(&self, new_length: usize) -> ResizePlan {
        let page_count = self.page_count_for(new_length);
        let surviving = page_count.min(self.pages.len());

        let resized = self.pages[..surviving]
            .iter()
            .enumerate()
            .filter_map(|(page, desc)| {
                let capacity = self.page_capacity_for(new_length, page);
                (capacity != desc.capacity).then_some((page, capacity))
            })
            .collect();

        ResizePlan {
            page_count,
            resized,
            added: surviving..page_count,
        }
    }

    /// Number of registered pages
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Check if no pages are registered
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Get a page descriptor
    pub fn get(&self, page: PageIndex) -> Option<&PageDescriptor> {
        self.pages.get(page)
    }

    /// Last registered page
    pub fn last(&self) -> Option<&PageDescriptor> {
        self.pages.last()
    }

    /// All registered pages in order
    pub fn pages(&self) -> &[PageDescriptor] {
        &self.pages
    }

    /// Total number of elements covered by registered pages
    pub fn covered_len(&self) -> usize {
        self.pages.iter().map(|p| p.capacity).sum()
    }

    /// Register a page after the current last one
    pub fn push(&mut self, desc: PageDescriptor) {
        self.pages.push(desc);
    }

    /// Drop the last page
    pub fn pop(&mut self) -> Option<PageDescriptor> {
        self.pages.pop()
    }

    /// Record a new capacity for a page
    pub fn set_capacity(&mut self, page: PageIndex, capacity: usize) {
        if let Some(desc) = self.pages.get_mut(page) {
            desc.capacity = capacity;
        }
    }

    /// Remove and return every page descriptor
    pub fn drain(&mut self) -> Vec<PageDescriptor> {
        std::mem::take(&mut self.pages)
    }
}
