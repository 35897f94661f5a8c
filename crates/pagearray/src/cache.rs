//! Accessor cache for paged arrays
//!
//! Only a bounded number of pages are mapped at any time. The cache owns
//! every open accessor; callers borrow one for the duration of a single
//! operation. With a bounded capacity the least recently used page is
//! closed before a new one is opened. With an unbounded capacity pages stay
//! open until the cache is closed. Both modes return the same values: an
//! evicted page is closed through the backing store, which keeps its data.

use crate::page_table::PageIndex;
use pagearray_common::{BlockId, CacheCapacity, Error, Result};
use pagearray_store::BackingStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Cache statistics for monitoring
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of lookups served by an already open page
    pub hits: u64,
    /// Number of lookups that had to open a page
    pub misses: u64,
    /// Number of pages closed to make room
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Open accessor with LRU tracking
struct CacheEntry<A> {
    accessor: A,
    /// Last access time for LRU eviction
    last_access: u64,
}

/// LRU cache of open page accessors
pub struct AccessorCache<S: BackingStore> {
    store: Arc<S>,
    entries: HashMap<PageIndex, CacheEntry<S::Accessor>>,
    capacity: CacheCapacity,
    /// Logical clock for LRU ordering
    clock: u64,
    stats: CacheStats,
}

impl<S: BackingStore> AccessorCache<S> {
    /// Create an empty cache over `store`
    pub fn new(store: Arc<S>, capacity: CacheCapacity) -> Self {
        Self {
            store,
            entries: HashMap::new(),
            capacity,
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    /// Get the configured capacity
    pub const fn capacity(&self) -> CacheCapacity {
        self.capacity
    }

    /// Get cache statistics
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of open pages
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no page is open
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if a page is open
    pub fn is_open(&self, page: PageIndex) -> bool {
        self.entries.contains_key(&page)
    }

    /// Open pages in increasing order
    pub fn open_pages(&self) -> Vec<PageIndex> {
        let mut pages: Vec<_> = self.entries.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    /// Advance the logical clock and return the new value
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Get an open accessor for `page`, opening `block` on a miss
    ///
    /// The returned page becomes the most recently used one.
    pub fn get(&mut self, page: PageIndex, block: BlockId) -> Result<&mut S::Accessor> {
        let clock = self.tick();

        if let Some(entry) = self.entries.get_mut(&page) {
            entry.last_access = clock;
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;

            // Evict if at capacity
            if let Some(limit) = self.capacity.limit() {
                while self.entries.len() >= limit {
                    let Some(victim) = self.find_lru_entry(page) else {
                        break;
                    };
                    self.close_entry(victim)?;
                    self.stats.evictions += 1;
                    trace!("evicted page {} to open page {}", victim, page);
                }
            }

            let accessor = self.store.open_accessor(block)?;
            trace!("opened page {} on {}", page, block);
            self.entries.insert(
                page,
                CacheEntry {
                    accessor,
                    last_access: clock,
                },
            );
        }

        self.entries
            .get_mut(&page)
            .map(|entry| &mut entry.accessor)
            .ok_or_else(|| Error::storage(format!("page {page} missing from cache after open")))
    }

    /// Find the least recently used page other than `exclude`
    fn find_lru_entry(&self, exclude: PageIndex) -> Option<PageIndex> {
        self.entries
            .iter()
            .filter(|(page, _)| **page != exclude)
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(page, _)| *page)
    }

    fn close_entry(&mut self, page: PageIndex) -> Result<()> {
        if let Some(entry) = self.entries.remove(&page) {
            self.store.close_accessor(entry.accessor)?;
        }
        Ok(())
    }

    /// Close `page` if it is open
    ///
    /// Returns whether the page was open.
    pub fn evict(&mut self, page: PageIndex) -> Result<bool> {
        let was_open = self.is_open(page);
        self.close_entry(page)?;
        Ok(was_open)
    }

    /// Close every open page
    ///
    /// Every accessor is handed back to the store even if an earlier close
    /// fails; the first failure is returned.
    pub fn close_all(&mut self) -> Result<()> {
        let mut result = Ok(());
        for (_, entry) in self.entries.drain() {
            if let Err(e) = self.store.close_accessor(entry.accessor) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}
