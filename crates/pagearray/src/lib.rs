//! PageArray - Resizable arrays paged over memory-mapped storage
//!
//! This crate implements the logical array and its supporting pieces:
//! - Page table translating element indices to pages
//! - LRU accessor cache bounding the number of mapped pages
//! - Byte-stream serialization (width and count header, raw elements)
//! - The `Array` type tying them to a backing store
//!
//! ```no_run
//! use pagearray::{Array, MemoryMapStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryMapStore::temporary()?);
//! let mut array: Array<u32> = Array::new(store, 1000)?;
//! array.set(10, 42)?;
//! assert_eq!(array.get(10)?, 42);
//! array.resize(2000)?;
//! # Ok::<(), pagearray::Error>(())
//! ```

pub mod array;
pub mod cache;
pub mod codec;
pub mod page_table;

// Re-exports
pub use array::Array;
pub use cache::{AccessorCache, CacheStats};
pub use codec::{HEADER_SIZE, StreamHeader};
pub use page_table::{PageDescriptor, PageIndex, PageLocation, PageRange, PageTable, ResizePlan};

pub use pagearray_common::{
    ArrayProfile, BlockId, CacheCapacity, Element, Error, Result, StoreConfig,
};
pub use pagearray_store::{BackingStore, BlockAccessor, MappedAccessor, MemoryMapStore};
