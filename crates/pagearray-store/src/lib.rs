//! PageArray Store - Memory-mapped backing storage
//!
//! This crate implements the storage a paged array sits on:
//! - The `BackingStore` / `BlockAccessor` contract consumed by arrays
//! - A memory-mapped store carving fixed-capacity blocks out of one file
//! - Zero-filled allocation, in-place or relocating block resize
//! - Reuse of released regions

pub mod mmap;
pub mod store;

// Re-exports
pub use mmap::{ALIGNMENT, MappedAccessor, MemoryMapStore, StoreStats};
pub use store::{BackingStore, BlockAccessor};
