//! Memory-mapped block store
//!
//! All blocks live in one backing file. Each block owns an aligned region of
//! that file, and an open accessor is a private `MmapMut` over exactly the
//! block's live bytes.
//!
//! File layout:
//! ```text
//! +------------------+  offset 0
//! |   Block region   |  reserved bytes, aligned to ALIGNMENT
//! +------------------+
//! |   Free region    |  released, reused first-fit
//! +------------------+
//! |   Block region   |
//! +------------------+  tail
//! |   Unused         |  file grows by at least growth_step
//! +------------------+  file length
//! ```
//!
//! Every byte outside a block's live element range is zero: allocation hands
//! out zeroed space, a shrink zeroes the truncated tail and a release zeroes
//! the freed region before it goes back on the free list.

use crate::store::{BackingStore, BlockAccessor};
use memmap2::{MmapMut, MmapOptions};
use pagearray_common::{BlockId, Error, Result, StoreConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Alignment of block regions inside the backing file (4KB)
pub const ALIGNMENT: u64 = 4096;

/// Align a value up to the nearest multiple of ALIGNMENT
#[inline]
const fn align_up(value: u64) -> u64 {
    value.div_ceil(ALIGNMENT) * ALIGNMENT
}

/// A contiguous byte range of the backing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Extent {
    offset: u64,
    len: u64,
}

/// Bookkeeping for one allocated block
#[derive(Debug)]
struct Region {
    extent: Extent,
    element_size: usize,
    element_count: usize,
    open: bool,
}

impl Region {
    fn live_bytes(&self) -> u64 {
        (self.element_size * self.element_count) as u64
    }
}

/// Store statistics
#[derive(Debug, Default)]
pub struct StoreStats {
    pub blocks_created: AtomicU64,
    pub blocks_released: AtomicU64,
    pub blocks_resized: AtomicU64,
    pub blocks_relocated: AtomicU64,
    pub accessors_opened: AtomicU64,
    pub accessors_closed: AtomicU64,
    pub file_growths: AtomicU64,
}

struct StoreInner {
    file: File,
    file_len: u64,
    /// End of the highest region ever handed out
    tail: u64,
    next_id: u64,
    blocks: HashMap<BlockId, Region>,
    free: Vec<Extent>,
}

impl StoreInner {
    fn region(&self, block: BlockId) -> Result<&Region> {
        self.blocks.get(&block).ok_or(Error::BlockNotFound(block))
    }

    fn closed_region_mut(&mut self, block: BlockId) -> Result<&mut Region> {
        let region = self
            .blocks
            .get_mut(&block)
            .ok_or(Error::BlockNotFound(block))?;
        if region.open {
            return Err(Error::BlockBusy(block));
        }
        Ok(region)
    }

    /// Hand out a zeroed extent of at least `bytes` bytes
    fn allocate(&mut self, bytes: u64, config: &StoreConfig, stats: &StoreStats) -> Result<Extent> {
        let reserved = align_up(bytes.max(1));

        if let Some(pos) = self.free.iter().position(|e| e.len >= reserved) {
            let extent = self.free.swap_remove(pos);
            if extent.len > reserved {
                self.free.push(Extent {
                    offset: extent.offset + reserved,
                    len: extent.len - reserved,
                });
            }
            return Ok(Extent {
                offset: extent.offset,
                len: reserved,
            });
        }

        let offset = self.tail;
        let end = offset + reserved;
        if end > self.file_len {
            let new_len = end.max(self.file_len + config.growth_step);
            self.file.set_len(new_len).map_err(|e| {
                Error::storage(format!("failed to grow backing file to {new_len}: {e}"))
            })?;
            debug!("grew backing file from {} to {} bytes", self.file_len, new_len);
            self.file_len = new_len;
            stats.file_growths.fetch_add(1, Ordering::Relaxed);
        }
        self.tail = end;

        Ok(Extent {
            offset,
            len: reserved,
        })
    }

    /// Return an already zeroed extent to the free pool
    fn free_extent(&mut self, extent: Extent) {
        if extent.offset + extent.len == self.tail {
            self.tail = extent.offset;
        } else {
            self.free.push(extent);
        }
    }

    fn zero(&self, offset: u64, len: u64) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let mut map = map_region(&self.file, offset, len)?;
        map.fill(0);
        Ok(())
    }
}

/// Map `len` bytes of `file` starting at `offset`
#[allow(unsafe_code)]
fn map_region(file: &File, offset: u64, len: u64) -> Result<MmapMut> {
    let len = usize::try_from(len)
        .map_err(|_| Error::storage(format!("region of {len} bytes cannot be mapped")))?;

    // SAFETY: the backing file is private to the store and never truncated
    // below a live region, and a region is mapped by at most one accessor at
    // a time (enforced by the `open` flag).
    let map = unsafe { MmapOptions::new().offset(offset).len(len).map_mut(file) }
        .map_err(|e| Error::storage(format!("failed to map {len} bytes at {offset}: {e}")))?;
    Ok(map)
}

/// Accessor over one block of a [`MemoryMapStore`]
pub struct MappedAccessor {
    block: BlockId,
    element_size: usize,
    capacity: usize,
    map: Option<MmapMut>,
}

impl MappedAccessor {
    /// Flush the mapping to the backing file
    pub fn flush(&self) -> Result<()> {
        if let Some(map) = &self.map {
            map.flush()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MappedAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedAccessor")
            .field("block", &self.block)
            .field("element_size", &self.element_size)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl BlockAccessor for MappedAccessor {
    fn block(&self) -> BlockId {
        self.block
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn element_size(&self) -> usize {
        self.element_size
    }

    fn as_bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self.map.as_deref_mut() {
            Some(bytes) => bytes,
            None => &mut [],
        }
    }
}

/// Block store backed by one memory-mapped file
///
/// Blocks are carved out of a single file that grows on demand. The store
/// can be shared between several arrays through an `Arc`.
pub struct MemoryMapStore {
    inner: Mutex<StoreInner>,
    path: Option<PathBuf>,
    config: StoreConfig,
    stats: StoreStats,
}

impl MemoryMapStore {
    /// Create a store over an anonymous temporary file
    ///
    /// The file is unlinked immediately and disappears with the store.
    pub fn temporary() -> Result<Self> {
        Self::temporary_with_config(StoreConfig::default())
    }

    /// Create a store over an anonymous temporary file with a custom config
    pub fn temporary_with_config(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let file = tempfile::tempfile()
            .map_err(|e| Error::storage(format!("failed to create temporary file: {e}")))?;
        debug!("created temporary memory-mapped store");
        Ok(Self::from_file(file, None, config))
    }

    /// Create a store over a new file at `path`, truncating any existing file
    pub fn create(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::storage(format!("failed to create {}: {e}", path.display())))?;
        debug!("created memory-mapped store at {:?}", path);
        Ok(Self::from_file(file, Some(path), config))
    }

    fn from_file(file: File, path: Option<PathBuf>, config: StoreConfig) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                file,
                file_len: 0,
                tail: 0,
                next_id: 0,
                blocks: HashMap::new(),
                free: Vec::new(),
            }),
            path,
            config,
            stats: StoreStats::default(),
        }
    }

    /// Path of the backing file, if it has one
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get the store configuration
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get statistics
    pub const fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Number of blocks currently allocated
    pub fn live_blocks(&self) -> usize {
        self.inner.lock().blocks.len()
    }

    /// Number of blocks with an open accessor
    pub fn open_accessors(&self) -> usize {
        self.inner.lock().blocks.values().filter(|r| r.open).count()
    }

    /// Current length of the backing file in bytes
    pub fn file_len(&self) -> u64 {
        self.inner.lock().file_len
    }
}

impl BackingStore for MemoryMapStore {
    type Accessor = MappedAccessor;

    fn create_block(&self, element_size: usize, element_count: usize) -> Result<BlockId> {
        if element_size == 0 {
            return Err(Error::invalid_argument("element size must be non-zero"));
        }
        let bytes = element_size
            .checked_mul(element_count)
            .ok_or_else(|| Error::invalid_argument("block size overflows"))?;

        let mut inner = self.inner.lock();
        let extent = inner.allocate(bytes as u64, &self.config, &self.stats)?;
        let block = BlockId::new(inner.next_id);
        inner.next_id += 1;
        inner.blocks.insert(
            block,
            Region {
                extent,
                element_size,
                element_count,
                open: false,
            },
        );

        self.stats.blocks_created.fetch_add(1, Ordering::Relaxed);
        debug!(
            "created {}: {} elements of {} bytes at offset {}",
            block, element_count, element_size, extent.offset
        );
        Ok(block)
    }

    fn resize_block(&self, block: BlockId, element_count: usize) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let region = inner.closed_region_mut(block)?;
        let old_bytes = region.live_bytes();
        let new_bytes = region
            .element_size
            .checked_mul(element_count)
            .ok_or_else(|| Error::invalid_argument("block size overflows"))? as u64;
        let old_extent = region.extent;

        if new_bytes <= old_extent.len {
            if new_bytes < old_bytes {
                inner.zero(old_extent.offset + new_bytes, old_bytes - new_bytes)?;
            }
            if let Some(region) = inner.blocks.get_mut(&block) {
                region.element_count = element_count;
            }
            self.stats.blocks_resized.fetch_add(1, Ordering::Relaxed);
            debug!("resized {} in place to {} elements", block, element_count);
            return Ok(());
        }

        let new_extent = inner.allocate(new_bytes, &self.config, &self.stats)?;
        if old_bytes > 0 {
            let old_map = map_region(&inner.file, old_extent.offset, old_bytes)?;
            let mut new_map = map_region(&inner.file, new_extent.offset, old_bytes)?;
            new_map.copy_from_slice(&old_map);
            drop(new_map);
            drop(old_map);
            inner.zero(old_extent.offset, old_bytes)?;
        }
        inner.free_extent(old_extent);

        if let Some(region) = inner.blocks.get_mut(&block) {
            region.extent = new_extent;
            region.element_count = element_count;
        }
        self.stats.blocks_resized.fetch_add(1, Ordering::Relaxed);
        self.stats.blocks_relocated.fetch_add(1, Ordering::Relaxed);
        debug!(
            "relocated {} to offset {} with {} elements",
            block, new_extent.offset, element_count
        );
        Ok(())
    }

    fn open_accessor(&self, block: BlockId) -> Result<MappedAccessor> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let region = inner.closed_region_mut(block)?;
        let live = region.live_bytes();
        let (element_size, capacity, offset) =
            (region.element_size, region.element_count, region.extent.offset);
        let map = if live > 0 {
            Some(map_region(&inner.file, offset, live)?)
        } else {
            None
        };

        if let Some(region) = inner.blocks.get_mut(&block) {
            region.open = true;
        }
        self.stats.accessors_opened.fetch_add(1, Ordering::Relaxed);
        trace!("opened accessor on {}", block);

        Ok(MappedAccessor {
            block,
            element_size,
            capacity,
            map,
        })
    }

    fn close_accessor(&self, accessor: MappedAccessor) -> Result<()> {
        let mut inner = self.inner.lock();
        let region = inner
            .blocks
            .get_mut(&accessor.block)
            .ok_or(Error::BlockNotFound(accessor.block))?;
        region.open = false;
        drop(inner);

        if self.config.sync_on_close {
            accessor.flush()?;
        }
        self.stats.accessors_closed.fetch_add(1, Ordering::Relaxed);
        trace!("closed accessor on {}", accessor.block);
        Ok(())
    }

    fn release_block(&self, block: BlockId) -> Result<()> {
        let mut inner = self.inner.lock();
        let region = inner.closed_region_mut(block)?;
        let (extent, live) = (region.extent, region.live_bytes());

        inner.zero(extent.offset, live)?;
        inner.blocks.remove(&block);
        inner.free_extent(extent);

        self.stats.blocks_released.fetch_add(1, Ordering::Relaxed);
        debug!("released {}", block);
        Ok(())
    }

    fn block_len(&self, block: BlockId) -> Result<usize> {
        Ok(self.inner.lock().region(block)?.element_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn store() -> MemoryMapStore {
        MemoryMapStore::temporary().unwrap()
    }

    #[test]
    fn test_create_block_is_zeroed() {
        let store = store();
        let acc = store.create_accessor(4, 100).unwrap();
        assert_eq!(acc.capacity(), 100);
        assert_eq!(acc.as_bytes().len(), 400);
        assert!(acc.as_bytes().iter().all(|b| *b == 0));
        assert_eq!(store.live_blocks(), 1);
        assert_eq!(store.open_accessors(), 1);
    }

    #[test]
    fn test_data_survives_close_and_reopen() {
        let store = store();
        let block = store.create_block(4, 256).unwrap();

        let mut acc = store.open_accessor(block).unwrap();
        for i in 0..256u32 {
            acc.write_element(i as usize, i * 3).unwrap();
        }
        store.close_accessor(acc).unwrap();
        assert_eq!(store.open_accessors(), 0);

        let acc = store.open_accessor(block).unwrap();
        for i in 0..256u32 {
            assert_eq!(acc.read_element::<u32>(i as usize).unwrap(), i * 3);
        }
    }

    #[test]
    fn test_double_open_is_rejected() {
        let store = store();
        let block = store.create_block(8, 16).unwrap();
        let _acc = store.open_accessor(block).unwrap();
        assert!(matches!(
            store.open_accessor(block),
            Err(Error::BlockBusy(b)) if b == block
        ));
        assert!(matches!(store.release_block(block), Err(Error::BlockBusy(_))));
        assert!(matches!(store.resize_block(block, 4), Err(Error::BlockBusy(_))));
    }

    #[test]
    fn test_unknown_block() {
        let store = store();
        let missing = BlockId::new(42);
        assert!(matches!(
            store.open_accessor(missing),
            Err(Error::BlockNotFound(_))
        ));
        assert!(matches!(store.block_len(missing), Err(Error::BlockNotFound(_))));
    }

    #[test]
    fn test_shrink_zeroes_tail_and_grow_exposes_zeroes() {
        let store = store();
        let block = store.create_block(4, 64).unwrap();

        let mut acc = store.open_accessor(block).unwrap();
        for i in 0..64u32 {
            acc.write_element(i as usize, u32::MAX - i).unwrap();
        }
        store.close_accessor(acc).unwrap();

        store.resize_block(block, 10).unwrap();
        assert_eq!(store.block_len(block).unwrap(), 10);
        store.resize_block(block, 64).unwrap();

        let acc = store.open_accessor(block).unwrap();
        for i in 0..10u32 {
            assert_eq!(acc.read_element::<u32>(i as usize).unwrap(), u32::MAX - i);
        }
        for i in 10..64 {
            assert_eq!(acc.read_element::<u32>(i).unwrap(), 0);
        }
        assert_eq!(store.stats().blocks_relocated.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_grow_beyond_region_relocates() {
        let store = store();
        let mut rng = StdRng::seed_from_u64(7);
        let block = store.create_block(1, 100).unwrap();
        // a neighbour so the block cannot simply extend at the tail
        let _other = store.create_block(1, 100).unwrap();

        let expected: Vec<u8> = (0..100).map(|_| rng.gen_range(1..=255)).collect();
        let mut acc = store.open_accessor(block).unwrap();
        acc.as_bytes_mut().copy_from_slice(&expected);
        store.close_accessor(acc).unwrap();

        store.resize_block(block, 3 * ALIGNMENT as usize).unwrap();
        assert_eq!(store.stats().blocks_relocated.load(Ordering::Relaxed), 1);

        let acc = store.open_accessor(block).unwrap();
        assert_eq!(&acc.as_bytes()[..100], expected.as_slice());
        assert!(acc.as_bytes()[100..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_released_region_is_reused_zeroed() {
        let store = store();
        let first = store.create_block(4, 1024).unwrap();
        let _second = store.create_block(4, 1024).unwrap();

        let mut acc = store.open_accessor(first).unwrap();
        acc.as_bytes_mut().fill(0xab);
        store.close_accessor(acc).unwrap();
        store.release_block(first).unwrap();
        assert_eq!(store.live_blocks(), 1);

        let file_len = store.file_len();
        let acc = store.create_accessor(4, 1024).unwrap();
        assert_ne!(acc.block(), first);
        assert!(acc.as_bytes().iter().all(|b| *b == 0));
        assert_eq!(store.file_len(), file_len);
    }

    #[test]
    fn test_zero_length_block() {
        let store = store();
        let mut acc = store.create_accessor(4, 0).unwrap();
        assert_eq!(acc.capacity(), 0);
        assert!(acc.as_bytes().is_empty());
        assert!(acc.as_bytes_mut().is_empty());
        assert!(acc.read_element::<u32>(0).is_err());
        store.close_accessor(acc).unwrap();
    }

    #[test]
    fn test_invalid_element_size() {
        let store = store();
        assert!(matches!(
            store.create_block(0, 10),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_file_growth_step() {
        let config = StoreConfig {
            growth_step: 64 * 1024,
            ..StoreConfig::default()
        };
        let store = MemoryMapStore::temporary_with_config(config).unwrap();
        store.create_block(4, 10).unwrap();
        assert_eq!(store.file_len(), 64 * 1024);
        assert_eq!(store.stats().file_growths.load(Ordering::Relaxed), 1);

        // fits in the first growth
        store.create_block(4, 10).unwrap();
        assert_eq!(store.stats().file_growths.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_file_backed_store_with_sync() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.bin");
        let config = StoreConfig {
            sync_on_close: true,
            ..StoreConfig::default()
        };
        let store = MemoryMapStore::create(&path, config).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));

        let mut acc = store.create_accessor(8, 4).unwrap();
        acc.write_element(3, -5i64).unwrap();
        store.close_accessor(acc).unwrap();

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(&on_disk[24..32], &(-5i64).to_le_bytes());
    }
}
