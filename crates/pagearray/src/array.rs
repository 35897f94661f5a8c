//! Paged logical array
//!
//! An [`Array`] behaves like a resizable `Vec<T>` of fixed-width elements,
//! but its storage is a sequence of backing-store blocks ("pages") of which
//! only a bounded number are mapped at once.
//!
//! Two storage forms exist:
//! - **Paged:** a page table plus an accessor cache, growable and shrinkable.
//! - **Single accessor:** a view over one caller-supplied block; it can shrink
//!   and regrow within that block's capacity, never beyond it.
//!
//! An array is open until [`Array::dispose`] is called or it is dropped.
//! Disposal closes every accessor and releases every page the array
//! allocated; afterwards every operation fails with [`Error::Disposed`].

use crate::cache::{AccessorCache, CacheStats};
use crate::codec::{HEADER_SIZE, StreamHeader};
use crate::page_table::{PageDescriptor, PageTable};
use pagearray_common::{ArrayProfile, CacheCapacity, Element, Error, Result};
use pagearray_store::{BackingStore, BlockAccessor, MemoryMapStore};
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

enum Storage<S: BackingStore> {
    Paged {
        table: PageTable,
        cache: AccessorCache<S>,
    },
    Single {
        accessor: S::Accessor,
    },
}

/// Resizable array of `T` paged over a backing store
pub struct Array<T: Element, S: BackingStore = MemoryMapStore> {
    store: Arc<S>,
    profile: Option<ArrayProfile>,
    length: usize,
    /// `None` once disposed
    storage: Option<Storage<S>>,
    _marker: PhantomData<T>,
}

impl<T: Element, S: BackingStore> Array<T, S> {
    /// Create an array of `length` zeroed elements with the default profile
    pub fn new(store: Arc<S>, length: usize) -> Result<Self> {
        Self::with_profile(store, length, ArrayProfile::default())
    }

    /// Create an array with explicit page size and cache capacity
    pub fn with_page_size(
        store: Arc<S>,
        length: usize,
        elements_per_page: usize,
        cache_capacity: CacheCapacity,
    ) -> Result<Self> {
        Self::with_profile(
            store,
            length,
            ArrayProfile::new(elements_per_page, cache_capacity),
        )
    }

    /// Create an array that keeps every page it opens mapped
    pub fn no_cache(store: Arc<S>, length: usize) -> Result<Self> {
        Self::with_profile(store, length, ArrayProfile::no_cache())
    }

    /// Create an array of `length` zeroed elements with `profile`
    pub fn with_profile(store: Arc<S>, length: usize, profile: ArrayProfile) -> Result<Self> {
        profile.validate()?;

        let mut table = PageTable::new(profile.elements_per_page);
        let mut cache = AccessorCache::new(Arc::clone(&store), profile.cache_capacity);
        if let Err(e) = Self::reconcile(&store, &mut table, &mut cache, length) {
            // Hand back whatever was allocated before the failure
            for desc in table.drain() {
                let _ = store.release_block(desc.block);
            }
            return Err(e);
        }

        debug!(
            "created array: {} elements of {} bytes in {} pages",
            length,
            T::SIZE,
            table.len()
        );

        Ok(Self {
            store,
            profile: Some(profile),
            length,
            storage: Some(Storage::Paged { table, cache }),
            _marker: PhantomData,
        })
    }

    /// Wrap one open accessor as a fixed-capacity array
    ///
    /// The array length is the accessor's capacity. Disposal closes the
    /// accessor but leaves its block allocated.
    pub fn from_accessor(store: Arc<S>, accessor: S::Accessor) -> Result<Self> {
        if accessor.element_size() != T::SIZE {
            let err = Error::invalid_argument(format!(
                "accessor element width {} does not match {}",
                accessor.element_size(),
                T::SIZE
            ));
            store.close_accessor(accessor)?;
            return Err(err);
        }

        let length = accessor.capacity();
        debug!(
            "wrapped {} as array of {} elements",
            accessor.block(),
            length
        );

        Ok(Self {
            store,
            profile: None,
            length,
            storage: Some(Storage::Single { accessor }),
            _marker: PhantomData,
        })
    }

    /// Bring `table` to `new_length`: release, resize, then add pages
    fn reconcile(
        store: &S,
        table: &mut PageTable,
        cache: &mut AccessorCache<S>,
        new_length: usize,
    ) -> Result<()> {
        // Same ceiling as any Rust allocation
        let fits = new_length
            .checked_mul(T::SIZE)
            .is_some_and(|bytes| isize::try_from(bytes).is_ok());
        if !fits {
            return Err(Error::invalid_argument(format!(
                "{new_length} elements of {} bytes exceed the addressable size",
                T::SIZE
            )));
        }

        let plan = table.plan_resize(new_length);
        if plan.is_noop(table.len()) {
            return Ok(());
        }

        while table.len() > plan.page_count {
            let page = table.len() - 1;
            let Some(desc) = table.last().copied() else {
                break;
            };
            cache.evict(page)?;
            store.release_block(desc.block)?;
            table.pop();
        }

        for &(page, capacity) in &plan.resized {
            let Some(desc) = table.get(page).copied() else {
                continue;
            };
            cache.evict(page)?;
            store.resize_block(desc.block, capacity)?;
            table.set_capacity(page, capacity);
        }

        for page in plan.added {
            let capacity = table.page_capacity_for(new_length, page);
            let block = store.create_block(T::SIZE, capacity)?;
            table.push(PageDescriptor { block, capacity });
        }

        Ok(())
    }

    /// Number of elements; 0 once disposed
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Check if the array holds no elements
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Profile of a paged array, `None` for the single-accessor form
    pub const fn profile(&self) -> Option<ArrayProfile> {
        self.profile
    }

    /// Check whether the array can grow
    pub const fn can_resize(&self) -> bool {
        matches!(self.storage, Some(Storage::Paged { .. }))
    }

    /// Check whether the array has been disposed
    pub const fn is_disposed(&self) -> bool {
        self.storage.is_none()
    }

    /// Cache statistics of a paged array
    pub fn cache_stats(&self) -> Option<CacheStats> {
        match &self.storage {
            Some(Storage::Paged { cache, .. }) => Some(cache.stats()),
            _ => None,
        }
    }

    /// Number of pages currently mapped
    pub fn open_pages(&self) -> usize {
        match &self.storage {
            Some(Storage::Paged { cache, .. }) => cache.len(),
            Some(Storage::Single { .. }) => 1,
            None => 0,
        }
    }

    /// Number of pages registered in the page table
    pub fn page_count(&self) -> usize {
        match &self.storage {
            Some(Storage::Paged { table, .. }) => table.len(),
            Some(Storage::Single { .. }) => 1,
            None => 0,
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if self.storage.is_none() {
            return Err(Error::Disposed);
        }
        if index >= self.length {
            return Err(Error::IndexOutOfRange {
                index,
                length: self.length,
            });
        }
        Ok(())
    }

    /// Run `f` on the accessor and in-page offset holding `index`
    fn with_element<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut S::Accessor, usize) -> Result<R>,
    ) -> Result<R> {
        self.check_index(index)?;
        match self.storage.as_mut().ok_or(Error::Disposed)? {
            Storage::Paged { table, cache } => {
                let loc = table.locate(index);
                let desc = table
                    .get(loc.page)
                    .ok_or_else(|| Error::storage(format!("page {} not registered", loc.page)))?;
                let accessor = cache.get(loc.page, desc.block)?;
                f(accessor, loc.offset)
            }
            Storage::Single { accessor } => f(accessor, index),
        }
    }

    /// Visit `[start, start + len)` page by page in increasing order
    ///
    /// `f` receives each accessor with the in-page element range to touch.
    fn for_each_run(
        &mut self,
        start: usize,
        len: usize,
        mut f: impl FnMut(&mut S::Accessor, Range<usize>) -> Result<()>,
    ) -> Result<()> {
        match self.storage.as_mut().ok_or(Error::Disposed)? {
            Storage::Paged { table, cache } => {
                for run in table.range_to_pages(start, len) {
                    let desc = table.get(run.page).ok_or_else(|| {
                        Error::storage(format!("page {} not registered", run.page))
                    })?;
                    let accessor = cache.get(run.page, desc.block)?;
                    f(accessor, run.offset_in_page..run.offset_in_page + run.length)?;
                }
                Ok(())
            }
            Storage::Single { accessor } => {
                if len == 0 {
                    return Ok(());
                }
                f(accessor, start..start + len)
            }
        }
    }

    /// Read the element at `index`
    pub fn get(&mut self, index: usize) -> Result<T> {
        self.with_element(index, |accessor, offset| accessor.read_element(offset))
    }

    /// Write the element at `index`
    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        self.with_element(index, |accessor, offset| {
            accessor.write_element(offset, value)
        })
    }

    /// Change the length, keeping the common prefix
    ///
    /// Growing exposes zero-valued elements. Shrinking releases pages wholly
    /// beyond the new length and zeroes the cut-off tail of the last page.
    pub fn resize(&mut self, new_length: usize) -> Result<()> {
        let old_length = self.length;
        match self.storage.as_mut().ok_or(Error::Disposed)? {
            Storage::Paged { table, cache } => {
                let result = Self::reconcile(&self.store, table, cache, new_length);
                // Keep the length within what the table still covers
                self.length = if result.is_ok() {
                    new_length
                } else {
                    old_length.min(table.covered_len())
                };
                result?;
            }
            Storage::Single { accessor } => {
                if new_length > accessor.capacity() {
                    return Err(Error::not_supported(format!(
                        "single-accessor array cannot grow beyond {} elements",
                        accessor.capacity()
                    )));
                }
                if new_length < old_length {
                    accessor.as_bytes_mut()[new_length * T::SIZE..old_length * T::SIZE].fill(0);
                }
                self.length = new_length;
            }
        }

        debug!("resized array from {} to {} elements", old_length, new_length);
        Ok(())
    }

    /// Grow to at least `minimum` elements, doubling the length
    ///
    /// New elements are zero. Does nothing if already large enough.
    pub fn ensure_minimum_size(&mut self, minimum: usize) -> Result<()> {
        self.grow_to_minimum(minimum).map(|_| ())
    }

    /// Grow to at least `minimum` elements, doubling the length
    ///
    /// New elements are set to `fill`.
    pub fn ensure_minimum_size_with(&mut self, minimum: usize, fill: T) -> Result<()> {
        let Some(grown) = self.grow_to_minimum(minimum)? else {
            return Ok(());
        };
        self.for_each_run(grown.start, grown.len(), |accessor, range| {
            for offset in range {
                accessor.write_element(offset, fill)?;
            }
            Ok(())
        })
    }

    /// Double the length until it reaches `minimum`
    ///
    /// Returns the newly exposed index range, or `None` if nothing grew.
    fn grow_to_minimum(&mut self, minimum: usize) -> Result<Option<Range<usize>>> {
        if self.storage.is_none() {
            return Err(Error::Disposed);
        }
        if self.length >= minimum {
            return Ok(None);
        }

        let old_length = self.length;
        let mut new_length = old_length.max(1);
        while new_length < minimum {
            new_length = new_length.saturating_mul(2);
        }
        self.resize(new_length)?;
        Ok(Some(old_length..new_length))
    }

    /// Serialized size of the array in bytes
    pub fn size_in_bytes(&self) -> Result<u64> {
        if self.storage.is_none() {
            return Err(Error::Disposed);
        }
        Ok(HEADER_SIZE as u64 + StreamHeader::for_elements::<T>(self.length).body_len())
    }

    /// Write the array to `writer`
    ///
    /// Writes the header and then every element in logical order with no
    /// padding. Returns the number of bytes written.
    pub fn copy_to<W: Write>(&mut self, mut writer: W) -> Result<u64> {
        if self.storage.is_none() {
            return Err(Error::Disposed);
        }

        let length = self.length;
        let header = StreamHeader::for_elements::<T>(length);
        writer.write_all(&header.to_bytes())?;

        self.for_each_run(0, length, |accessor, range| {
            let bytes = &accessor.as_bytes()[range.start * T::SIZE..range.end * T::SIZE];
            writer.write_all(bytes)?;
            Ok(())
        })?;
        writer.flush()?;

        Ok(HEADER_SIZE as u64 + header.body_len())
    }

    /// Overwrite the array from a stream produced by [`Array::copy_to`]
    ///
    /// The stream's element count must not exceed the current length; a
    /// shorter stream overwrites only the leading elements. Returns the
    /// number of elements read.
    pub fn copy_from<R: Read>(&mut self, mut reader: R) -> Result<usize> {
        if self.storage.is_none() {
            return Err(Error::Disposed);
        }

        let header = StreamHeader::read_from(&mut reader)?;
        header.validate_for::<T>()?;
        if header.count > self.length as u64 {
            return Err(Error::LengthMismatch {
                declared: header.count,
                capacity: self.length as u64,
            });
        }

        let count = usize::try_from(header.count)
            .map_err(|_| Error::deserialization("element count overflows"))?;
        self.for_each_run(0, count, |accessor, range| {
            let bytes = &mut accessor.as_bytes_mut()[range.start * T::SIZE..range.end * T::SIZE];
            reader.read_exact(bytes)?;
            Ok(())
        })?;

        Ok(count)
    }

    /// Copy the leading elements of `other` into this array
    ///
    /// Copies `min(self.len(), other.len())` elements and returns that count.
    pub fn copy_from_array<S2: BackingStore>(&mut self, other: &mut Array<T, S2>) -> Result<usize> {
        if self.storage.is_none() || other.is_disposed() {
            return Err(Error::Disposed);
        }

        let count = self.length.min(other.len());
        for index in 0..count {
            let value = other.get(index)?;
            self.set(index, value)?;
        }
        Ok(count)
    }

    /// Collect every element into a `Vec`
    pub fn to_vec(&mut self) -> Result<Vec<T>> {
        if self.storage.is_none() {
            return Err(Error::Disposed);
        }

        let mut values = Vec::with_capacity(self.length);
        self.for_each_run(0, self.length, |accessor, range| {
            for offset in range {
                values.push(accessor.read_element(offset)?);
            }
            Ok(())
        })?;
        Ok(values)
    }

    /// Close every accessor and release the array's pages
    ///
    /// Calling it again is a no-op.
    pub fn dispose(&mut self) -> Result<()> {
        let Some(storage) = self.storage.take() else {
            return Ok(());
        };
        let length = std::mem::take(&mut self.length);

        match storage {
            Storage::Paged {
                mut table,
                mut cache,
            } => {
                let mut result = cache.close_all();
                let pages = table.drain();
                for desc in &pages {
                    if let Err(e) = self.store.release_block(desc.block) {
                        if result.is_ok() {
                            result = Err(e);
                        }
                    }
                }
                debug!(
                    "disposed array of {} elements, released {} pages",
                    length,
                    pages.len()
                );
                result
            }
            Storage::Single { accessor } => {
                debug!("disposed single-accessor array of {} elements", length);
                self.store.close_accessor(accessor)
            }
        }
    }
}

impl<T: Element, S: BackingStore> Drop for Array<T, S> {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!("failed to release array storage on drop: {}", e);
        }
    }
}

impl<T: Element, S: BackingStore> std::fmt::Debug for Array<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Array")
            .field("length", &self.length)
            .field("profile", &self.profile)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
