//! Backing store contract
//!
//! A backing store hands out fixed-capacity blocks of elements. A block is
//! addressed by its [`BlockId`] and accessed through an accessor, which is
//! opened, used, and closed again. Released blocks free their storage.

use pagearray_common::{BlockId, Element, Error, Result};

/// Read/write access to one open block
pub trait BlockAccessor {
    /// The block this accessor is open on
    fn block(&self) -> BlockId;

    /// Number of elements the block holds
    fn capacity(&self) -> usize;

    /// Width of one element in bytes
    fn element_size(&self) -> usize;

    /// Raw bytes of the block, `capacity * element_size` long
    fn as_bytes(&self) -> &[u8];

    /// Mutable raw bytes of the block
    fn as_bytes_mut(&mut self) -> &mut [u8];

    /// Read the element at `offset`
    fn read_element<T: Element>(&self, offset: usize) -> Result<T> {
        let range = element_range::<T>(self.element_size(), self.capacity(), offset)?;
        Ok(T::decode(&self.as_bytes()[range]))
    }

    /// Write the element at `offset`
    fn write_element<T: Element>(&mut self, offset: usize, value: T) -> Result<()> {
        let range = element_range::<T>(self.element_size(), self.capacity(), offset)?;
        value.encode(&mut self.as_bytes_mut()[range]);
        Ok(())
    }
}

/// Byte range of element `offset`, checking width and bounds
fn element_range<T: Element>(
    element_size: usize,
    capacity: usize,
    offset: usize,
) -> Result<std::ops::Range<usize>> {
    if T::SIZE != element_size {
        return Err(Error::invalid_argument(format!(
            "element width {} does not match block element width {}",
            T::SIZE,
            element_size
        )));
    }
    if offset >= capacity {
        return Err(Error::IndexOutOfRange {
            index: offset,
            length: capacity,
        });
    }
    let start = offset * element_size;
    Ok(start..start + element_size)
}

/// Provider of fixed-capacity raw blocks
///
/// All methods take `&self` so a single store can back several arrays.
/// A block may have at most one open accessor at a time.
pub trait BackingStore {
    /// Accessor type handed out by `open_accessor`
    type Accessor: BlockAccessor;

    /// Allocate a new zero-filled block of `element_count` elements
    fn create_block(&self, element_size: usize, element_count: usize) -> Result<BlockId>;

    /// Change the element count of a closed block
    ///
    /// Elements below `min(old, new)` keep their value. Elements exposed
    /// by growing read as zero. A shrink zeroes the truncated tail.
    fn resize_block(&self, block: BlockId, element_count: usize) -> Result<()>;

    /// Open an accessor on a closed block
    fn open_accessor(&self, block: BlockId) -> Result<Self::Accessor>;

    /// Close an accessor, returning it to the store
    fn close_accessor(&self, accessor: Self::Accessor) -> Result<()>;

    /// Permanently free a closed block
    fn release_block(&self, block: BlockId) -> Result<()>;

    /// Current element count of a block
    fn block_len(&self, block: BlockId) -> Result<usize>;

    /// Allocate a new zero-filled block and open it
    fn create_accessor(&self, element_size: usize, element_count: usize) -> Result<Self::Accessor> {
        let block = self.create_block(element_size, element_count)?;
        self.open_accessor(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecAccessor {
        bytes: Vec<u8>,
        element_size: usize,
    }

    impl BlockAccessor for VecAccessor {
        fn block(&self) -> BlockId {
            BlockId::new(0)
        }

        fn capacity(&self) -> usize {
            self.bytes.len() / self.element_size
        }

        fn element_size(&self) -> usize {
            self.element_size
        }

        fn as_bytes(&self) -> &[u8] {
            &self.bytes
        }

        fn as_bytes_mut(&mut self) -> &mut [u8] {
            &mut self.bytes
        }
    }

    #[test]
    fn test_default_element_access() {
        let mut acc = VecAccessor {
            bytes: vec![0; 16],
            element_size: 4,
        };
        acc.write_element(2, 0xdead_beefu32).unwrap();
        assert_eq!(acc.read_element::<u32>(2).unwrap(), 0xdead_beef);
        assert_eq!(acc.read_element::<u32>(1).unwrap(), 0);
        assert_eq!(&acc.as_bytes()[8..12], &[0xef, 0xbe, 0xad, 0xde]);
    }

    #[test]
    fn test_out_of_range_offset() {
        let mut acc = VecAccessor {
            bytes: vec![0; 16],
            element_size: 4,
        };
        assert!(matches!(
            acc.read_element::<u32>(4),
            Err(Error::IndexOutOfRange {
                index: 4,
                length: 4
            })
        ));
        assert!(acc.write_element(4, 1u32).is_err());
    }

    #[test]
    fn test_width_mismatch() {
        let acc = VecAccessor {
            bytes: vec![0; 16],
            element_size: 4,
        };
        assert!(matches!(
            acc.read_element::<u64>(0),
            Err(Error::InvalidArgument(_))
        ));
    }
}
