//! Stream format for array serialization
//!
//! ```text
//! +------------------+  offset 0
//! |  Element width   |  u32 LE, bytes per element
//! +------------------+  offset 4
//! |  Element count   |  u64 LE
//! +------------------+  offset 12
//! |  Elements        |  count * width bytes, logical order, LE
//! +------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use pagearray_common::{Element, Error, Result};
use std::io::Read;

/// Serialized header size in bytes
pub const HEADER_SIZE: usize = 12;

/// Header written before the element body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Bytes per element
    pub element_size: u32,
    /// Number of elements in the body
    pub count: u64,
}

impl StreamHeader {
    /// Header for `count` elements of type `T`
    pub fn for_elements<T: Element>(count: usize) -> Self {
        Self {
            element_size: T::SIZE as u32,
            count: count as u64,
        }
    }

    /// Total body size in bytes
    pub const fn body_len(&self) -> u64 {
        self.element_size as u64 * self.count
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_u32_le(self.element_size);
        buf.put_u64_le(self.count);
        buf.freeze()
    }

    /// Parse header from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::deserialization(format!(
                "stream header too small: {} bytes",
                data.len()
            )));
        }

        let mut buf = data;
        let element_size = buf.get_u32_le();
        let count = buf.get_u64_le();

        Ok(Self {
            element_size,
            count,
        })
    }

    /// Read a header from a stream
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut raw = [0u8; HEADER_SIZE];
        reader.read_exact(&mut raw).map_err(|e| {
            Error::deserialization(format!("failed to read stream header: {e}"))
        })?;
        Self::from_bytes(&raw)
    }

    /// Check that the body holds elements of type `T`
    pub fn validate_for<T: Element>(&self) -> Result<()> {
        if self.element_size as usize != T::SIZE {
            return Err(Error::deserialization(format!(
                "element width mismatch: stream has {} bytes, expected {}",
                self.element_size,
                T::SIZE
            )));
        }
        Ok(())
    }
}
