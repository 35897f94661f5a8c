//! Core identifiers shared across crates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one allocated block inside a backing store
///
/// Ids are handed out by the store on `create_block` and never reused
/// for the lifetime of that store, even after the block is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(u64);

impl BlockId {
    /// Wrap a raw block number
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw block number
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block-{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_display() {
        assert_eq!(BlockId::new(0).to_string(), "block-00000000");
        assert_eq!(BlockId::new(255).to_string(), "block-000000ff");
    }

    #[test]
    fn test_block_id_ordering() {
        assert!(BlockId::new(1) < BlockId::new(2));
        assert_eq!(BlockId::new(7).as_u64(), 7);
    }
}
