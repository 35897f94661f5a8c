//! Error types for PageArray
//!
//! This module defines the error type shared by the backing store and the
//! array. Contract violations (bad arguments, out-of-range indices, use after
//! dispose) are rejected before any mutation; backing-store failures are
//! surfaced unchanged and never retried.

use crate::types::BlockId;
use thiserror::Error;

/// Common result type for PageArray operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for PageArray
#[derive(Debug, Error)]
pub enum Error {
    // Contract violations
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index {index} out of range for length {length}")]
    IndexOutOfRange { index: usize, length: usize },

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("length mismatch: stream declares {declared} elements, array holds {capacity}")]
    LengthMismatch { declared: u64, capacity: u64 },

    #[error("array has been disposed")]
    Disposed,

    // Backing store errors
    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("block not found: {0}")]
    BlockNotFound(BlockId),

    #[error("block is open: {0}")]
    BlockBusy(BlockId),

    // Stream and configuration errors
    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a not supported error
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a deserialization error
    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }

    /// Check if this error came out of the backing store
    #[must_use]
    pub const fn is_backing_store_failure(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Storage(_) | Self::BlockNotFound(_) | Self::BlockBusy(_)
        )
    }

    /// Check if this error is a caller contract violation
    ///
    /// Contract violations are detected before any state is touched.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::IndexOutOfRange { .. }
                | Self::NotSupported(_)
                | Self::LengthMismatch { .. }
                | Self::Disposed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::IndexOutOfRange {
            index: 1001,
            length: 1000,
        };
        assert_eq!(err.to_string(), "index 1001 out of range for length 1000");
        assert_eq!(Error::Disposed.to_string(), "array has been disposed");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::storage("mapping failed").is_backing_store_failure());
        assert!(Error::BlockBusy(BlockId::new(3)).is_backing_store_failure());
        assert!(!Error::Disposed.is_backing_store_failure());

        assert!(Error::invalid_argument("zero").is_contract_violation());
        assert!(
            Error::LengthMismatch {
                declared: 10,
                capacity: 5
            }
            .is_contract_violation()
        );
        assert!(!Error::deserialization("bad header").is_contract_violation());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_backing_store_failure());
    }
}
