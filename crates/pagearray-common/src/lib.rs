//! PageArray Common - Shared types and utilities
//!
//! This crate provides the error type, configuration profiles and the
//! fixed-width element codec shared by the backing store and the array.

pub mod config;
pub mod element;
pub mod error;
pub mod types;

pub use config::{ArrayProfile, CacheCapacity, StoreConfig};
pub use element::Element;
pub use error::{Error, Result};
pub use types::BlockId;
