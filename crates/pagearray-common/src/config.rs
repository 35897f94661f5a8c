//! Configuration types for PageArray
//!
//! An [`ArrayProfile`] fixes page size and cache capacity for one array
//! instance; a [`StoreConfig`] tunes the memory-mapped backing store. Both
//! are serde-friendly so host applications can embed them in their own
//! configuration files.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Maximum number of simultaneously open pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCapacity {
    /// At most this many pages are open; least recently used pages are closed
    Pages(usize),
    /// Pages stay open until the array is disposed
    Unbounded,
}

impl CacheCapacity {
    /// Page limit, or `None` when unbounded
    #[must_use]
    pub const fn limit(self) -> Option<usize> {
        match self {
            Self::Pages(n) => Some(n),
            Self::Unbounded => None,
        }
    }

    /// Check whether this capacity evicts pages
    #[must_use]
    pub const fn is_bounded(self) -> bool {
        matches!(self, Self::Pages(_))
    }
}

impl Default for CacheCapacity {
    fn default() -> Self {
        Self::Pages(ArrayProfile::DEFAULT_CACHE_PAGES)
    }
}

/// Immutable page/cache configuration for one array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayProfile {
    /// Number of elements held by each full page
    pub elements_per_page: usize,
    /// Maximum number of open pages
    #[serde(default)]
    pub cache_capacity: CacheCapacity,
}

impl ArrayProfile {
    /// Default page size in elements
    pub const DEFAULT_ELEMENTS_PER_PAGE: usize = 64 * 1024;

    /// Default number of open pages
    pub const DEFAULT_CACHE_PAGES: usize = 32;

    /// Create a profile with explicit page size and cache capacity
    #[must_use]
    pub const fn new(elements_per_page: usize, cache_capacity: CacheCapacity) -> Self {
        Self {
            elements_per_page,
            cache_capacity,
        }
    }

    /// Default page size, every opened page stays open
    #[must_use]
    pub const fn no_cache() -> Self {
        Self::new(Self::DEFAULT_ELEMENTS_PER_PAGE, CacheCapacity::Unbounded)
    }

    /// Default page size, a single open page at a time
    #[must_use]
    pub const fn one_page() -> Self {
        Self::new(Self::DEFAULT_ELEMENTS_PER_PAGE, CacheCapacity::Pages(1))
    }

    /// Default page size, `pages` open pages
    #[must_use]
    pub const fn aggressive(pages: usize) -> Self {
        Self::new(Self::DEFAULT_ELEMENTS_PER_PAGE, CacheCapacity::Pages(pages))
    }

    /// Validate the profile
    pub fn validate(&self) -> Result<()> {
        if self.elements_per_page == 0 {
            return Err(Error::invalid_argument(
                "elements per page must be at least 1",
            ));
        }
        if self.cache_capacity == CacheCapacity::Pages(0) {
            return Err(Error::invalid_argument(
                "cache capacity must be at least 1 page",
            ));
        }
        Ok(())
    }
}

impl Default for ArrayProfile {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ELEMENTS_PER_PAGE, CacheCapacity::default())
    }
}

/// Memory-mapped store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Flush a mapping to the backing file when its accessor is closed
    pub sync_on_close: bool,
    /// Minimum number of bytes the backing file grows by
    pub growth_step: u64,
}

impl StoreConfig {
    /// Default growth step (1 MB)
    pub const DEFAULT_GROWTH_STEP: u64 = 1024 * 1024;

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.growth_step == 0 {
            return Err(Error::Configuration("growth step must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_close: false,
            growth_step: Self::DEFAULT_GROWTH_STEP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = ArrayProfile::default();
        assert_eq!(profile.elements_per_page, 65_536);
        assert_eq!(profile.cache_capacity, CacheCapacity::Pages(32));
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(ArrayProfile::no_cache().cache_capacity.limit(), None);
        assert_eq!(ArrayProfile::one_page().cache_capacity.limit(), Some(1));
        assert!(ArrayProfile::aggressive(8).cache_capacity.is_bounded());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let profile = ArrayProfile::new(0, CacheCapacity::Pages(4));
        assert!(matches!(profile.validate(), Err(Error::InvalidArgument(_))));

        let profile = ArrayProfile::new(256, CacheCapacity::Pages(0));
        assert!(matches!(profile.validate(), Err(Error::InvalidArgument(_))));

        let profile = ArrayProfile::new(1, CacheCapacity::Unbounded);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_profile_from_json() {
        let profile: ArrayProfile = serde_json::from_str(
            r#"{"elements_per_page": 256, "cache_capacity": {"pages": 4}}"#,
        )
        .unwrap();
        assert_eq!(profile, ArrayProfile::new(256, CacheCapacity::Pages(4)));

        let profile: ArrayProfile =
            serde_json::from_str(r#"{"elements_per_page": 16, "cache_capacity": "unbounded"}"#)
                .unwrap();
        assert_eq!(profile.cache_capacity, CacheCapacity::Unbounded);

        let profile: ArrayProfile = serde_json::from_str(r#"{"elements_per_page": 16}"#).unwrap();
        assert_eq!(profile.cache_capacity, CacheCapacity::default());
    }

    #[test]
    fn test_store_config() {
        let config: StoreConfig = serde_json::from_str(r#"{"sync_on_close": true}"#).unwrap();
        assert!(config.sync_on_close);
        assert_eq!(config.growth_step, StoreConfig::DEFAULT_GROWTH_STEP);

        let config = StoreConfig {
            growth_step: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }
}
