//! Cache handle capability contract
//!
//! A handle is one tier in the cache chain. Backend adapters (in-memory map,
//! OS-level cache, distributed store clients) implement [`CacheHandle`]; the
//! orchestrator issues no cross-handle lock, so every handle must be
//! internally thread-safe for all operations.

pub mod memory;

use std::sync::Arc;

use crate::cache::config::CacheHandleConfig;
use crate::cache::error::CacheError;
use crate::cache::item::CacheItem;
use crate::cache::stats::StatsCounters;

/// Outcome of a version-checked write.
///
/// Version conflict is an expected outcome on the optimistic update path, so
/// it is a variant here rather than an error.
#[derive(Debug, Clone)]
pub enum ConditionalWrite<V> {
    /// The write was applied; carries the stored item with its new version.
    Written(CacheItem<V>),
    /// The stored version differs from the expected version.
    VersionMismatch,
    /// No live item exists for the key.
    Missing,
}

/// Single-tier store capability.
///
/// All operations take effect on this handle only; fan-out across the chain
/// is the manager's job. `add` must be an atomic check-and-insert: two
/// concurrent callers must never both succeed for the same `(key, region)`.
pub trait CacheHandle<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Handle configuration supplied at construction.
    fn config(&self) -> &CacheHandleConfig;

    /// Look up a live item. Expired items read as absent.
    fn get(&self, key: &str, region: Option<&str>) -> Result<Option<CacheItem<V>>, CacheError>;

    /// Insert only if no live item exists. Returns whether the insert won.
    fn add(&self, item: CacheItem<V>) -> Result<bool, CacheError>;

    /// Unconditional upsert, overwriting any existing item.
    fn put(&self, item: CacheItem<V>) -> Result<(), CacheError>;

    /// Remove an item. Returns whether it existed.
    fn remove(&self, key: &str, region: Option<&str>) -> Result<bool, CacheError>;

    /// Remove every item in this handle.
    fn clear(&self) -> Result<(), CacheError>;

    /// Remove only the items tagged with exactly `region`.
    fn clear_region(&self, region: &str) -> Result<(), CacheError>;

    /// Version-checked replace. The stored item's version must equal
    /// `expected_version` for the write to land; on success the new item
    /// carries the incremented version.
    fn update_conditional(
        &self,
        key: &str,
        region: Option<&str>,
        expected_version: u64,
        value: V,
    ) -> Result<ConditionalWrite<V>, CacheError>;

    /// This handle's counter set.
    fn stats(&self) -> &StatsCounters;

    /// Handle name from configuration.
    fn name(&self) -> &str {
        &self.config().name
    }
}

/// Shared handles delegate to their inner store, so tests and hosts can keep
/// a reference to a handle that a manager owns.
impl<V, H> CacheHandle<V> for Arc<H>
where
    V: Clone + Send + Sync + 'static,
    H: CacheHandle<V> + ?Sized,
{
    fn config(&self) -> &CacheHandleConfig {
        (**self).config()
    }

    fn get(&self, key: &str, region: Option<&str>) -> Result<Option<CacheItem<V>>, CacheError> {
        (**self).get(key, region)
    }

    fn add(&self, item: CacheItem<V>) -> Result<bool, CacheError> {
        (**self).add(item)
    }

    fn put(&self, item: CacheItem<V>) -> Result<(), CacheError> {
        (**self).put(item)
    }

    fn remove(&self, key: &str, region: Option<&str>) -> Result<bool, CacheError> {
        (**self).remove(key, region)
    }

    fn clear(&self) -> Result<(), CacheError> {
        (**self).clear()
    }

    fn clear_region(&self, region: &str) -> Result<(), CacheError> {
        (**self).clear_region(region)
    }

    fn update_conditional(
        &self,
        key: &str,
        region: Option<&str>,
        expected_version: u64,
        value: V,
    ) -> Result<ConditionalWrite<V>, CacheError> {
        (**self).update_conditional(key, region, expected_version, value)
    }

    fn stats(&self) -> &StatsCounters {
        (**self).stats()
    }
}
