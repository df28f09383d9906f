//! In-process reference backend backed by a concurrent hash map
//!
//! This is the fast tier used by tests and default builds. Expiration is
//! lazy: expired items are dropped when a lookup or conditional write finds
//! them, never by a background sweeper.

use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::cache::config::CacheHandleConfig;
use crate::cache::error::CacheError;
use crate::cache::handle::{CacheHandle, ConditionalWrite};
use crate::cache::item::{CacheItem, ExpirationMode};
use crate::cache::stats::{CounterKind, StatsCounters};

/// Composite map key. Region `None` and region `Some("")` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ItemKey {
    key: String,
    region: Option<String>,
}

impl ItemKey {
    fn new(key: &str, region: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            region: region.map(str::to_string),
        }
    }
}

/// Dictionary-style in-memory cache handle.
pub struct MemoryHandle<V> {
    config: CacheHandleConfig,
    map: DashMap<ItemKey, CacheItem<V>>,
    stats: StatsCounters,
}

impl<V> MemoryHandle<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty handle with the given configuration.
    pub fn new(config: CacheHandleConfig) -> Self {
        let stats = StatsCounters::new(config.statistics_enabled);
        Self {
            config,
            map: DashMap::new(),
            stats,
        }
    }

    /// Current number of live entries, expired items included until they are
    /// lazily collected.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop the entry if it has expired. Returns true when something was
    /// removed.
    fn evict_if_expired(&self, key: &ItemKey, now: Instant) -> bool {
        if self.map.remove_if(key, |_, item| item.is_expired(now)).is_some() {
            self.stats.decrement(CounterKind::Items);
            true
        } else {
            false
        }
    }
}

impl<V> CacheHandle<V> for MemoryHandle<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn config(&self) -> &CacheHandleConfig {
        &self.config
    }

    fn get(&self, key: &str, region: Option<&str>) -> Result<Option<CacheItem<V>>, CacheError> {
        let item_key = ItemKey::new(key, region);
        let now = Instant::now();
        if self.evict_if_expired(&item_key, now) {
            return Ok(None);
        }
        match self.map.get_mut(&item_key) {
            Some(mut entry) => {
                if entry.expiration() == ExpirationMode::Sliding {
                    let refreshed = entry.touched(now);
                    *entry = refreshed.clone();
                    Ok(Some(refreshed))
                } else {
                    Ok(Some(entry.clone()))
                }
            }
            None => Ok(None),
        }
    }

    fn add(&self, item: CacheItem<V>) -> Result<bool, CacheError> {
        let item_key = ItemKey::new(item.key(), item.region());
        let now = Instant::now();
        // The entry guard holds the shard lock, so check-and-insert is atomic
        match self.map.entry(item_key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    // Replacing a dead entry, live count is unchanged
                    occupied.insert(item);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(item);
                self.stats.increment(CounterKind::Items);
                Ok(true)
            }
        }
    }

    fn put(&self, item: CacheItem<V>) -> Result<(), CacheError> {
        let item_key = ItemKey::new(item.key(), item.region());
        if self.map.insert(item_key, item).is_none() {
            self.stats.increment(CounterKind::Items);
        }
        Ok(())
    }

    fn remove(&self, key: &str, region: Option<&str>) -> Result<bool, CacheError> {
        let item_key = ItemKey::new(key, region);
        if self.map.remove(&item_key).is_some() {
            self.stats.decrement(CounterKind::Items);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut removed = 0u64;
        self.map.retain(|_, _| {
            removed += 1;
            false
        });
        self.stats.decrement_by(CounterKind::Items, removed);
        Ok(())
    }

    fn clear_region(&self, region: &str) -> Result<(), CacheError> {
        let mut removed = 0u64;
        self.map.retain(|item_key, _| {
            if item_key.region.as_deref() == Some(region) {
                removed += 1;
                false
            } else {
                true
            }
        });
        self.stats.decrement_by(CounterKind::Items, removed);
        Ok(())
    }

    fn update_conditional(
        &self,
        key: &str,
        region: Option<&str>,
        expected_version: u64,
        value: V,
    ) -> Result<ConditionalWrite<V>, CacheError> {
        let item_key = ItemKey::new(key, region);
        let now = Instant::now();
        if self.evict_if_expired(&item_key, now) {
            return Ok(ConditionalWrite::Missing);
        }
        // get_mut holds the shard write lock for the whole compare-and-swap
        match self.map.get_mut(&item_key) {
            Some(mut entry) => {
                if entry.version() != expected_version {
                    return Ok(ConditionalWrite::VersionMismatch);
                }
                let next = entry.with_value_and_version(value, entry.version() + 1);
                *entry = next.clone();
                Ok(ConditionalWrite::Written(next))
            }
            None => Ok(ConditionalWrite::Missing),
        }
    }

    fn stats(&self) -> &StatsCounters {
        &self.stats
    }
}

impl<V> std::fmt::Debug for MemoryHandle<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("name", &self.config.name)
            .field("entries", &self.map.len())
            .finish()
    }
}
