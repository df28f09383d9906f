//! Cache item record shared by every handle in the chain
//!
//! Items are immutable per version: a successful conditional update replaces
//! the stored item with a new record carrying a bumped version number, which
//! is what the optimistic update engine keys on.

use std::time::{Duration, Instant};

/// Expiration policy attached to a cache item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExpirationMode {
    /// Item never expires.
    None,
    /// Timeout window restarts on every access.
    Sliding,
    /// Timeout window is fixed from creation time.
    Absolute,
}

/// Value record stored in every cache handle.
///
/// Within one handle, `(key, region)` identifies at most one live item. An
/// absent region and an empty-string region are distinct namespaces. The
/// version starts at 1 on creation and is incremented on every successful
/// in-place update within a handle.
#[derive(Debug, Clone)]
pub struct CacheItem<V> {
    key: String,
    region: Option<String>,
    value: V,
    created_at: Instant,
    last_accessed: Instant,
    expiration: ExpirationMode,
    timeout: Duration,
    version: u64,
}

impl<V> CacheItem<V> {
    /// Create a new item with no region and no expiration, version 1.
    ///
    /// Keys must be non-empty. The constructor does not enforce this so the
    /// record stays cheap to build; the manager rejects empty keys eagerly
    /// before any handle is touched, and adapters driving a handle directly
    /// are expected to uphold the same contract.
    pub fn new(key: impl Into<String>, value: V) -> Self {
        let now = Instant::now();
        Self {
            key: key.into(),
            region: None,
            value,
            created_at: now,
            last_accessed: now,
            expiration: ExpirationMode::None,
            timeout: Duration::ZERO,
            version: 1,
        }
    }

    /// Place the item in a named region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Attach an expiration policy to the item.
    pub fn with_expiration(mut self, mode: ExpirationMode, timeout: Duration) -> Self {
        self.expiration = mode;
        self.timeout = timeout;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    pub fn expiration(&self) -> ExpirationMode {
        self.expiration
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Consume the item and return its value.
    pub fn into_value(self) -> V {
        self.value
    }

    /// Check whether the item has expired at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expiration {
            ExpirationMode::None => false,
            ExpirationMode::Sliding => now.duration_since(self.last_accessed) > self.timeout,
            ExpirationMode::Absolute => now.duration_since(self.created_at) > self.timeout,
        }
    }

    /// Copy of the item with its access timestamp refreshed.
    ///
    /// Handles call this on read so sliding expiration windows restart.
    pub fn touched(&self, now: Instant) -> Self
    where
        V: Clone,
    {
        let mut item = self.clone();
        item.last_accessed = now;
        item
    }

    /// Copy of the item carrying a replacement value and version.
    ///
    /// Used by conditional updates: identity and expiration metadata are
    /// preserved, the access timestamp is refreshed.
    pub fn with_value_and_version(&self, value: V, version: u64) -> Self
    where
        V: Clone,
    {
        Self {
            key: self.key.clone(),
            region: self.region.clone(),
            value,
            created_at: self.created_at,
            last_accessed: Instant::now(),
            expiration: self.expiration,
            timeout: self.timeout,
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_item_defaults() {
        let item = CacheItem::new("k", 42u32);
        assert_eq!(item.key(), "k");
        assert_eq!(item.region(), None);
        assert_eq!(item.version(), 1);
        assert_eq!(item.expiration(), ExpirationMode::None);
        assert!(!item.is_expired(Instant::now()));
    }

    #[test]
    fn test_region_and_empty_region_are_distinct() {
        let plain = CacheItem::new("k", 0u8);
        let empty = CacheItem::new("k", 0u8).with_region("");
        let named = CacheItem::new("k", 0u8).with_region("r");
        assert_eq!(plain.region(), None);
        assert_eq!(empty.region(), Some(""));
        assert_eq!(named.region(), Some("r"));
    }

    #[test]
    fn test_absolute_expiration() {
        let item = CacheItem::new("k", 1u8)
            .with_expiration(ExpirationMode::Absolute, Duration::from_millis(10));
        assert!(!item.is_expired(Instant::now()));
        thread::sleep(Duration::from_millis(20));
        assert!(item.is_expired(Instant::now()));
    }

    #[test]
    fn test_sliding_expiration_restarts_on_touch() {
        let item = CacheItem::new("k", 1u8)
            .with_expiration(ExpirationMode::Sliding, Duration::from_millis(30));
        thread::sleep(Duration::from_millis(20));
        let item = item.touched(Instant::now());
        thread::sleep(Duration::from_millis(20));
        // 40ms since creation but only 20ms since last access
        assert!(!item.is_expired(Instant::now()));
        thread::sleep(Duration::from_millis(20));
        assert!(item.is_expired(Instant::now()));
    }

    #[test]
    fn test_with_value_and_version_preserves_identity() {
        let item = CacheItem::new("k", 1u32)
            .with_region("r")
            .with_expiration(ExpirationMode::Absolute, Duration::from_secs(60));
        let next = item.with_value_and_version(2, item.version() + 1);
        assert_eq!(next.key(), "k");
        assert_eq!(next.region(), Some("r"));
        assert_eq!(*next.value(), 2);
        assert_eq!(next.version(), 2);
        assert_eq!(next.expiration(), ExpirationMode::Absolute);
        assert_eq!(next.created_at(), item.created_at());
    }
}
