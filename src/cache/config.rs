//! Manager and handle configuration types
//!
//! Handle ordering is the builder insertion order: faster stores first,
//! slower shared stores last. All types serialize so host applications can
//! load them from whatever configuration source they use; file parsing is
//! out of scope here.

use std::time::Duration;

use crate::cache::item::{CacheItem, ExpirationMode};

/// Policy governing whether Get results are propagated to faster handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UpdateMode {
    /// Hits are never copied into other handles.
    None,
    /// A hit is copied into every handle ahead of the hit index.
    Up,
    /// Same promotion as `Up`; kept as a distinct mode so configurations can
    /// express full up-and-down propagation intent.
    UpAndDown,
}

impl Default for UpdateMode {
    fn default() -> Self {
        UpdateMode::Up
    }
}

/// Per-handle configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheHandleConfig {
    /// Handle name, used in diagnostics and error reporting.
    pub name: String,
    /// Default expiration applied to items that carry no policy of their own.
    pub expiration: ExpirationMode,
    /// Default expiration timeout, meaningful only when `expiration` is not
    /// `None`.
    pub timeout: Duration,
    /// Whether this handle's counters record anything.
    pub statistics_enabled: bool,
    /// Whether mutations touching this handle are published to the backplane.
    pub is_backplane_source: bool,
}

impl CacheHandleConfig {
    /// Create a handle configuration with no default expiration, statistics
    /// enabled, and backplane publishing disabled.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expiration: ExpirationMode::None,
            timeout: Duration::ZERO,
            statistics_enabled: true,
            is_backplane_source: false,
        }
    }

    /// Set the default expiration policy for items without one.
    pub fn with_expiration(mut self, mode: ExpirationMode, timeout: Duration) -> Self {
        self.expiration = mode;
        self.timeout = timeout;
        self
    }

    /// Enable or disable statistics recording.
    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.statistics_enabled = enabled;
        self
    }

    /// Mark this handle as a backplane source.
    pub fn with_backplane_source(mut self, enabled: bool) -> Self {
        self.is_backplane_source = enabled;
        self
    }

    /// Apply this handle's default expiration to an item that carries none.
    ///
    /// Only used at Add/Put entry points. Promotion and update propagation
    /// write the found item's own metadata verbatim.
    pub fn apply_defaults<V>(&self, item: CacheItem<V>) -> CacheItem<V> {
        if item.expiration() == ExpirationMode::None && self.expiration != ExpirationMode::None {
            item.with_expiration(self.expiration, self.timeout)
        } else {
            item
        }
    }
}

/// Manager-wide configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheManagerConfig {
    /// Promotion policy for Get hits.
    pub update_mode: UpdateMode,
    /// Retry budget for optimistic updates, on top of the first attempt.
    pub max_retries: u32,
    /// Pause between conflicting update attempts. Zero retries immediately.
    pub retry_timeout: Duration,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self {
            update_mode: UpdateMode::default(),
            max_retries: 50,
            retry_timeout: Duration::from_millis(100),
        }
    }
}
