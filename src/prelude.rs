//! Stratacache prelude - convenient imports for users
//!
//! This module provides everything users need to assemble a layered cache.

// Re-export the public API
pub use crate::cache::manager::{CacheManager, CacheManagerBuilder};

// Re-export essential error and result types that users might need
pub use crate::cache::error::CacheError;
pub use crate::cache::update::UpdateOutcome;

// Re-export the item and configuration vocabulary
pub use crate::cache::config::{CacheHandleConfig, CacheManagerConfig, UpdateMode};
pub use crate::cache::item::{CacheItem, ExpirationMode};

// Re-export capability traits that adapter implementations need
pub use crate::cache::backplane::{Backplane, BackplaneMessage, Subscription};
pub use crate::cache::handle::{CacheHandle, ConditionalWrite};
