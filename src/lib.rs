//! Stratacache - layered cache orchestration
//!
//! One logical cache interface backed by an ordered chain of heterogeneous
//! cache handles, kept mutually consistent via configurable propagation and
//! synchronized across process instances through a pub/sub backplane.
//!
//! # Features
//!
//! - **Ordered handle chain**: fast in-process stores probed before slower
//!   shared stores, with hit promotion into the faster handles
//! - **Optimistic concurrency**: version-checked updates with a bounded
//!   read-transform-write retry loop, no manager-wide lock
//! - **Backplane invalidation**: cross-instance remove/clear propagation with
//!   sender-id echo suppression
//! - **Per-handle statistics**: independent atomic counters per handle
//! - **Capability interfaces**: backends and backplane transports plug in
//!   behind small traits

// Public API modules
pub mod cache;
pub mod prelude;

// Re-export the public API at the crate root for convenience
pub use cache::backplane::{
    Backplane, BackplaneAction, BackplaneHandler, BackplaneMessage, ChannelBackplane, InstanceId,
    Subscription,
};
pub use cache::config::{CacheHandleConfig, CacheManagerConfig, UpdateMode};
pub use cache::error::CacheError;
pub use cache::handle::memory::MemoryHandle;
pub use cache::handle::{CacheHandle, ConditionalWrite};
pub use cache::item::{CacheItem, ExpirationMode};
pub use cache::manager::{CacheManager, CacheManagerBuilder};
pub use cache::stats::{CounterKind, StatsCounters};
pub use cache::update::UpdateOutcome;
