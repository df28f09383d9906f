//! Cross-instance invalidation protocol
//!
//! The backplane is an abstract pub/sub channel connecting manager instances
//! that share an authoritative backing store. Messages carry the originating
//! instance id so receivers can suppress their own echoes. Delivery is
//! best-effort and asynchronous: publish returns without waiting, message
//! loss is not retried by this layer, and handlers run on whatever thread the
//! transport chooses.

pub mod channel;

pub use channel::ChannelBackplane;

use uuid::Uuid;

use crate::cache::error::CacheError;

/// Opaque per-manager identity used for echo suppression.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structural effect a peer should apply to its handles.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BackplaneAction {
    /// An item was removed.
    Removed { key: String, region: Option<String> },
    /// A whole region was cleared.
    RegionCleared { region: String },
    /// Every item was cleared.
    Cleared,
    /// An item was added, replaced, or updated; peers drop their stale copy
    /// and repopulate on the next local Get.
    Changed { key: String, region: Option<String> },
}

/// Invalidation message exchanged between manager instances.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BackplaneMessage {
    /// Identity of the publishing manager instance.
    pub origin: InstanceId,
    /// Structural effect to apply.
    pub action: BackplaneAction,
}

impl BackplaneMessage {
    pub fn new(origin: InstanceId, action: BackplaneAction) -> Self {
        Self { origin, action }
    }
}

/// Handler invoked for every message delivered to a subscription.
///
/// Must be safe to run concurrently with any foreground manager call.
pub type BackplaneHandler = Box<dyn Fn(BackplaneMessage) + Send + Sync + 'static>;

/// Abstract pub/sub channel between manager instances.
///
/// Concrete transports (in-process channel, distributed message bus clients)
/// implement this. `publish` is fire-and-forget from the caller's point of
/// view; transport failures surface as errors that the manager logs and
/// swallows.
pub trait Backplane: Send + Sync {
    /// Enqueue a message for delivery to every subscriber.
    fn publish(&self, message: BackplaneMessage) -> Result<(), CacheError>;

    /// Register a handler. The subscription is released on drop.
    fn subscribe(&self, handler: BackplaneHandler) -> Result<Subscription, CacheError>;
}

/// Active subscription handle. Dropping it unregisters the handler.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wrap a cancellation closure invoked once on drop.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
