//! Cache manager orchestrator
//!
//! The manager owns an ordered chain of cache handles and fans every
//! operation out across them: probes in configured order on reads, upserts in
//! order on writes, and promotes hits into the faster handles according to
//! the update mode. Mutations that touch a backplane-source handle publish an
//! invalidation message once the local mutation has completed; peer messages
//! are applied structurally, never republished.
//!
//! There is no manager-wide lock. Handles are individually thread-safe, and
//! handles may be briefly inconsistent under concurrent access; a later Get
//! or a peer invalidation heals the divergence.

use std::sync::{Arc, Weak};

use crate::cache::backplane::{
    Backplane, BackplaneAction, BackplaneMessage, InstanceId, Subscription,
};
use crate::cache::config::{CacheHandleConfig, CacheManagerConfig, UpdateMode};
use crate::cache::error::CacheError;
use crate::cache::handle::CacheHandle;
use crate::cache::handle::memory::MemoryHandle;
use crate::cache::item::CacheItem;
use crate::cache::stats::{CounterKind, StatsCounters};
use crate::cache::update::{UpdateOutcome, run_update};

/// Orchestrator over an ordered chain of cache handles.
///
/// Cheap to share: callers typically wrap it in an `Arc` or hand out
/// references. Dropping the manager releases the backplane subscription
/// first, then the handles; operations must not race disposal.
pub struct CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    // Declared before `inner` so the subscription handler detaches before
    // the handles are torn down.
    _subscription: Option<Subscription>,
    inner: Arc<ManagerInner<V>>,
}

struct ManagerInner<V>
where
    V: Clone + Send + Sync + 'static,
{
    instance_id: InstanceId,
    config: CacheManagerConfig,
    handles: Vec<Box<dyn CacheHandle<V>>>,
    backplane: Option<Arc<dyn Backplane>>,
}

impl<V> CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Start building a manager.
    pub fn builder() -> CacheManagerBuilder<V> {
        CacheManagerBuilder::new()
    }

    /// This instance's backplane identity.
    pub fn instance_id(&self) -> InstanceId {
        self.inner.instance_id
    }

    /// Number of handles in the chain.
    pub fn handle_count(&self) -> usize {
        self.inner.handles.len()
    }

    /// Counter set of the handle at `index`, in chain order.
    pub fn handle_stats(&self, index: usize) -> Option<&StatsCounters> {
        self.inner.handles.get(index).map(|h| h.stats())
    }

    /// Look up a value, probing handles in order until a hit.
    ///
    /// Records a miss on every handle probed before the hit and a hit on the
    /// hit handle. When the update mode allows promotion, the found item is
    /// copied into every handle ahead of the hit index, carrying its own
    /// expiration metadata.
    pub fn get(&self, key: &str, region: Option<&str>) -> Result<Option<V>, CacheError> {
        Ok(self.get_item(key, region)?.map(CacheItem::into_value))
    }

    /// Like [`get`](Self::get) but returns the full item record.
    pub fn get_item(
        &self,
        key: &str,
        region: Option<&str>,
    ) -> Result<Option<CacheItem<V>>, CacheError> {
        validate_key(key)?;
        let inner = &self.inner;

        for (index, handle) in inner.handles.iter().enumerate() {
            handle.stats().increment(CounterKind::GetCalls);
            match handle.get(key, region)? {
                Some(item) => {
                    handle.stats().increment(CounterKind::Hits);
                    for probed in &inner.handles[..index] {
                        probed.stats().increment(CounterKind::Misses);
                    }
                    if index > 0 && inner.config.update_mode != UpdateMode::None {
                        log::trace!(
                            "promoting '{}' from handle '{}' into {} faster handle(s)",
                            key,
                            handle.name(),
                            index
                        );
                        for target in &inner.handles[..index] {
                            // Verbatim copy: the found item's expiration wins
                            // over the target handle's defaults
                            target.put(item.clone())?;
                        }
                    }
                    return Ok(Some(item));
                }
                None => continue,
            }
        }

        for handle in &inner.handles {
            handle.stats().increment(CounterKind::Misses);
        }
        Ok(None)
    }

    /// Insert only if the first handle holds no live item for the item's
    /// `(key, region)`.
    ///
    /// Returns false without mutating any handle when the first handle
    /// already holds one. On success the item is upserted into every
    /// remaining handle. `AddCalls` is incremented on every handle on every
    /// call, independent of the outcome.
    pub fn add(&self, item: CacheItem<V>) -> Result<bool, CacheError> {
        validate_key(item.key())?;
        let inner = &self.inner;

        for handle in &inner.handles {
            handle.stats().increment(CounterKind::AddCalls);
        }

        let (first, rest) = inner.chain();
        if !first.add(first.config().apply_defaults(item.clone()))? {
            return Ok(false);
        }
        for handle in rest {
            handle.put(handle.config().apply_defaults(item.clone()))?;
        }

        inner.publish(BackplaneAction::Changed {
            key: item.key().to_string(),
            region: item.region().map(str::to_string),
        });
        Ok(true)
    }

    /// Unconditional upsert across every handle, in order.
    pub fn put(&self, item: CacheItem<V>) -> Result<(), CacheError> {
        validate_key(item.key())?;
        let inner = &self.inner;

        for handle in &inner.handles {
            handle.stats().increment(CounterKind::PutCalls);
            handle.put(handle.config().apply_defaults(item.clone()))?;
        }

        inner.publish(BackplaneAction::Changed {
            key: item.key().to_string(),
            region: item.region().map(str::to_string),
        });
        Ok(())
    }

    /// Remove an item from every handle.
    ///
    /// Returns true iff the first handle held the item; removal is applied to
    /// every handle unconditionally.
    pub fn remove(&self, key: &str, region: Option<&str>) -> Result<bool, CacheError> {
        validate_key(key)?;
        let inner = &self.inner;

        for handle in &inner.handles {
            handle.stats().increment(CounterKind::RemoveCalls);
        }

        let (first, rest) = inner.chain();
        let existed = first.remove(key, region)?;
        for handle in rest {
            handle.remove(key, region)?;
        }

        if existed {
            inner.publish(BackplaneAction::Removed {
                key: key.to_string(),
                region: region.map(str::to_string),
            });
        }
        Ok(existed)
    }

    /// Empty every handle.
    pub fn clear(&self) -> Result<(), CacheError> {
        let inner = &self.inner;
        for handle in &inner.handles {
            handle.stats().increment(CounterKind::ClearCalls);
            handle.clear()?;
        }
        inner.publish(BackplaneAction::Cleared);
        Ok(())
    }

    /// Remove only the items tagged with exactly `region` from every handle.
    pub fn clear_region(&self, region: &str) -> Result<(), CacheError> {
        let inner = &self.inner;
        for handle in &inner.handles {
            handle.stats().increment(CounterKind::ClearRegionCalls);
            handle.clear_region(region)?;
        }
        inner.publish(BackplaneAction::RegionCleared {
            region: region.to_string(),
        });
        Ok(())
    }

    /// Optimistically update a value using the configured retry budget.
    pub fn update<F>(
        &self,
        key: &str,
        region: Option<&str>,
        transform: F,
    ) -> Result<UpdateOutcome<V>, CacheError>
    where
        F: Fn(&V) -> V,
    {
        self.update_with_retries(key, region, self.inner.config.max_retries, transform)
    }

    /// Optimistically update a value with an explicit retry budget.
    ///
    /// On success the new item is upserted into every remaining handle and a
    /// `Changed` message is published.
    pub fn update_with_retries<F>(
        &self,
        key: &str,
        region: Option<&str>,
        max_retries: u32,
        transform: F,
    ) -> Result<UpdateOutcome<V>, CacheError>
    where
        F: Fn(&V) -> V,
    {
        validate_key(key)?;
        let inner = &self.inner;

        let (first, rest) = inner.chain();
        let outcome = run_update(
            first,
            key,
            region,
            transform,
            max_retries,
            inner.config.retry_timeout,
        )?;

        if let UpdateOutcome::Updated(item) = &outcome {
            for handle in rest {
                handle.put(item.clone())?;
            }
            inner.publish(BackplaneAction::Changed {
                key: key.to_string(),
                region: region.map(str::to_string),
            });
        }
        Ok(outcome)
    }
}

impl<V> ManagerInner<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// First handle and the remainder of the chain. The builder guarantees
    /// at least one handle.
    fn chain(&self) -> (&dyn CacheHandle<V>, &[Box<dyn CacheHandle<V>>]) {
        (&*self.handles[0], &self.handles[1..])
    }

    /// Publish an invalidation when the chain contains a backplane source.
    ///
    /// Fire-and-forget: the local mutation already succeeded, so transport
    /// failures are logged and swallowed.
    fn publish(&self, action: BackplaneAction) {
        let Some(backplane) = &self.backplane else {
            return;
        };
        if !self.handles.iter().any(|h| h.config().is_backplane_source) {
            return;
        }
        let message = BackplaneMessage::new(self.instance_id, action);
        if let Err(error) = backplane.publish(message) {
            log::warn!(
                "backplane publish failed on instance {}: {}",
                self.instance_id,
                error
            );
        }
    }

    /// Apply a peer-originated structural effect to every handle.
    ///
    /// No counters, no republish, no refetch: a later local Get repopulates
    /// from whichever handle still holds current data.
    fn apply_peer(&self, action: BackplaneAction) {
        let result = match &action {
            BackplaneAction::Removed { key, region }
            | BackplaneAction::Changed { key, region } => self
                .handles
                .iter()
                .try_for_each(|h| h.remove(key, region.as_deref()).map(|_| ())),
            BackplaneAction::RegionCleared { region } => {
                self.handles.iter().try_for_each(|h| h.clear_region(region))
            }
            BackplaneAction::Cleared => self.handles.iter().try_for_each(|h| h.clear()),
        };
        if let Err(error) = result {
            log::warn!(
                "failed to apply peer invalidation {:?} on instance {}: {}",
                action,
                self.instance_id,
                error
            );
        }
    }
}

impl<V> std::fmt::Debug for CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("instance_id", &self.inner.instance_id)
            .field("handles", &self.inner.handles.len())
            .field("update_mode", &self.inner.config.update_mode)
            .finish()
    }
}

fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::invalid_argument("key must not be empty"));
    }
    Ok(())
}

/// Fluent builder assembling the handle chain in probe order.
pub struct CacheManagerBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    config: CacheManagerConfig,
    handles: Vec<Box<dyn CacheHandle<V>>>,
    backplane: Option<Arc<dyn Backplane>>,
}

impl<V> CacheManagerBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a builder with default manager configuration.
    pub fn new() -> Self {
        Self {
            config: CacheManagerConfig::default(),
            handles: Vec::new(),
            backplane: None,
        }
    }

    /// Replace the whole manager configuration.
    pub fn config(mut self, config: CacheManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the promotion policy.
    pub fn update_mode(mut self, mode: UpdateMode) -> Self {
        self.config.update_mode = mode;
        self
    }

    /// Set the retry budget for optimistic updates.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the pause between conflicting update attempts.
    pub fn retry_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.retry_timeout = timeout;
        self
    }

    /// Append an in-memory handle built from `config`.
    pub fn memory_handle(self, config: CacheHandleConfig) -> Self {
        self.handle(Box::new(MemoryHandle::new(config)))
    }

    /// Append a custom backend handle.
    pub fn handle(mut self, handle: Box<dyn CacheHandle<V>>) -> Self {
        self.handles.push(handle);
        self
    }

    /// Attach a backplane; the manager subscribes on build.
    pub fn backplane(mut self, backplane: Arc<dyn Backplane>) -> Self {
        self.backplane = Some(backplane);
        self
    }

    /// Assemble the manager and wire the backplane subscription.
    pub fn build(self) -> Result<CacheManager<V>, CacheError> {
        if self.handles.is_empty() {
            return Err(CacheError::invalid_argument(
                "cache manager requires at least one handle",
            ));
        }

        let inner = Arc::new(ManagerInner {
            instance_id: InstanceId::new(),
            config: self.config,
            handles: self.handles,
            backplane: self.backplane,
        });

        let subscription = match &inner.backplane {
            Some(backplane) => {
                let weak: Weak<ManagerInner<V>> = Arc::downgrade(&inner);
                let own_id = inner.instance_id;
                Some(backplane.subscribe(Box::new(move |message: BackplaneMessage| {
                    // Echo suppression: our own mutations already happened
                    if message.origin == own_id {
                        return;
                    }
                    if let Some(inner) = weak.upgrade() {
                        inner.apply_peer(message.action);
                    }
                }))?)
            }
            None => None,
        };

        Ok(CacheManager {
            _subscription: subscription,
            inner,
        })
    }
}

impl<V> Default for CacheManagerBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
