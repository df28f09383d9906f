//! In-process channel backplane
//!
//! Transport for manager instances living in one process: publishes flow
//! through an unbounded channel drained by a dispatcher thread, which invokes
//! every registered handler. Clones share the channel, so two managers built
//! over clones of one `ChannelBackplane` see each other's invalidations.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Sender, unbounded};
use crossbeam_utils::CachePadded;

use super::{Backplane, BackplaneHandler, BackplaneMessage, Subscription};
use crate::cache::error::CacheError;

/// Shared subscriber registry and delivery counters.
struct Registry {
    subscribers: Mutex<HashMap<u64, Arc<BackplaneHandler>>>,
    next_id: AtomicU64,
    /// Messages accepted for delivery
    published: CachePadded<AtomicU64>,
    /// Handler invocations performed by the dispatcher
    delivered: CachePadded<AtomicU64>,
}

/// Channel-backed in-process backplane.
#[derive(Clone)]
pub struct ChannelBackplane {
    tx: Sender<BackplaneMessage>,
    registry: Arc<Registry>,
}

impl ChannelBackplane {
    /// Create a backplane and spawn its dispatcher thread.
    ///
    /// The dispatcher exits when every clone of this backplane has been
    /// dropped and the channel disconnects.
    pub fn new() -> Self {
        let (tx, rx) = unbounded::<BackplaneMessage>();
        let registry = Arc::new(Registry {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            published: CachePadded::new(AtomicU64::new(0)),
            delivered: CachePadded::new(AtomicU64::new(0)),
        });

        let dispatch_registry = Arc::downgrade(&registry);
        thread::spawn(move || {
            while let Ok(message) = rx.recv() {
                let Some(registry) = dispatch_registry.upgrade() else {
                    break;
                };
                // Snapshot the handlers so delivery runs outside the lock
                let handlers: Vec<Arc<BackplaneHandler>> = {
                    let subscribers = registry
                        .subscribers
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    subscribers.values().cloned().collect()
                };
                for handler in handlers {
                    handler(message.clone());
                    registry.delivered.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        Self { tx, registry }
    }

    /// Messages accepted for delivery so far.
    pub fn published_count(&self) -> u64 {
        self.registry.published.load(Ordering::Relaxed)
    }

    /// Handler invocations performed so far.
    pub fn delivered_count(&self) -> u64 {
        self.registry.delivered.load(Ordering::Relaxed)
    }
}

impl Default for ChannelBackplane {
    fn default() -> Self {
        Self::new()
    }
}

impl Backplane for ChannelBackplane {
    fn publish(&self, message: BackplaneMessage) -> Result<(), CacheError> {
        self.tx
            .send(message)
            .map_err(|_| CacheError::backplane_unavailable("dispatcher channel disconnected"))?;
        self.registry.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn subscribe(&self, handler: BackplaneHandler) -> Result<Subscription, CacheError> {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut subscribers = self
                .registry
                .subscribers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            subscribers.insert(id, Arc::new(handler));
        }
        let registry = Arc::clone(&self.registry);
        Ok(Subscription::new(move || {
            let mut subscribers = registry
                .subscribers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            subscribers.remove(&id);
        }))
    }
}

impl std::fmt::Debug for ChannelBackplane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBackplane")
            .field("published", &self.published_count())
            .field("delivered", &self.delivered_count())
            .finish()
    }
}
