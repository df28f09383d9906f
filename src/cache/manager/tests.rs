use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::*;
use crate::cache::backplane::ChannelBackplane;
use crate::cache::handle::ConditionalWrite;
use crate::cache::item::ExpirationMode;

fn shared_handle(name: &str) -> Arc<MemoryHandle<String>> {
    Arc::new(MemoryHandle::new(CacheHandleConfig::new(name)))
}

/// Manager over externally held handles so tests can inspect each tier.
fn chained_manager(
    handles: &[Arc<MemoryHandle<String>>],
    mode: UpdateMode,
) -> CacheManager<String> {
    let mut builder = CacheManager::builder().update_mode(mode);
    for handle in handles {
        builder = builder.handle(Box::new(Arc::clone(handle)));
    }
    builder.build().unwrap()
}

fn item(key: &str, value: &str) -> CacheItem<String> {
    CacheItem::new(key, value.to_string())
}

fn wait_until(deadline_ms: u64, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    predicate()
}

#[test]
fn test_add_propagates_to_every_handle() {
    let handles = [shared_handle("h0"), shared_handle("h1")];
    let manager = chained_manager(&handles, UpdateMode::Up);

    assert!(manager.add(item("k", "v")).unwrap());
    for handle in &handles {
        let stored = handle.get("k", None).unwrap().expect("propagated");
        assert_eq!(stored.value(), "v");
    }
    assert_eq!(manager.get("k", None).unwrap().as_deref(), Some("v"));
}

#[test]
fn test_second_add_returns_false_but_counts_everywhere() {
    let handles = [shared_handle("h0"), shared_handle("h1")];
    let manager = chained_manager(&handles, UpdateMode::Up);

    assert!(manager.add(item("k", "first")).unwrap());
    assert!(!manager.add(item("k", "second")).unwrap());

    for handle in &handles {
        assert_eq!(handle.stats().get(CounterKind::AddCalls), 2);
    }
    // the losing add mutated nothing
    assert_eq!(manager.get("k", None).unwrap().as_deref(), Some("first"));
}

#[test]
fn test_put_counts_on_every_handle_per_call() {
    let handles = [shared_handle("h0"), shared_handle("h1")];
    let manager = chained_manager(&handles, UpdateMode::Up);

    for i in 0..5 {
        manager.put(item("k", &format!("v{}", i))).unwrap();
    }
    for handle in &handles {
        assert_eq!(handle.stats().get(CounterKind::PutCalls), 5);
        assert_eq!(handle.stats().get(CounterKind::Items), 1);
    }
    assert_eq!(manager.get("k", None).unwrap().as_deref(), Some("v4"));
}

#[test]
fn test_remove_reports_first_handle_presence() {
    let handles = [shared_handle("h0"), shared_handle("h1")];
    let manager = chained_manager(&handles, UpdateMode::Up);

    assert!(!manager.remove("absent", None).unwrap());
    assert_eq!(handles[0].stats().get(CounterKind::Items), 0);

    manager.put(item("k", "v")).unwrap();
    assert!(manager.remove("k", None).unwrap());
    for handle in &handles {
        assert_eq!(handle.stats().get(CounterKind::Items), 0);
        assert_eq!(handle.stats().get(CounterKind::RemoveCalls), 2);
    }
}

#[test]
fn test_clear_empties_every_handle_and_leaves_region_counter() {
    let handles = [shared_handle("h0"), shared_handle("h1")];
    let manager = chained_manager(&handles, UpdateMode::Up);

    manager.put(item("a", "1")).unwrap();
    manager.put(item("b", "2").with_region("r")).unwrap();
    manager.clear().unwrap();

    for handle in &handles {
        assert_eq!(handle.stats().get(CounterKind::Items), 0);
        assert_eq!(handle.stats().get(CounterKind::ClearCalls), 1);
        assert_eq!(handle.stats().get(CounterKind::ClearRegionCalls), 0);
    }
}

#[test]
fn test_clear_region_spares_other_namespaces() {
    let handles = [shared_handle("h0")];
    let manager = chained_manager(&handles, UpdateMode::Up);

    manager.put(item("k1", "plain")).unwrap();
    manager.put(item("k2", "empty").with_region("")).unwrap();
    manager.put(item("k3", "tagged").with_region("r")).unwrap();
    manager.put(item("k4", "other").with_region("s")).unwrap();

    manager.clear_region("r").unwrap();

    assert!(manager.get("k3", Some("r")).unwrap().is_none());
    assert_eq!(manager.get("k1", None).unwrap().as_deref(), Some("plain"));
    assert_eq!(manager.get("k2", Some("")).unwrap().as_deref(), Some("empty"));
    assert_eq!(manager.get("k4", Some("s")).unwrap().as_deref(), Some("other"));
    assert_eq!(handles[0].stats().get(CounterKind::ClearRegionCalls), 1);
}

#[test]
fn test_get_promotes_hit_into_faster_handles() {
    let handles = [shared_handle("h0"), shared_handle("h1"), shared_handle("h2")];
    let manager = chained_manager(&handles, UpdateMode::Up);

    // only the slowest tier holds the key
    handles[2].put(item("k", "v")).unwrap();

    assert_eq!(manager.get("k", None).unwrap().as_deref(), Some("v"));

    assert!(handles[0].get("k", None).unwrap().is_some());
    assert!(handles[1].get("k", None).unwrap().is_some());
    assert_eq!(handles[2].stats().get(CounterKind::Hits), 1);
    assert_eq!(handles[0].stats().get(CounterKind::Misses), 1);
    assert_eq!(handles[1].stats().get(CounterKind::Misses), 1);
    assert_eq!(handles[2].stats().get(CounterKind::Misses), 0);
}

#[test]
fn test_update_mode_none_skips_promotion() {
    let handles = [shared_handle("h0"), shared_handle("h1")];
    let manager = chained_manager(&handles, UpdateMode::None);

    handles[1].put(item("k", "v")).unwrap();
    assert_eq!(manager.get("k", None).unwrap().as_deref(), Some("v"));
    assert!(handles[0].get("k", None).unwrap().is_none());
}

#[test]
fn test_promotion_keeps_item_expiration_over_target_defaults() {
    let fast = Arc::new(MemoryHandle::new(
        CacheHandleConfig::new("fast")
            .with_expiration(ExpirationMode::Sliding, Duration::from_secs(5)),
    ));
    let slow = shared_handle("slow");
    let manager = CacheManager::builder()
        .update_mode(UpdateMode::Up)
        .handle(Box::new(Arc::clone(&fast)))
        .handle(Box::new(Arc::clone(&slow)))
        .build()
        .unwrap();

    slow.put(item("k", "v")).unwrap();
    manager.get("k", None).unwrap();

    let promoted = fast.get("k", None).unwrap().expect("promoted");
    assert_eq!(promoted.expiration(), ExpirationMode::None);
}

#[test]
fn test_all_miss_records_miss_everywhere() {
    let handles = [shared_handle("h0"), shared_handle("h1")];
    let manager = chained_manager(&handles, UpdateMode::Up);

    assert!(manager.get("absent", None).unwrap().is_none());
    for handle in &handles {
        assert_eq!(handle.stats().get(CounterKind::Misses), 1);
        assert_eq!(handle.stats().get(CounterKind::Hits), 0);
    }
}

#[test]
fn test_update_propagates_and_bumps_version() {
    let handles = [shared_handle("h0"), shared_handle("h1")];
    let manager = chained_manager(&handles, UpdateMode::Up);

    manager.put(item("k", "a")).unwrap();
    let outcome = manager
        .update("k", None, |v| format!("{}b", v))
        .unwrap();
    let updated = outcome.item().expect("update should land");
    assert_eq!(updated.value(), "ab");
    assert_eq!(updated.version(), 2);

    for handle in &handles {
        let stored = handle.get("k", None).unwrap().unwrap();
        assert_eq!(stored.value(), "ab");
        assert_eq!(stored.version(), 2);
    }
}

#[test]
fn test_update_absent_key_is_not_found() {
    let handles = [shared_handle("h0")];
    let manager = chained_manager(&handles, UpdateMode::Up);
    let outcome = manager.update("absent", None, |v| v.clone()).unwrap();
    assert!(matches!(outcome, UpdateOutcome::NotFound));
}

#[test]
fn test_concurrent_updates_apply_exactly_once_each() {
    let threads = 8u64;
    let handle = Arc::new(MemoryHandle::new(CacheHandleConfig::new("h0")));
    let manager = Arc::new(
        CacheManager::builder()
            .max_retries(128)
            .retry_timeout(Duration::ZERO)
            .handle(Box::new(Arc::clone(&handle)))
            .build()
            .unwrap(),
    );
    manager.put(CacheItem::new("counter", 0u64)).unwrap();

    let successes = Arc::new(AtomicUsize::new(0));
    let mut workers = Vec::new();
    for _ in 0..threads {
        let manager = Arc::clone(&manager);
        let successes = Arc::clone(&successes);
        workers.push(thread::spawn(move || {
            let outcome = manager.update("counter", None, |v| v + 1).unwrap();
            if outcome.is_updated() {
                successes.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    let applied = successes.load(Ordering::Relaxed) as u64;
    assert_eq!(applied, threads);
    let stored = handle.get("counter", None).unwrap().unwrap();
    // transform applied exactly once per success, in version order
    assert_eq!(*stored.value(), applied);
    assert_eq!(stored.version(), 1 + applied);
}

#[test]
fn test_empty_key_is_rejected_eagerly() {
    let handles = [shared_handle("h0")];
    let manager = chained_manager(&handles, UpdateMode::Up);

    assert!(matches!(
        manager.get("", None),
        Err(CacheError::InvalidArgument(_))
    ));
    assert!(matches!(
        manager.add(item("", "v")),
        Err(CacheError::InvalidArgument(_))
    ));
    assert!(matches!(
        manager.remove("", None),
        Err(CacheError::InvalidArgument(_))
    ));
    assert_eq!(handles[0].stats().get(CounterKind::AddCalls), 0);
    assert_eq!(handles[0].stats().get(CounterKind::GetCalls), 0);
}

#[test]
fn test_builder_requires_a_handle() {
    let result = CacheManager::<String>::builder().build();
    assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
}

/// Wrapper handle whose writes fail, for exercising mid-fan-out errors.
struct BrokenHandle {
    inner: MemoryHandle<String>,
}

impl BrokenHandle {
    fn new(name: &str) -> Self {
        Self {
            inner: MemoryHandle::new(CacheHandleConfig::new(name)),
        }
    }

    fn refuse<T>(&self) -> Result<T, CacheError> {
        Err(CacheError::backend_unavailable(
            self.inner.name(),
            "store offline",
        ))
    }
}

impl CacheHandle<String> for BrokenHandle {
    fn config(&self) -> &CacheHandleConfig {
        self.inner.config()
    }

    fn get(&self, key: &str, region: Option<&str>) -> Result<Option<CacheItem<String>>, CacheError> {
        self.inner.get(key, region)
    }

    fn add(&self, _item: CacheItem<String>) -> Result<bool, CacheError> {
        self.refuse()
    }

    fn put(&self, _item: CacheItem<String>) -> Result<(), CacheError> {
        self.refuse()
    }

    fn remove(&self, _key: &str, _region: Option<&str>) -> Result<bool, CacheError> {
        self.refuse()
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.refuse()
    }

    fn clear_region(&self, _region: &str) -> Result<(), CacheError> {
        self.refuse()
    }

    fn update_conditional(
        &self,
        _key: &str,
        _region: Option<&str>,
        _expected_version: u64,
        _value: String,
    ) -> Result<ConditionalWrite<String>, CacheError> {
        self.refuse()
    }

    fn stats(&self) -> &StatsCounters {
        self.inner.stats()
    }
}

#[test]
fn test_put_failure_keeps_earlier_handle_mutations() {
    let good = shared_handle("good");
    let manager = CacheManager::builder()
        .handle(Box::new(Arc::clone(&good)))
        .handle(Box::new(BrokenHandle::new("broken")))
        .build()
        .unwrap();

    let result = manager.put(item("k", "v"));
    assert!(matches!(
        result,
        Err(CacheError::BackendUnavailable { ref handle, .. }) if handle == "broken"
    ));
    // no rollback: the first handle keeps the upsert
    assert_eq!(*good.get("k", None).unwrap().unwrap().value(), "v");
    assert_eq!(good.stats().get(CounterKind::Items), 1);
}

#[test]
fn test_add_failure_keeps_first_handle_insert() {
    let good = shared_handle("good");
    let manager = CacheManager::builder()
        .handle(Box::new(Arc::clone(&good)))
        .handle(Box::new(BrokenHandle::new("broken")))
        .build()
        .unwrap();

    let result = manager.add(item("k", "v"));
    assert!(matches!(
        result,
        Err(CacheError::BackendUnavailable { .. })
    ));
    // the winning insert in the first handle survives the fan-out failure
    assert_eq!(*good.get("k", None).unwrap().unwrap().value(), "v");
    // every handle still counted the call
    assert_eq!(good.stats().get(CounterKind::AddCalls), 1);
}

fn backplane_manager(
    backplane: &ChannelBackplane,
    handle: &Arc<MemoryHandle<String>>,
) -> CacheManager<String> {
    CacheManager::builder()
        .handle(Box::new(Arc::clone(handle)))
        .backplane(Arc::new(backplane.clone()))
        .build()
        .unwrap()
}

fn source_handle(name: &str) -> Arc<MemoryHandle<String>> {
    Arc::new(MemoryHandle::new(
        CacheHandleConfig::new(name).with_backplane_source(true),
    ))
}

#[test]
fn test_own_messages_are_suppressed() {
    let backplane = ChannelBackplane::new();
    let handle = source_handle("a0");
    let manager = backplane_manager(&backplane, &handle);

    manager.put(item("k", "v")).unwrap();
    assert!(wait_until(2000, || backplane.delivered_count() >= 1));
    // the echo of our own Changed message must not evict the local copy
    assert_eq!(manager.get("k", None).unwrap().as_deref(), Some("v"));
}

#[test]
fn test_peer_remove_invalidates_other_instance() {
    let backplane = ChannelBackplane::new();
    let handle_a = source_handle("a0");
    let handle_b = source_handle("b0");
    let manager_a = backplane_manager(&backplane, &handle_a);
    let manager_b = backplane_manager(&backplane, &handle_b);

    // count Removed messages crossing the channel
    let removed_seen = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&removed_seen);
    let _watcher = backplane
        .subscribe(Box::new(move |message| {
            if matches!(message.action, BackplaneAction::Removed { .. }) {
                seen.fetch_add(1, Ordering::Relaxed);
            }
        }))
        .unwrap();

    // both instances hold the key locally
    handle_a.put(item("k", "v").with_region("r")).unwrap();
    handle_b.put(item("k", "v").with_region("r")).unwrap();

    assert!(manager_a.remove("k", Some("r")).unwrap());

    assert!(wait_until(2000, || {
        manager_b.get("k", Some("r")).unwrap().is_none()
    }));
    // B applied the effect without republishing the same message
    thread::sleep(Duration::from_millis(50));
    assert_eq!(removed_seen.load(Ordering::Relaxed), 1);
}

#[test]
fn test_peer_clear_region_applies_structurally() {
    let backplane = ChannelBackplane::new();
    let handle_a = source_handle("a0");
    let handle_b = source_handle("b0");
    let manager_a = backplane_manager(&backplane, &handle_a);
    let _manager_b = backplane_manager(&backplane, &handle_b);

    handle_b.put(item("k1", "v").with_region("r")).unwrap();
    handle_b.put(item("k2", "v")).unwrap();

    manager_a.clear_region("r").unwrap();

    assert!(wait_until(2000, || {
        handle_b.get("k1", Some("r")).unwrap().is_none()
    }));
    // untagged items survive a region clear
    assert!(handle_b.get("k2", None).unwrap().is_some());
}

#[test]
fn test_dropped_manager_stops_applying_peer_messages() {
    let backplane = ChannelBackplane::new();
    let handle_a = source_handle("a0");
    let handle_b = source_handle("b0");
    let manager_a = backplane_manager(&backplane, &handle_a);
    let manager_b = backplane_manager(&backplane, &handle_b);

    handle_a.put(item("k", "v")).unwrap();
    handle_b.put(item("k", "v")).unwrap();

    // disposal detaches the subscription before the handles go away
    drop(manager_b);

    // a plain subscriber tells us when the Removed message has been dispatched
    let dispatched = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&dispatched);
    let _watcher = backplane
        .subscribe(Box::new(move |message| {
            if matches!(message.action, BackplaneAction::Removed { .. }) {
                seen.fetch_add(1, Ordering::Relaxed);
            }
        }))
        .unwrap();

    assert!(manager_a.remove("k", None).unwrap());
    assert!(wait_until(2000, || dispatched.load(Ordering::Relaxed) == 1));

    // the dropped instance no longer applies peer invalidations
    thread::sleep(Duration::from_millis(50));
    assert!(handle_b.get("k", None).unwrap().is_some());
    assert!(handle_a.get("k", None).unwrap().is_none());
}

#[test]
fn test_publish_requires_backplane_source_handle() {
    let backplane = ChannelBackplane::new();
    // not marked as a backplane source
    let handle = shared_handle("quiet");
    let manager = CacheManager::builder()
        .handle(Box::new(Arc::clone(&handle)))
        .backplane(Arc::new(backplane.clone()))
        .build()
        .unwrap();

    manager.put(item("k", "v")).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(backplane.published_count(), 0);
}
