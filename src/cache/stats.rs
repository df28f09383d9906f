//! Per-handle statistics with cache-line aligned atomic counters
//!
//! Each cache handle owns one [`StatsCounters`] instance. Counters are
//! independent atomics: reading two counters is not a consistent snapshot of
//! a single point in time, and `Items` read during concurrent mutation yields
//! the value at some unspecified interleaving point.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Counter kinds tracked per handle.
///
/// All kinds are monotonically incremented except `Items`, which tracks the
/// current live-item count and moves in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CounterKind {
    AddCalls,
    GetCalls,
    PutCalls,
    RemoveCalls,
    ClearCalls,
    ClearRegionCalls,
    Hits,
    Misses,
    Items,
}

impl CounterKind {
    /// All counter kinds, in discriminant order.
    pub const ALL: [CounterKind; 9] = [
        CounterKind::AddCalls,
        CounterKind::GetCalls,
        CounterKind::PutCalls,
        CounterKind::RemoveCalls,
        CounterKind::ClearCalls,
        CounterKind::ClearRegionCalls,
        CounterKind::Hits,
        CounterKind::Misses,
        CounterKind::Items,
    ];

    #[inline(always)]
    fn index(self) -> usize {
        match self {
            CounterKind::AddCalls => 0,
            CounterKind::GetCalls => 1,
            CounterKind::PutCalls => 2,
            CounterKind::RemoveCalls => 3,
            CounterKind::ClearCalls => 4,
            CounterKind::ClearRegionCalls => 5,
            CounterKind::Hits => 6,
            CounterKind::Misses => 7,
            CounterKind::Items => 8,
        }
    }
}

/// Thread-safe per-handle counter set.
///
/// When statistics are disabled through handle configuration all mutations
/// are no-ops and every counter reads as zero.
#[derive(Debug)]
pub struct StatsCounters {
    counters: [CachePadded<AtomicU64>; 9],
    enabled: bool,
}

impl StatsCounters {
    /// Create a new counter set.
    pub fn new(enabled: bool) -> Self {
        Self {
            counters: Default::default(),
            enabled,
        }
    }

    /// Whether this counter set records anything.
    #[inline(always)]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Increment a counter atomically.
    #[inline(always)]
    pub fn increment(&self, kind: CounterKind) {
        if self.enabled {
            self.counters[kind.index()].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Increment a counter by `delta` atomically.
    #[inline(always)]
    pub fn increment_by(&self, kind: CounterKind, delta: u64) {
        if self.enabled && delta > 0 {
            self.counters[kind.index()].fetch_add(delta, Ordering::Relaxed);
        }
    }

    /// Decrement a counter atomically, saturating at zero.
    ///
    /// Only meaningful for `Items`; the call counters are monotonic.
    #[inline(always)]
    pub fn decrement(&self, kind: CounterKind) {
        self.decrement_by(kind, 1);
    }

    /// Decrement a counter by `delta` atomically, saturating at zero.
    #[inline(always)]
    pub fn decrement_by(&self, kind: CounterKind, delta: u64) {
        if self.enabled && delta > 0 {
            let _ = self.counters[kind.index()]
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                    Some(v.saturating_sub(delta))
                });
        }
    }

    /// Read the current value of a counter.
    #[inline(always)]
    pub fn get(&self, kind: CounterKind) -> u64 {
        self.counters[kind.index()].load(Ordering::Relaxed)
    }

    /// Reset every counter to zero.
    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for StatsCounters {
    fn default() -> Self {
        Self::new(true)
    }
}
