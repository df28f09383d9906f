//! Optimistic-concurrency update engine
//!
//! Updates never block on a lock. Each attempt reads the current item and
//! version from the first handle, applies the caller's transform, and issues
//! a version-checked write. A detected conflict retries the whole
//! read-transform-write cycle, bounded by the retry budget and optionally
//! spaced by the configured retry timeout.

use std::thread;
use std::time::Duration;

use crate::cache::error::CacheError;
use crate::cache::handle::{CacheHandle, ConditionalWrite};
use crate::cache::item::CacheItem;

/// Result of an optimistic update.
///
/// Retry exhaustion is an expected outcome under contention, so it is a
/// variant here rather than an error; the caller decides how to react.
#[derive(Debug, Clone)]
pub enum UpdateOutcome<V> {
    /// The transform was applied; carries the stored item with its new
    /// version.
    Updated(CacheItem<V>),
    /// No live item exists for the key in the first handle.
    NotFound,
    /// Every attempt hit a version conflict.
    RetriesExhausted { attempts: u32 },
}

impl<V> UpdateOutcome<V> {
    /// Whether the update landed.
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated(_))
    }

    /// The stored item when the update landed.
    pub fn item(&self) -> Option<&CacheItem<V>> {
        match self {
            UpdateOutcome::Updated(item) => Some(item),
            _ => None,
        }
    }
}

/// Run the bounded read-transform-write loop against the first handle.
///
/// `max_retries` is the retry budget on top of the first attempt, so the
/// total number of read attempts is `max_retries + 1`. Propagation to the
/// remaining handles and backplane publishing are the manager's job once the
/// write lands.
pub(crate) fn run_update<V, F>(
    primary: &dyn CacheHandle<V>,
    key: &str,
    region: Option<&str>,
    transform: F,
    max_retries: u32,
    retry_timeout: Duration,
) -> Result<UpdateOutcome<V>, CacheError>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(&V) -> V,
{
    let mut attempts = 0u32;
    while attempts <= max_retries {
        attempts += 1;

        let Some(current) = primary.get(key, region)? else {
            return Ok(UpdateOutcome::NotFound);
        };
        let new_value = transform(current.value());

        match primary.update_conditional(key, region, current.version(), new_value)? {
            ConditionalWrite::Written(item) => return Ok(UpdateOutcome::Updated(item)),
            ConditionalWrite::Missing => return Ok(UpdateOutcome::NotFound),
            ConditionalWrite::VersionMismatch => {
                log::debug!(
                    "update conflict on '{}' in handle '{}', attempt {}/{}",
                    key,
                    primary.name(),
                    attempts,
                    max_retries + 1
                );
                if attempts <= max_retries && !retry_timeout.is_zero() {
                    thread::sleep(retry_timeout);
                }
            }
        }
    }

    log::debug!(
        "update retries exhausted for '{}' after {} attempts",
        key,
        attempts
    );
    Ok(UpdateOutcome::RetriesExhausted { attempts })
}
