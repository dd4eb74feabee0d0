//! Single-slot, stale-on-error manifest cache.

use crate::manifest::domain::{LoadedManifest, ManifestPayload};
use mockable::Clock;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The one cached manifest and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestCacheEntry {
    /// Last successfully verified payload.
    pub value: Arc<ManifestPayload>,
    /// Expiry in epoch milliseconds.
    pub expires_at_ms: i64,
}

/// Holds the last verified manifest.
///
/// Expiry never evicts: [`ManifestCache::get`] keeps serving the last good
/// value after its TTL, and staleness only decides whether the next pass
/// attempts a refresh. A failed refresh leaves the slot untouched.
#[derive(Debug)]
pub struct ManifestCache<C>
where
    C: Clock + Send + Sync,
{
    slot: Mutex<Option<ManifestCacheEntry>>,
    clock: Arc<C>,
}

impl<C> ManifestCache<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty cache.
    #[must_use]
    pub const fn new(clock: Arc<C>) -> Self {
        Self {
            slot: Mutex::new(None),
            clock,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ManifestCacheEntry>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached payload, fresh or stale.
    #[must_use]
    pub fn get(&self) -> Option<Arc<ManifestPayload>> {
        self.slot().as_ref().map(|entry| Arc::clone(&entry.value))
    }

    /// Returns the full cache entry, if any.
    #[must_use]
    pub fn entry(&self) -> Option<ManifestCacheEntry> {
        self.slot().clone()
    }

    /// Replaces the slot in one step.
    pub fn set(&self, payload: ManifestPayload, expires_at_ms: i64) {
        *self.slot() = Some(ManifestCacheEntry {
            value: Arc::new(payload),
            expires_at_ms,
        });
    }

    /// Stores a freshly loaded manifest.
    pub fn store(&self, loaded: LoadedManifest) {
        self.set(loaded.payload, loaded.expires_at_ms);
    }

    /// Returns whether a refresh should be attempted.
    ///
    /// An empty cache is always stale.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        let now_ms = self.clock.utc().timestamp_millis();
        self.slot()
            .as_ref()
            .is_none_or(|entry| now_ms >= entry.expires_at_ms)
    }
}
