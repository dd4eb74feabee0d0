//! Deterministic fixtures shared by unit and integration tests.
//!
//! Available to integration tests through the `test-support` feature.

use chrono::{DateTime, Local, Utc};
use mockable::Clock;
use std::sync::atomic::{AtomicI64, Ordering};

#[cfg(test)]
use crate::manifest::domain::{ConnectorDescriptor, ConnectorId, LoadedManifest, ManifestPayload};

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `now_ms` epoch milliseconds.
    #[must_use]
    pub const fn at_millis(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    /// Moves the clock to `now_ms`.
    pub fn set_millis(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Moves the clock forward by `delta_ms`.
    pub fn advance_millis(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Returns the current time in epoch milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms()).unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) fn descriptor(id: &str, enabled: bool) -> ConnectorDescriptor {
    let connector_id = ConnectorId::new(id).expect("valid connector id");
    ConnectorDescriptor::new(connector_id, format!("https://{id}.example/mcp"))
        .with_enabled(enabled)
}

#[cfg(test)]
pub(crate) fn loaded_manifest(
    generated_at_ms: i64,
    ttl_seconds: u64,
    connectors: &[(&str, bool)],
) -> LoadedManifest {
    let generated_at = DateTime::from_timestamp_millis(generated_at_ms).unwrap_or_default();
    let descriptors = connectors
        .iter()
        .map(|(id, enabled)| descriptor(id, *enabled))
        .collect();
    let payload = ManifestPayload::new(generated_at, ttl_seconds, descriptors, Vec::new())
        .expect("connector ids should be unique");
    LoadedManifest::from_payload(payload).expect("expiry should fit")
}
