//! In-memory manifest source for tests and offline runs.

use crate::manifest::{
    domain::{LoadError, LoadedManifest},
    ports::{ManifestLoadResult, ManifestSource},
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Manifest source that replays scripted outcomes.
///
/// Queued outcomes are returned in order; once the queue is drained the
/// fallback outcome is returned on every load.
#[derive(Debug, Clone, Default)]
pub struct ScriptedManifestSource {
    state: Arc<Mutex<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    queued: VecDeque<ManifestLoadResult<LoadedManifest>>,
    fallback: Option<ManifestLoadResult<LoadedManifest>>,
    loads: usize,
}

impl ScriptedManifestSource {
    /// Creates a source with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source that always returns `manifest`.
    #[must_use]
    pub fn serving(manifest: LoadedManifest) -> Self {
        let source = Self::new();
        source.set_fallback(Ok(manifest));
        source
    }

    /// Queues a one-shot outcome.
    pub fn enqueue(&self, outcome: ManifestLoadResult<LoadedManifest>) {
        self.lock().queued.push_back(outcome);
    }

    /// Replaces the outcome returned once the queue is empty.
    pub fn set_fallback(&self, outcome: ManifestLoadResult<LoadedManifest>) {
        self.lock().fallback = Some(outcome);
    }

    /// Returns how many loads have been attempted.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.lock().loads
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ManifestSource for ScriptedManifestSource {
    async fn load(&self) -> ManifestLoadResult<LoadedManifest> {
        let mut state = self.lock();
        state.loads += 1;
        if let Some(outcome) = state.queued.pop_front() {
            return outcome;
        }
        state.fallback.clone().unwrap_or_else(|| {
            Err(LoadError::transport(std::io::Error::other(
                "no manifest scripted",
            )))
        })
    }
}
