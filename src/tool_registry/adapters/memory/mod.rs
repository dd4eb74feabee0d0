//! In-memory registry snapshot store.

use crate::tool_registry::{
    domain::RegistryRecord,
    ports::{PersistenceError, RegistrySnapshotStore, RegistryStoreResult},
};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory snapshot store.
///
/// Keeps every committed snapshot so tests can count flushes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistryStore {
    state: Arc<RwLock<InMemoryStoreState>>,
}

#[derive(Debug, Default)]
struct InMemoryStoreState {
    commits: Vec<Vec<RegistryRecord>>,
    fail_commits: bool,
}

fn store_error(err: impl ToString) -> PersistenceError {
    PersistenceError::io(std::io::Error::other(err.to_string()))
}

impl InMemoryRegistryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose current snapshot is `records`.
    #[must_use]
    pub fn with_snapshot(records: Vec<RegistryRecord>) -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.write() {
            state.commits.push(records);
        }
        store
    }

    /// Makes subsequent commits fail until cleared.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Io`] when lock acquisition fails.
    pub fn set_fail_commits(&self, fail: bool) -> RegistryStoreResult<()> {
        let mut state = self.state.write().map_err(store_error)?;
        state.fail_commits = fail;
        Ok(())
    }

    /// Returns the number of snapshots committed, including any seed.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.state
            .read()
            .map(|state| state.commits.len())
            .unwrap_or_default()
    }

    /// Returns the latest committed snapshot.
    #[must_use]
    pub fn latest(&self) -> Vec<RegistryRecord> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.commits.last().cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RegistrySnapshotStore for InMemoryRegistryStore {
    async fn load(&self) -> RegistryStoreResult<Vec<RegistryRecord>> {
        Ok(self.latest())
    }

    async fn commit(&self, records: Vec<RegistryRecord>) -> RegistryStoreResult<()> {
        let mut state = self.state.write().map_err(store_error)?;
        if state.fail_commits {
            return Err(store_error("injected commit failure"));
        }
        state.commits.push(records);
        Ok(())
    }
}
