//! Durable snapshot store port for registry records.

use crate::tool_registry::domain::RegistryRecord;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for snapshot store operations.
pub type RegistryStoreResult<T> = Result<T, PersistenceError>;

/// Whole-snapshot persistence contract.
///
/// A commit replaces the stored snapshot in one step: readers observe the
/// previous complete snapshot or the new one, never a mixture.
#[async_trait]
pub trait RegistrySnapshotStore: Send + Sync {
    /// Loads the current snapshot. A missing snapshot is an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Corrupt`] when the stored snapshot cannot
    /// be decoded.
    async fn load(&self) -> RegistryStoreResult<Vec<RegistryRecord>>;

    /// Atomically replaces the snapshot with `records`.
    async fn commit(&self, records: Vec<RegistryRecord>) -> RegistryStoreResult<()>;
}

/// Errors returned by registry persistence.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    /// Filesystem failure.
    #[error("registry I/O error: {0}")]
    Io(Arc<dyn std::error::Error + Send + Sync>),

    /// Records could not be serialised.
    #[error("registry serialisation error: {0}")]
    Serialize(Arc<dyn std::error::Error + Send + Sync>),

    /// The stored snapshot is not a valid record list.
    #[error("registry snapshot is corrupt: {0}")]
    Corrupt(String),

    /// The persistence actor has shut down.
    #[error("registry persistence is closed")]
    Closed,

    /// A blocking or background task failed to complete.
    #[error("registry persistence task failed: {0}")]
    Task(String),
}

impl PersistenceError {
    /// Wraps a filesystem failure.
    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io(Arc::new(err))
    }

    /// Wraps a serialisation failure.
    pub fn serialize(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Serialize(Arc::new(err))
    }
}
