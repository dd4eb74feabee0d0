//! Source port for fetching the connector manifest.

use crate::manifest::domain::{LoadError, LoadedManifest};
use async_trait::async_trait;

/// Result type for manifest loads.
pub type ManifestLoadResult<T> = Result<T, LoadError>;

/// Fetches and verifies the connector manifest.
///
/// Implementations perform the network call and signature check only; they
/// never write to the cache.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Loads the current manifest and computes its expiry.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] on transport, status, parse, or signature
    /// failures.
    async fn load(&self) -> ManifestLoadResult<LoadedManifest>;
}
