//! HTTP manifest source backed by the shared connection pool.

use crate::manifest::{
    domain::{LoadError, LoadedManifest},
    ports::{ManifestLoadResult, ManifestSource, ManifestVerifier},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Fetches the manifest with one `GET` per load.
///
/// The client is a clone of the process-wide pool; this adapter never builds
/// its own.
#[derive(Clone)]
pub struct HttpManifestSource {
    client: reqwest::Client,
    url: String,
    verifier: Arc<dyn ManifestVerifier>,
    timeout: Duration,
}

impl HttpManifestSource {
    /// Creates a source for `url` using the shared `client`.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        verifier: Arc<dyn ManifestVerifier>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            verifier,
            timeout,
        }
    }

    /// Returns the manifest URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_body(&self) -> ManifestLoadResult<Vec<u8>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(LoadError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(LoadError::transport)?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn load(&self) -> ManifestLoadResult<LoadedManifest> {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let body = tokio::time::timeout(self.timeout, self.fetch_body())
            .await
            .map_err(|_| LoadError::Timeout { timeout_ms })??;
        debug!(url = %self.url, bytes = body.len(), "fetched connector manifest");
        self.verifier.open(&body)
    }
}
