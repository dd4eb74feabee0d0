//! Verification port for manifest signatures.

use super::ManifestLoadResult;
use crate::manifest::domain::{LoadedManifest, SignatureError, SignedManifestDocument};

/// Checks a signature against the canonical manifest body.
pub trait ManifestVerifier: Send + Sync {
    /// Verifies `signature` over `canonical`.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError`] when the signature does not match.
    fn verify(&self, canonical: &[u8], signature: &[u8]) -> Result<(), SignatureError>;

    /// Parses, verifies, and decodes a raw manifest body.
    ///
    /// A payload is only decoded once its signature has been accepted.
    ///
    /// # Errors
    ///
    /// Returns parse errors for malformed documents and signature errors when
    /// verification fails.
    fn open(&self, bytes: &[u8]) -> ManifestLoadResult<LoadedManifest> {
        let document = SignedManifestDocument::parse(bytes)?;
        let canonical = document.canonical_bytes()?;
        self.verify(&canonical, document.signature())?;
        let payload = document.into_payload()?;
        Ok(LoadedManifest::from_payload(payload)?)
    }
}
