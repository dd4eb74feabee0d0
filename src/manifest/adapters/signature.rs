//! Signature verifiers for manifest payloads.

use crate::manifest::{
    domain::{
        LoadError, LoadedManifest, SignatureError, SignedManifestDocument, canonical_body_bytes,
    },
    ports::{ManifestLoadResult, ManifestVerifier},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Verifies manifests signed with a shared HMAC-SHA256 key.
#[derive(Clone)]
pub struct HmacManifestVerifier {
    key: Vec<u8>,
}

impl HmacManifestVerifier {
    /// Creates a verifier from the shared secret.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::InvalidKey`] when the key is empty.
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self, SignatureError> {
        let secret = key.into();
        if secret.is_empty() {
            return Err(SignatureError::InvalidKey(
                "signature key must not be empty".to_owned(),
            ));
        }
        Ok(Self { key: secret })
    }

    fn mac(&self) -> Result<HmacSha256, SignatureError> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|err| SignatureError::InvalidKey(err.to_string()))
    }

    /// Produces the base64 signature for a manifest body.
    ///
    /// Any existing `signature` member is ignored. Used by publishing tools
    /// and tests; the sync engine itself only verifies.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the body cannot be serialised or the key is
    /// unusable.
    pub fn sign(&self, body: &Value) -> Result<String, LoadError> {
        let canonical = canonical_body_bytes(body)?;
        let mut mac = self.mac()?;
        mac.update(&canonical);
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

impl fmt::Debug for HmacManifestVerifier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HmacManifestVerifier")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl ManifestVerifier for HmacManifestVerifier {
    fn verify(&self, canonical: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
        let mut mac = self.mac()?;
        mac.update(canonical);
        mac.verify_slice(signature)
            .map_err(|_| SignatureError::Mismatch)
    }
}

/// Accepts every manifest without checking its signature.
///
/// Only installed when signature verification is explicitly disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnverifiedManifests;

impl ManifestVerifier for UnverifiedManifests {
    fn verify(&self, _canonical: &[u8], _signature: &[u8]) -> Result<(), SignatureError> {
        Ok(())
    }

    fn open(&self, bytes: &[u8]) -> ManifestLoadResult<LoadedManifest> {
        let payload = SignedManifestDocument::parse_unsigned(bytes)?.into_payload()?;
        Ok(LoadedManifest::from_payload(payload)?)
    }
}
