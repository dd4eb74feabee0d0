//! Signed manifest document and verified payload.

use super::{ConnectorDescriptor, LoadError, ManifestDomainError, SignatureError};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Name of the JSON member carrying the manifest signature.
pub const SIGNATURE_FIELD: &str = "signature";

/// Verified manifest listing every known connector.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPayload {
    generated_at: DateTime<Utc>,
    ttl_seconds: u64,
    connectors: Vec<ConnectorDescriptor>,
    signature: Vec<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestBody {
    generated_at: DateTime<Utc>,
    ttl_seconds: u64,
    #[serde(default)]
    connectors: Vec<ConnectorDescriptor>,
}

impl ManifestPayload {
    /// Creates a payload from already-verified parts.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestDomainError::DuplicateConnectorId`] when two
    /// connectors share an identifier.
    pub fn new(
        generated_at: DateTime<Utc>,
        ttl_seconds: u64,
        connectors: Vec<ConnectorDescriptor>,
        signature: Vec<u8>,
    ) -> Result<Self, ManifestDomainError> {
        let mut seen = HashSet::with_capacity(connectors.len());
        for connector in &connectors {
            if !seen.insert(connector.id()) {
                return Err(ManifestDomainError::DuplicateConnectorId(
                    connector.id().as_str().to_owned(),
                ));
            }
        }

        Ok(Self {
            generated_at,
            ttl_seconds,
            connectors,
            signature,
        })
    }

    /// Returns when the manifest was generated.
    #[must_use]
    pub const fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Returns the declared time-to-live in seconds.
    #[must_use]
    pub const fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Returns every connector, enabled or not.
    #[must_use]
    pub fn connectors(&self) -> &[ConnectorDescriptor] {
        &self.connectors
    }

    /// Returns only the connectors marked as enabled.
    pub fn enabled_connectors(&self) -> impl Iterator<Item = &ConnectorDescriptor> {
        self.connectors.iter().filter(|connector| connector.enabled())
    }

    /// Returns the raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Computes `generatedAt + ttlSeconds * 1000` in epoch milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestDomainError::ExpiryOverflow`] when the sum does not
    /// fit in an `i64`.
    pub fn expires_at_ms(&self) -> Result<i64, ManifestDomainError> {
        let overflow = || ManifestDomainError::ExpiryOverflow {
            ttl_seconds: self.ttl_seconds,
        };
        let ttl_ms = i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(|seconds| seconds.checked_mul(1000))
            .ok_or_else(overflow)?;
        self.generated_at
            .timestamp_millis()
            .checked_add(ttl_ms)
            .ok_or_else(overflow)
    }
}

/// A fetched manifest whose signature has not been checked yet.
///
/// Splits the document into the canonical signed body and the decoded
/// signature so a verifier can check one against the other.
#[derive(Debug, Clone)]
pub struct SignedManifestDocument {
    body: Value,
    signature: Vec<u8>,
}

impl SignedManifestDocument {
    /// Parses a raw manifest response body.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Parse`] when the body is not a JSON object and
    /// [`LoadError::Signature`] when the signature member is missing or not
    /// base64.
    pub fn parse(bytes: &[u8]) -> Result<Self, LoadError> {
        let document: Value = serde_json::from_slice(bytes)?;
        let Value::Object(mut members) = document else {
            return Err(LoadError::Parse("manifest must be a JSON object".to_owned()));
        };

        let encoded = match members.remove(SIGNATURE_FIELD) {
            Some(Value::String(encoded)) => encoded,
            Some(_) => {
                return Err(SignatureError::MalformedEncoding(
                    "signature must be a string".to_owned(),
                )
                .into());
            }
            None => return Err(SignatureError::Missing.into()),
        };
        let signature = STANDARD
            .decode(encoded.trim())
            .map_err(|err| SignatureError::MalformedEncoding(err.to_string()))?;

        Ok(Self {
            body: Value::Object(members),
            signature,
        })
    }

    /// Parses a raw manifest body without requiring a signature.
    ///
    /// A well-formed signature is kept; a missing or malformed one becomes
    /// empty. Only for use when verification is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Parse`] when the body is not a JSON object.
    pub fn parse_unsigned(bytes: &[u8]) -> Result<Self, LoadError> {
        let document: Value = serde_json::from_slice(bytes)?;
        let Value::Object(mut members) = document else {
            return Err(LoadError::Parse("manifest must be a JSON object".to_owned()));
        };
        let signature = match members.remove(SIGNATURE_FIELD) {
            Some(Value::String(encoded)) => STANDARD.decode(encoded.trim()).unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(Self {
            body: Value::Object(members),
            signature,
        })
    }

    /// Returns the canonical bytes covered by the signature.
    ///
    /// The body is re-serialised compactly; object keys come out sorted, so
    /// member order on the wire does not affect verification.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Parse`] if the body cannot be serialised.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, LoadError> {
        Ok(serde_json::to_vec(&sorted_keys(&self.body))?)
    }

    /// Returns the decoded signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Decodes the body into a payload. Call only after verification.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Parse`] when required members are missing or
    /// connector entries are invalid.
    pub fn into_payload(self) -> Result<ManifestPayload, LoadError> {
        let body: ManifestBody = serde_json::from_value(self.body)?;
        Ok(ManifestPayload::new(
            body.generated_at,
            body.ttl_seconds,
            body.connectors,
            self.signature,
        )?)
    }
}

/// Canonical bytes for an unsigned manifest body, as produced by signers.
///
/// # Errors
///
/// Returns [`LoadError::Parse`] if the body cannot be serialised.
pub fn canonical_body_bytes(body: &Value) -> Result<Vec<u8>, LoadError> {
    let mut unsigned = body.clone();
    if let Value::Object(members) = &mut unsigned {
        members.remove(SIGNATURE_FIELD);
    }
    Ok(serde_json::to_vec(&sorted_keys(&unsigned))?)
}

fn sorted_keys(value: &Value) -> Value {
    match value {
        Value::Object(members) => {
            let mut entries: Vec<(&String, &Value)> = members.iter().collect();
            entries.sort_by(|left, right| left.0.cmp(right.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, member) in entries {
                sorted.insert(key.clone(), sorted_keys(member));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_keys).collect()),
        other => other.clone(),
    }
}

/// A verified payload paired with its computed expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedManifest {
    /// Verified manifest payload.
    pub payload: ManifestPayload,
    /// Expiry in epoch milliseconds.
    pub expires_at_ms: i64,
}

impl LoadedManifest {
    /// Pairs a payload with its expiry derived from `generatedAt + ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestDomainError::ExpiryOverflow`] for absurd TTLs.
    pub fn from_payload(payload: ManifestPayload) -> Result<Self, ManifestDomainError> {
        let expires_at_ms = payload.expires_at_ms()?;
        Ok(Self {
            payload,
            expires_at_ms,
        })
    }
}
