//! Versioned record envelope.
//!
//! Every stored record is wrapped in an [`Envelope`] carrying the fingerprint,
//! write time, producing app version, schema revision and (raw kind only) the
//! source modification time. Envelopes serialize to JSON.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use stagecache_core::{
    fingerprint_content, fingerprint_payload, now_millis, EpochMillis, Fingerprint, StorageError,
    VersionStamp,
};

/// What the envelope fingerprint is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintSource<'a> {
    /// The raw source content the payload was parsed from.
    Content(&'a str),
    /// The payload's own serialization.
    Payload,
}

impl<'a> From<Option<&'a str>> for FingerprintSource<'a> {
    fn from(content: Option<&'a str>) -> Self {
        content.map_or(FingerprintSource::Payload, FingerprintSource::Content)
    }
}

/// A payload wrapped with its validity metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub fingerprint: Fingerprint,
    pub written_at: EpochMillis,
    pub app_version: String,
    pub schema_revision: u32,
    pub payload: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_modified_at: Option<EpochMillis>,
}

impl<T: Serialize> Envelope<T> {
    /// Wrap `payload` under `stamp`, fingerprinting `source`.
    ///
    /// Fails only when the payload cannot be serialized.
    pub fn wrap(
        payload: T,
        stamp: &VersionStamp,
        source: FingerprintSource<'_>,
        source_modified_at: Option<EpochMillis>,
    ) -> Result<Self, StorageError> {
        let fingerprint = match source {
            FingerprintSource::Content(content) => fingerprint_content(content),
            FingerprintSource::Payload => fingerprint_payload(&payload)?,
        };
        Ok(Self {
            fingerprint,
            written_at: now_millis(),
            app_version: stamp.app_version.clone(),
            schema_revision: stamp.schema_revision,
            payload,
            source_modified_at,
        })
    }

    /// Serialize for the byte store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(self).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Deserialize a blob read from the byte store.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })
    }
}

impl<T> Envelope<T> {
    /// The stamp this envelope was written under.
    pub fn stamp(&self) -> VersionStamp {
        VersionStamp::new(self.app_version.clone(), self.schema_revision)
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Map the payload, keeping the metadata.
    pub fn map<U, F>(self, f: F) -> Envelope<U>
    where
        F: FnOnce(T) -> U,
    {
        Envelope {
            fingerprint: self.fingerprint,
            written_at: self.written_at,
            app_version: self.app_version,
            schema_revision: self.schema_revision,
            payload: f(self.payload),
            source_modified_at: self.source_modified_at,
        }
    }
}
