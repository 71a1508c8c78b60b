//! Change-detector fingerprints.
//!
//! A fingerprint is the first 64 bits of a Blake3 digest, hex encoded. It only
//! detects change; it is not an integrity or security guarantee.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StorageError;

/// Number of digest bytes kept in a fingerprint.
const FINGERPRINT_BYTES: usize = 8;

/// Short hex digest of a content string or a serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    fn from_bytes(bytes: &[u8]) -> Self {
        let digest = blake3::hash(bytes);
        Fingerprint(hex::encode(&digest.as_bytes()[..FINGERPRINT_BYTES]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint raw source content.
pub fn fingerprint_content(content: &str) -> Fingerprint {
    Fingerprint::from_bytes(content.as_bytes())
}

/// Fingerprint a payload through its canonical JSON serialization.
///
/// Field order follows the type's declaration order, so the digest is
/// order-sensitive for sequences and stable for a given type.
pub fn fingerprint_payload<T: Serialize + ?Sized>(payload: &T) -> Result<Fingerprint, StorageError> {
    let canonical = serde_json::to_vec(payload).map_err(|e| StorageError::Serialization {
        reason: e.to_string(),
    })?;
    Ok(Fingerprint::from_bytes(&canonical))
}
