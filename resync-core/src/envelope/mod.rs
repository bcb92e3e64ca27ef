//! The versioned snapshot ("envelope") exchanged with the remote sync file.
//!
//! ## File format
//!
//! Unencrypted:
//! ```json
//! { "version": 1, "deviceId": "<uuid>", "checksum": "<hex>", "resumes": [ ... ] }
//! ```
//!
//! Encrypted (`resumes` is always empty, the array lives in `payload`):
//! ```json
//! { "version": 1, "deviceId": "<uuid>", "checksum": "<hex>", "encrypted": true,
//!   "payload": { "alg": "AES-GCM", "kdf": "PBKDF2", "salt": "..", "iv": "..", "ciphertext": ".." },
//!   "resumes": [] }
//! ```
//!
//! The checksum always covers the plaintext document array, so it can be
//! compared without decrypting and verified after decrypting.

mod codec;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::crypto::{CryptoError, EncryptedPayload};
use crate::models::Document;

pub use codec::{decode, encode, open, seal};

/// Schema version written by this build.
pub const ENVELOPE_VERSION: u32 = 1;

/// Errors from building, parsing or opening an envelope.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Sync file is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Sync file is not a valid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Sync file does not contain a valid document array: {0}")]
    InvalidDocuments(String),

    #[error("Checksum mismatch: expected {expected}, computed {actual}")]
    Integrity { expected: String, actual: String },

    #[error("Sync file is encrypted and no passphrase was provided")]
    PassphraseRequired,

    #[error("Failed to serialize documents: {0}")]
    Serialize(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// A versioned, checksummed snapshot of the whole document set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: u32,
    pub device_id: String,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<EncryptedPayload>,
    pub resumes: Vec<Document>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Envelope {
    /// True when both envelopes describe the same document content.
    pub fn same_content(&self, other: &Envelope) -> bool {
        self.checksum.eq_ignore_ascii_case(&other.checksum)
    }
}

/// Build an unencrypted envelope for `documents`.
pub fn build_envelope(documents: &[Document], device_id: &str) -> Result<Envelope, CodecError> {
    Ok(Envelope {
        version: ENVELOPE_VERSION,
        device_id: device_id.to_string(),
        checksum: checksum(documents)?,
        encrypted: false,
        payload: None,
        resumes: documents.to_vec(),
    })
}

/// Lowercase hex SHA-256 over the canonical serialization of `documents`.
///
/// Documents are hashed in id order, so reordering the array is not a
/// change. Opaque fields serialize with sorted keys.
pub fn checksum(documents: &[Document]) -> Result<String, CodecError> {
    let mut entries = documents
        .iter()
        .map(|doc| {
            serde_json::to_string(doc)
                .map(|json| (doc.id.as_str(), json))
                .map_err(|e| CodecError::Serialize(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    let mut hasher = Sha256::new();
    hasher.update(b"[");
    for (i, (_, json)) in entries.iter().enumerate() {
        if i > 0 {
            hasher.update(b",");
        }
        hasher.update(json.as_bytes());
    }
    hasher.update(b"]");

    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}
