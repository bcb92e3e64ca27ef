//! Serialization of envelopes to and from the sync file text.

use serde::Deserialize;
use serde_json::Value;

use super::{build_envelope, checksum, CodecError, Envelope, ENVELOPE_VERSION};
use crate::crypto::{self, EncryptedPayload};
use crate::models::Document;

/// Envelope metadata, parsed separately so a bad document array is reported
/// as such.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    version: u32,
    device_id: String,
    checksum: String,
    #[serde(default)]
    encrypted: bool,
    #[serde(default)]
    payload: Option<EncryptedPayload>,
}

/// Build an envelope for `documents`, encrypting the array when a passphrase
/// is given.
pub fn seal(
    documents: &[Document],
    device_id: &str,
    passphrase: Option<&str>,
) -> Result<Envelope, CodecError> {
    let mut envelope = build_envelope(documents, device_id)?;

    if let Some(passphrase) = passphrase {
        let plaintext =
            serde_json::to_vec(documents).map_err(|e| CodecError::Serialize(e.to_string()))?;
        envelope.payload = Some(crypto::encrypt_payload(&plaintext, passphrase)?);
        envelope.encrypted = true;
        envelope.resumes = Vec::new();
    }

    Ok(envelope)
}

/// Serialize an envelope to the sync file text.
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Parse the sync file text.
///
/// Returns `Ok(None)` only for an empty file. Anything else that is not a
/// well-formed envelope is an error.
pub fn decode(raw: &str) -> Result<Option<Envelope>, CodecError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }

    let mut value: Value =
        serde_json::from_str(raw).map_err(|e| CodecError::MalformedJson(e.to_string()))?;

    let object = value
        .as_object_mut()
        .ok_or_else(|| CodecError::InvalidEnvelope("top level is not an object".to_string()))?;

    let resumes = match object.remove("resumes") {
        Some(resumes @ Value::Array(_)) => resumes,
        Some(_) => {
            return Err(CodecError::InvalidDocuments(
                "resumes is not an array".to_string(),
            ))
        }
        None => {
            return Err(CodecError::InvalidEnvelope(
                "missing resumes field".to_string(),
            ))
        }
    };

    let header: Header =
        serde_json::from_value(value).map_err(|e| CodecError::InvalidEnvelope(e.to_string()))?;
    let resumes: Vec<Document> =
        serde_json::from_value(resumes).map_err(|e| CodecError::InvalidDocuments(e.to_string()))?;

    let envelope = Envelope {
        version: header.version,
        device_id: header.device_id,
        checksum: header.checksum,
        encrypted: header.encrypted,
        payload: header.payload,
        resumes,
    };

    if envelope.version == 0 {
        return Err(CodecError::InvalidEnvelope(
            "version must be at least 1".to_string(),
        ));
    }
    if envelope.version > ENVELOPE_VERSION {
        tracing::warn!(
            "Sync file has version {} (this build writes {}); relying on checksum verification",
            envelope.version,
            ENVELOPE_VERSION
        );
    }
    if envelope.encrypted && envelope.payload.is_none() {
        return Err(CodecError::InvalidEnvelope(
            "encrypted envelope has no payload".to_string(),
        ));
    }
    if envelope.encrypted && !envelope.resumes.is_empty() {
        return Err(CodecError::InvalidEnvelope(
            "encrypted envelope carries plaintext documents".to_string(),
        ));
    }

    Ok(Some(envelope))
}

/// Recover the documents from an envelope and verify its checksum.
///
/// The checksum is always recomputed over the plaintext array; a mismatch is
/// an integrity failure regardless of envelope version or encryption.
pub fn open(envelope: &Envelope, passphrase: Option<&str>) -> Result<Vec<Document>, CodecError> {
    let documents = if envelope.encrypted {
        let payload = envelope.payload.as_ref().ok_or_else(|| {
            CodecError::InvalidEnvelope("encrypted envelope has no payload".to_string())
        })?;
        let passphrase = passphrase.ok_or(CodecError::PassphraseRequired)?;
        let plaintext = crypto::decrypt_payload(payload, passphrase)?;
        serde_json::from_slice::<Vec<Document>>(&plaintext).map_err(|e| {
            CodecError::InvalidDocuments(format!("decrypted payload: {}", e))
        })?
    } else {
        envelope.resumes.clone()
    };

    let actual = checksum(&documents)?;
    if !actual.eq_ignore_ascii_case(&envelope.checksum) {
        return Err(CodecError::Integrity {
            expected: envelope.checksum.clone(),
            actual,
        });
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoError;
    use chrono::{TimeZone, Utc};

    fn sample_docs() -> Vec<Document> {
        vec![
            Document::new("Backend")
                .with_id("r1")
                .with_last_modified(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
                .with_field("template", "modern"),
            Document::new("Frontend")
                .with_id("r2")
                .with_last_modified(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()),
        ]
    }

    #[test]
    fn test_plain_encode_decode_open() {
        let docs = sample_docs();
        let envelope = seal(&docs, "dev", None).unwrap();
        let raw = encode(&envelope).unwrap();

        assert!(!raw.contains("\"encrypted\""));
        assert!(!raw.contains("\"payload\""));

        let decoded = decode(&raw).unwrap().unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(open(&decoded, None).unwrap(), docs);
    }

    #[test]
    fn test_encrypted_envelope_hides_documents() {
        let docs = sample_docs();
        let envelope = seal(&docs, "dev", Some("hunter2")).unwrap();
        let raw = encode(&envelope).unwrap();

        assert!(envelope.encrypted);
        assert!(envelope.resumes.is_empty());
        assert!(!raw.contains("Backend"));
        assert!(raw.contains("\"encrypted\":true"));
        // Metadata stays readable and the checksum matches the plaintext
        assert_eq!(envelope.checksum, checksum(&docs).unwrap());

        let decoded = decode(&raw).unwrap().unwrap();
        assert_eq!(open(&decoded, Some("hunter2")).unwrap(), docs);
    }

    #[test]
    fn test_encrypted_without_passphrase() {
        let envelope = seal(&sample_docs(), "dev", Some("pw")).unwrap();
        assert!(matches!(
            open(&envelope, None),
            Err(CodecError::PassphraseRequired)
        ));
    }

    #[test]
    fn test_encrypted_wrong_passphrase_is_crypto_error() {
        let envelope = seal(&sample_docs(), "dev", Some("pw")).unwrap();
        assert!(matches!(
            open(&envelope, Some("nope")),
            Err(CodecError::Crypto(CryptoError::DecryptionFailed))
        ));
    }

    #[test]
    fn test_empty_file_is_no_data() {
        assert!(decode("").unwrap().is_none());
        assert!(decode("  \n").unwrap().is_none());
    }

    #[test]
    fn test_malformed_json_is_error_not_empty() {
        assert!(matches!(
            decode("{ not json"),
            Err(CodecError::MalformedJson(_))
        ));
    }

    #[test]
    fn test_resumes_not_array_is_error() {
        let raw = r#"{"version":1,"deviceId":"d","checksum":"x","resumes":{"a":1}}"#;
        assert!(matches!(
            decode(raw),
            Err(CodecError::InvalidDocuments(_))
        ));
    }

    #[test]
    fn test_resumes_with_bad_document_is_error() {
        let raw = r#"{"version":1,"deviceId":"d","checksum":"x","resumes":[{"title":"no id"}]}"#;
        assert!(matches!(
            decode(raw),
            Err(CodecError::InvalidDocuments(_))
        ));
    }

    #[test]
    fn test_missing_checksum_is_invalid_envelope() {
        let raw = r#"{"version":1,"deviceId":"d","resumes":[]}"#;
        assert!(matches!(
            decode(raw),
            Err(CodecError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn test_top_level_array_is_error() {
        assert!(matches!(
            decode("[]"),
            Err(CodecError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn test_checksum_mismatch_is_integrity_error() {
        let mut envelope = seal(&sample_docs(), "dev", None).unwrap();
        envelope.resumes[0].title = "Tampered".to_string();

        assert!(matches!(
            open(&envelope, None),
            Err(CodecError::Integrity { .. })
        ));
    }

    #[test]
    fn test_encrypted_checksum_verified_after_decrypt() {
        let docs = sample_docs();
        let mut envelope = seal(&docs, "dev", Some("pw")).unwrap();
        envelope.checksum = checksum(&docs[..1]).unwrap();

        assert!(matches!(
            open(&envelope, Some("pw")),
            Err(CodecError::Integrity { .. })
        ));
    }

    #[test]
    fn test_encrypted_flag_without_payload_rejected() {
        let raw = r#"{"version":1,"deviceId":"d","checksum":"x","encrypted":true,"resumes":[]}"#;
        assert!(matches!(
            decode(raw),
            Err(CodecError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn test_future_version_still_decodes() {
        let docs = sample_docs();
        let mut envelope = seal(&docs, "dev", None).unwrap();
        envelope.version = ENVELOPE_VERSION + 1;
        let raw = encode(&envelope).unwrap();

        let decoded = decode(&raw).unwrap().unwrap();
        assert_eq!(open(&decoded, None).unwrap(), docs);
    }
}
