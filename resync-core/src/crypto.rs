//! Passphrase-based encryption for the sync file payload.
//!
//! The serialized document array is encrypted with AES-256-GCM under a key
//! stretched from the user's passphrase with PBKDF2-HMAC-SHA256:
//! - Iterations: 210,000
//! - Salt: 16 random bytes, fresh for every encryption
//! - IV: 12 random bytes, fresh for every encryption
//! - Key: 32 bytes (256 bits)
//!
//! Envelope metadata (version, device id, checksum) is never encrypted.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

/// Cipher name recorded in the payload.
pub const ALG_AES_GCM: &str = "AES-GCM";
/// KDF name recorded in the payload.
pub const KDF_PBKDF2: &str = "PBKDF2";
/// PBKDF2 iteration count. Changing it breaks every existing encrypted file.
pub const PBKDF2_ITERATIONS: u32 = 210_000;

const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Passphrase must not be empty")]
    EmptyPassphrase,

    /// AEAD tag mismatch: wrong passphrase or tampered ciphertext.
    #[error("Decryption failed: wrong passphrase or corrupted data")]
    DecryptionFailed,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Malformed encrypted payload: {0}")]
    MalformedPayload(String),

    #[error("Unsupported encryption scheme: alg={alg}, kdf={kdf}")]
    Unsupported { alg: String, kdf: String },
}

/// Encrypted document array as stored in the sync file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncryptedPayload {
    pub alg: String,
    pub kdf: String,
    pub salt: String,
    pub iv: String,
    pub ciphertext: String,
}

/// Derive a 256-bit key from a passphrase and salt.
///
/// Deliberately slow. Callers must not cache the result across writes since
/// each write uses a new salt.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], CryptoError> {
    if passphrase.is_empty() {
        return Err(CryptoError::EmptyPassphrase);
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    Ok(key)
}

/// Encrypt `plaintext` under `passphrase` with a fresh salt and IV.
pub fn encrypt_payload(plaintext: &[u8], passphrase: &str) -> Result<EncryptedPayload, CryptoError> {
    let salt: [u8; SALT_LEN] = rand::random();
    let iv: [u8; IV_LEN] = rand::random();
    let key = derive_key(passphrase, &salt)?;

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(EncryptedPayload {
        alg: ALG_AES_GCM.to_string(),
        kdf: KDF_PBKDF2.to_string(),
        salt: STANDARD.encode(salt),
        iv: STANDARD.encode(iv),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

/// Decrypt a payload produced by [`encrypt_payload`].
///
/// Returns [`CryptoError::DecryptionFailed`] only when the AEAD tag does not
/// verify. Structural problems are reported as `MalformedPayload` or
/// `Unsupported` so callers can tell a bad passphrase from a bad file.
pub fn decrypt_payload(payload: &EncryptedPayload, passphrase: &str) -> Result<Vec<u8>, CryptoError> {
    if payload.alg != ALG_AES_GCM || payload.kdf != KDF_PBKDF2 {
        return Err(CryptoError::Unsupported {
            alg: payload.alg.clone(),
            kdf: payload.kdf.clone(),
        });
    }

    let salt = decode_field("salt", &payload.salt)?;
    let iv = decode_field("iv", &payload.iv)?;
    let ciphertext = decode_field("ciphertext", &payload.ciphertext)?;

    if iv.len() != IV_LEN {
        return Err(CryptoError::MalformedPayload(format!(
            "iv must be {} bytes, got {}",
            IV_LEN,
            iv.len()
        )));
    }
    if salt.is_empty() {
        return Err(CryptoError::MalformedPayload("salt is empty".to_string()));
    }

    let key = derive_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CryptoError::MalformedPayload(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::MalformedPayload(format!("{} is not valid base64: {}", name, e)))
}
