//! Classified sync errors.
//!
//! Every failure from the provider, codec, crypto and storage layers is
//! folded into [`SyncError`] so the orchestrator can decide on retries and
//! show a message without inspecting error text.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::envelope::CodecError;
use crate::provider::ProviderError;
use crate::store::StoreError;

/// Coarse classification driving retry and UI decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    AuthExpired,
    Validation,
    Decryption,
    UserInput,
    NotConnected,
    Storage,
    Unknown,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Remote temporarily unavailable: {0}")]
    Transient(String),

    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    #[error("Invalid sync data: {0}")]
    Validation(String),

    #[error("Could not decrypt sync data: wrong passphrase or corrupted data")]
    Decryption,

    #[error("{0}")]
    UserInput(String),

    #[error("Sync is not connected")]
    NotConnected,

    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("Sync failed: {0}")]
    Unknown(String),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Transient(_) => ErrorKind::Transient,
            SyncError::AuthExpired(_) => ErrorKind::AuthExpired,
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::Decryption => ErrorKind::Decryption,
            SyncError::UserInput(_) => ErrorKind::UserInput,
            SyncError::NotConnected => ErrorKind::NotConnected,
            SyncError::Storage(_) => ErrorKind::Storage,
            SyncError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn passphrase_required() -> Self {
        SyncError::UserInput(
            "Encryption is enabled. Enter your sync passphrase to continue.".to_string(),
        )
    }

    /// Text that can be shown to the user as is.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Transient(_) => {
                "The sync service is temporarily unavailable. Try again in a moment.".to_string()
            }
            SyncError::AuthExpired(_) => {
                "Your sync connection has expired. Reconnect to continue syncing.".to_string()
            }
            SyncError::Validation(_) => {
                "Cloud backup data appears invalid. Delete the cloud backup and sync again."
                    .to_string()
            }
            SyncError::Decryption => {
                "The sync passphrase is incorrect. Enter the passphrase used on your other devices."
                    .to_string()
            }
            SyncError::UserInput(message) => message.clone(),
            SyncError::NotConnected => "Sync is not connected. Connect a remote first.".to_string(),
            SyncError::Storage(detail) => format!("Could not access local data: {}", detail),
            SyncError::Unknown(detail) => format!("Sync failed: {}", detail),
        }
    }
}

impl From<ProviderError> for SyncError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Transient(detail) => SyncError::Transient(detail),
            ProviderError::AuthExpired(detail) => SyncError::AuthExpired(detail),
            ProviderError::Validation(detail) => SyncError::Validation(detail),
            ProviderError::Unknown(detail) => SyncError::Unknown(detail),
        }
    }
}

impl From<CryptoError> for SyncError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptionFailed => SyncError::Decryption,
            CryptoError::EmptyPassphrase => SyncError::passphrase_required(),
            CryptoError::MalformedPayload(_) | CryptoError::Unsupported { .. } => {
                SyncError::Validation(e.to_string())
            }
            CryptoError::EncryptionFailed(_) => SyncError::Unknown(e.to_string()),
        }
    }
}

impl From<CodecError> for SyncError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Crypto(inner) => inner.into(),
            CodecError::PassphraseRequired => SyncError::passphrase_required(),
            CodecError::Serialize(_) => SyncError::Unknown(e.to_string()),
            CodecError::MalformedJson(_)
            | CodecError::InvalidEnvelope(_)
            | CodecError::InvalidDocuments(_)
            | CodecError::Integrity { .. } => SyncError::Validation(e.to_string()),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Storage(e.to_string())
    }
}
