//! Remote storage provider contract.
//!
//! A provider owns exactly one sync file in storage the user controls. The
//! orchestrator resolves the file once with [`RemoteProvider::ensure_sync_file`]
//! and then always targets it through the returned [`RemoteFileMeta`].
//!
//! Errors are typed ([`ProviderError`]) so retry decisions never depend on
//! message text.

mod http;
mod localdir;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpProvider;
pub use localdir::LocalDirProvider;

/// Credential returned by sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub token: String,
    /// `None` means the credential does not expire.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl AuthState {
    /// A credential that never expires.
    pub fn permanent(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
            refresh_token: None,
        }
    }
}

/// Identity of the signed-in account, for display only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Handle to the single sync file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileMeta {
    /// Provider-specific identifier of the file object.
    pub id: String,
    /// Content revision (ETag, hash, ...) when the provider exposes one.
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl RemoteFileMeta {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revision: None,
            modified_at: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// True when `other` is provably the same object at the same revision.
    ///
    /// Without a revision on both sides nothing can be concluded.
    pub fn same_revision(&self, other: &RemoteFileMeta) -> bool {
        match (&self.revision, &other.revision) {
            (Some(a), Some(b)) => self.id == other.id && a == b,
            _ => false,
        }
    }
}

/// Downloaded file content together with its current handle.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub raw: String,
    pub meta: RemoteFileMeta,
}

/// Classified provider failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Timeouts, throttling, 5xx: safe to retry.
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// Credential rejected; the user must reconnect.
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// The provider returned data it cannot represent as a sync file.
    #[error("Invalid provider data: {0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Classify an HTTP-like status code.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        let detail = format!("({}) {}", status, detail.into());
        match status {
            401 => ProviderError::AuthExpired(detail),
            408 | 425 | 429 | 500..=599 => ProviderError::Transient(detail),
            _ => ProviderError::Unknown(detail),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Capability to read and write the single remote sync file.
#[async_trait]
pub trait RemoteProvider: Send + Sync {
    /// Stable provider identifier persisted in settings.
    fn id(&self) -> &str;

    /// Obtain a credential. `interactive == false` must never prompt.
    async fn sign_in(&self, interactive: bool) -> Result<AuthState, ProviderError>;

    async fn sign_out(&self, auth: &AuthState) -> Result<(), ProviderError>;

    async fn account_profile(&self, auth: &AuthState) -> Result<AccountProfile, ProviderError>;

    /// Locate the sync file, creating it empty if absent. Idempotent.
    async fn ensure_sync_file(&self, auth: &AuthState) -> Result<RemoteFileMeta, ProviderError>;

    /// Download the file. A file with no content yields an empty `raw`.
    async fn download(
        &self,
        auth: &AuthState,
        meta: &RemoteFileMeta,
    ) -> Result<RemoteFile, ProviderError>;

    /// Replace the file content, returning the new handle.
    async fn upload(
        &self,
        auth: &AuthState,
        meta: &RemoteFileMeta,
        content: &str,
    ) -> Result<RemoteFileMeta, ProviderError>;

    /// Delete the file. Deleting a missing file succeeds.
    async fn delete(&self, auth: &AuthState, meta: &RemoteFileMeta) -> Result<(), ProviderError>;
}
