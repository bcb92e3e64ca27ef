//! Provider that keeps the sync file in a local directory.
//!
//! Meant for folders already mirrored by another tool (Dropbox, iCloud
//! Drive, Syncthing, a mounted network share). There is no real sign-in;
//! the directory path is the account.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io;
use std::path::PathBuf;

use super::{AccountProfile, AuthState, ProviderError, RemoteFile, RemoteFileMeta, RemoteProvider};

const LOCAL_TOKEN: &str = "localdir";

#[derive(Debug, Clone)]
pub struct LocalDirProvider {
    root: PathBuf,
    file_name: String,
}

impl LocalDirProvider {
    pub fn new(root: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            file_name: file_name.into(),
        }
    }

    /// Full path of the sync file.
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.file_name)
    }

    fn meta_for(&self, content: &[u8]) -> RemoteFileMeta {
        RemoteFileMeta::new(self.path().to_string_lossy().to_string())
            .with_revision(content_revision(content))
    }

    /// Write via temp file + rename so readers never see a partial file.
    async fn write_atomic(&self, content: &[u8]) -> Result<(), ProviderError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(io_error)?;

        let path = self.path();
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .map_err(io_error)?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(io_error)?;
        Ok(())
    }
}

#[async_trait]
impl RemoteProvider for LocalDirProvider {
    fn id(&self) -> &str {
        "localdir"
    }

    async fn sign_in(&self, _interactive: bool) -> Result<AuthState, ProviderError> {
        Ok(AuthState::permanent(LOCAL_TOKEN))
    }

    async fn sign_out(&self, _auth: &AuthState) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn account_profile(&self, _auth: &AuthState) -> Result<AccountProfile, ProviderError> {
        Ok(AccountProfile {
            email: None,
            display_name: Some(self.root.display().to_string()),
        })
    }

    async fn ensure_sync_file(&self, _auth: &AuthState) -> Result<RemoteFileMeta, ProviderError> {
        match tokio::fs::read(self.path()).await {
            Ok(bytes) => Ok(self.meta_for(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Creating empty sync file at {}", self.path().display());
                self.write_atomic(b"").await?;
                Ok(self.meta_for(b""))
            }
            Err(e) => Err(io_error(e)),
        }
    }

    async fn download(
        &self,
        _auth: &AuthState,
        _meta: &RemoteFileMeta,
    ) -> Result<RemoteFile, ProviderError> {
        let bytes = match tokio::fs::read(self.path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_error(e)),
        };

        let meta = self.meta_for(&bytes);
        let raw = String::from_utf8(bytes)
            .map_err(|e| ProviderError::Validation(format!("sync file is not UTF-8: {}", e)))?;

        Ok(RemoteFile { raw, meta })
    }

    async fn upload(
        &self,
        _auth: &AuthState,
        _meta: &RemoteFileMeta,
        content: &str,
    ) -> Result<RemoteFileMeta, ProviderError> {
        self.write_atomic(content.as_bytes()).await?;
        Ok(self.meta_for(content.as_bytes()))
    }

    async fn delete(&self, _auth: &AuthState, _meta: &RemoteFileMeta) -> Result<(), ProviderError> {
        match tokio::fs::remove_file(self.path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}

/// First 16 hex chars of the content's SHA-256.
fn content_revision(content: &[u8]) -> String {
    Sha256::digest(content)
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn io_error(e: io::Error) -> ProviderError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => {
            ProviderError::Transient(e.to_string())
        }
        _ => ProviderError::Unknown(e.to_string()),
    }
}
