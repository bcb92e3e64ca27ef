//! Provider for a single file on a WebDAV-style HTTP server.
//!
//! The file lives at `<server_url>/<file_name>` and is read with `GET`,
//! written with `PUT` and removed with `DELETE`. The ETag header is used as
//! the revision. Authentication is a bearer API key; `GET /me` on the
//! server root is used for the account profile when available.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, ETAG};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{AccountProfile, AuthState, ProviderError, RemoteFile, RemoteFileMeta, RemoteProvider};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "display_name")]
    display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpProvider {
    server_url: String,
    file_name: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(
        server_url: impl Into<String>,
        file_name: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            server_url: server_url.into(),
            file_name: file_name.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Returns the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// URL of the sync file.
    fn file_url(&self) -> String {
        self.build_http_url(&format!("/{}", self.file_name.trim_start_matches('/')))
    }

    /// Builds an HTTP URL for a given path.
    fn build_http_url(&self, path: &str) -> String {
        let base_url = if !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            format!("https://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!("{}{}", base_url.trim_end_matches('/'), path)
    }

    fn bearer(auth: &AuthState) -> String {
        format!("Bearer {}", auth.token)
    }

    fn meta_from(&self, response: &Response) -> RemoteFileMeta {
        let mut meta = RemoteFileMeta::new(self.file_url());
        meta.revision = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());
        meta
    }

    async fn fetch(&self, auth: &AuthState) -> Result<Option<(String, RemoteFileMeta)>, ProviderError> {
        let response = self
            .client
            .get(self.file_url())
            .header(AUTHORIZATION, Self::bearer(auth))
            .send()
            .await
            .map_err(request_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let meta = self.meta_from(&response);
        let raw = response.text().await.map_err(request_error)?;
        Ok(Some((raw, meta)))
    }

    async fn put(&self, auth: &AuthState, content: &str) -> Result<RemoteFileMeta, ProviderError> {
        let response = self
            .client
            .put(self.file_url())
            .header(AUTHORIZATION, Self::bearer(auth))
            .header("Content-Type", "application/json")
            .body(content.to_string())
            .send()
            .await
            .map_err(request_error)?;

        let response = check_status(response).await?;
        let meta = self.meta_from(&response);
        if meta.revision.is_some() {
            return Ok(meta);
        }

        // Server did not return an ETag on PUT; read it back.
        Ok(self
            .fetch(auth)
            .await?
            .map(|(_, meta)| meta)
            .unwrap_or(meta))
    }
}

#[async_trait]
impl RemoteProvider for HttpProvider {
    fn id(&self) -> &str {
        "http"
    }

    async fn sign_in(&self, _interactive: bool) -> Result<AuthState, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::AuthExpired(
                "no API key configured".to_string(),
            ));
        }
        Ok(AuthState::permanent(self.api_key.clone()))
    }

    async fn sign_out(&self, _auth: &AuthState) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn account_profile(&self, auth: &AuthState) -> Result<AccountProfile, ProviderError> {
        let response = self
            .client
            .get(self.build_http_url("/me"))
            .header(AUTHORIZATION, Self::bearer(auth))
            .send()
            .await
            .map_err(request_error)?;

        // Plain WebDAV servers have no profile endpoint.
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
        ) {
            return Ok(AccountProfile {
                email: None,
                display_name: Some(self.server_url.clone()),
            });
        }

        let response = check_status(response).await?;
        let me: MeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Validation(e.to_string()))?;

        Ok(AccountProfile {
            email: me.email,
            display_name: me.display_name,
        })
    }

    async fn ensure_sync_file(&self, auth: &AuthState) -> Result<RemoteFileMeta, ProviderError> {
        match self.fetch(auth).await? {
            Some((_, meta)) => Ok(meta),
            None => {
                tracing::debug!("Creating empty sync file at {}", self.file_url());
                self.put(auth, "").await
            }
        }
    }

    async fn download(
        &self,
        auth: &AuthState,
        meta: &RemoteFileMeta,
    ) -> Result<RemoteFile, ProviderError> {
        match self.fetch(auth).await? {
            Some((raw, meta)) => Ok(RemoteFile { raw, meta }),
            None => Ok(RemoteFile {
                raw: String::new(),
                meta: RemoteFileMeta::new(meta.id.clone()),
            }),
        }
    }

    async fn upload(
        &self,
        auth: &AuthState,
        _meta: &RemoteFileMeta,
        content: &str,
    ) -> Result<RemoteFileMeta, ProviderError> {
        self.put(auth, content).await
    }

    async fn delete(&self, auth: &AuthState, _meta: &RemoteFileMeta) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(self.file_url())
            .header(AUTHORIZATION, Self::bearer(auth))
            .send()
            .await
            .map_err(request_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status.as_u16(), body))
}

fn request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() {
        return ProviderError::Transient(e.to_string());
    }
    if let Some(status) = e.status() {
        return ProviderError::from_status(status.as_u16(), e.to_string());
    }
    if e.is_decode() {
        return ProviderError::Validation(e.to_string());
    }
    ProviderError::Unknown(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_url() {
        let provider = HttpProvider::new("http://localhost:8080", "sync.json", "k");
        assert_eq!(provider.build_http_url("/me"), "http://localhost:8080/me");

        let provider = HttpProvider::new("https://dav.example.com/", "sync.json", "k");
        assert_eq!(provider.build_http_url("/me"), "https://dav.example.com/me");

        let provider = HttpProvider::new("dav.example.com", "sync.json", "k");
        assert_eq!(provider.build_http_url("/me"), "https://dav.example.com/me");
    }

    #[test]
    fn test_file_url() {
        let provider = HttpProvider::new(
            "https://dav.example.com/remote.php/dav/files/me",
            "/resync.json",
            "k",
        );
        assert_eq!(
            provider.file_url(),
            "https://dav.example.com/remote.php/dav/files/me/resync.json"
        );
    }

    #[tokio::test]
    async fn test_sign_in_without_key_is_auth_error() {
        let provider = HttpProvider::new("https://dav.example.com", "sync.json", "");
        assert!(matches!(
            provider.sign_in(true).await,
            Err(ProviderError::AuthExpired(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_in_returns_permanent_token() {
        let provider = HttpProvider::new("https://dav.example.com", "sync.json", "secret");
        let auth = provider.sign_in(false).await.unwrap();
        assert_eq!(auth.token, "secret");
        assert!(auth.expires_at.is_none());
        assert_eq!(provider.server_url(), "https://dav.example.com");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        // Port 9 (discard) on localhost is almost never listening.
        let provider = HttpProvider::new("http://127.0.0.1:9", "sync.json", "k");
        let auth = provider.sign_in(false).await.unwrap();
        let err = provider.ensure_sync_file(&auth).await.unwrap_err();
        assert!(err.is_transient(), "got {:?}", err);
    }
}
