//! Wiring between the CLI configuration and the sync engine.
//!
//! The orchestrator lives in `resync-core`. This module picks the remote
//! provider from config and hands it the SQLite-backed local stores.

mod auto_sync;

pub use auto_sync::try_auto_sync;

use resync_core::{HttpProvider, LocalDirProvider, RemoteProvider, SyncOrchestrator};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::{Config, ProviderKind, SyncConfig};
use crate::db::{
    SqliteDocumentStore, SqliteKeyValueStore, METRICS_NAMESPACE, SETTINGS_NAMESPACE,
};

#[derive(Debug)]
pub enum SyncSetupError {
    /// The selected provider is missing a required setting.
    NotConfigured(ProviderKind, &'static str),
}

impl std::fmt::Display for SyncSetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncSetupError::NotConfigured(kind, setting) => write!(
                f,
                "Sync is not configured: the {} provider needs 'sync.{}' in the config file",
                kind, setting
            ),
        }
    }
}

impl std::error::Error for SyncSetupError {}

/// Build the remote provider selected in config.
pub fn build_provider(sync: &SyncConfig) -> Result<Arc<dyn RemoteProvider>, SyncSetupError> {
    match sync.provider {
        ProviderKind::Localdir => {
            let dir = sync
                .remote_dir
                .clone()
                .ok_or(SyncSetupError::NotConfigured(ProviderKind::Localdir, "remote_dir"))?;
            Ok(Arc::new(LocalDirProvider::new(dir, sync.file_name.clone())))
        }
        ProviderKind::Http => {
            let url = sync
                .server_url
                .clone()
                .ok_or(SyncSetupError::NotConfigured(ProviderKind::Http, "server_url"))?;
            let key = sync
                .api_key
                .clone()
                .ok_or(SyncSetupError::NotConfigured(ProviderKind::Http, "api_key"))?;
            Ok(Arc::new(HttpProvider::new(url, sync.file_name.clone(), key)))
        }
    }
}

/// Build an orchestrator over the local database, with the passphrase from
/// the environment already applied.
pub async fn build_orchestrator(
    config: &Config,
    pool: SqlitePool,
) -> Result<SyncOrchestrator, SyncSetupError> {
    let provider = build_provider(&config.sync)?;
    let orchestrator = SyncOrchestrator::new(
        provider,
        Arc::new(SqliteDocumentStore::new(pool.clone())),
        Arc::new(SqliteKeyValueStore::new(pool.clone(), SETTINGS_NAMESPACE)),
        Arc::new(SqliteKeyValueStore::new(pool, METRICS_NAMESPACE)),
    );
    orchestrator.set_passphrase(config.passphrase.clone()).await;
    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_localdir_provider_needs_remote_dir() {
        let sync = SyncConfig::default();
        assert!(matches!(
            build_provider(&sync),
            Err(SyncSetupError::NotConfigured(ProviderKind::Localdir, "remote_dir"))
        ));

        let sync = SyncConfig {
            remote_dir: Some(PathBuf::from("/tmp/backups")),
            ..Default::default()
        };
        assert_eq!(build_provider(&sync).unwrap().id(), "localdir");
    }

    #[test]
    fn test_http_provider_needs_key() {
        let mut sync = SyncConfig {
            provider: ProviderKind::Http,
            server_url: Some("https://dav.example.com".into()),
            ..Default::default()
        };
        assert!(matches!(
            build_provider(&sync),
            Err(SyncSetupError::NotConfigured(ProviderKind::Http, "api_key"))
        ));

        sync.api_key = Some("secret".into());
        assert_eq!(build_provider(&sync).unwrap().id(), "http");
    }
}
