//! Persisted sync settings.
//!
//! Settings are stored as one JSON record in the key-value port. The device
//! id lives under its own key so it outlives disconnects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::provider::{AccountProfile, AuthState, RemoteFileMeta};
use crate::store::{KeyValueStore, StoreError};

pub const SETTINGS_KEY: &str = "sync.settings";
pub const DEVICE_ID_KEY: &str = "sync.device_id";

/// Everything the orchestrator remembers between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettingsState {
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthState>,
    #[serde(default)]
    pub remote_file: Option<RemoteFileMeta>,
    #[serde(default)]
    pub account: Option<AccountProfile>,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Checksum of the document set at the last successful sync.
    #[serde(default)]
    pub last_synced_checksum: Option<String>,
    #[serde(default)]
    pub encryption_enabled: bool,
    /// `encryption_enabled` was toggled here and not yet written remotely.
    #[serde(default)]
    pub encryption_changed: bool,
}

impl SyncSettingsState {
    /// Connected means we hold a credential and know which file to sync.
    pub fn is_connected(&self) -> bool {
        self.auth.is_some() && self.remote_file.is_some()
    }

    /// Record a successful sync.
    pub fn mark_synced(&mut self, remote_file: RemoteFileMeta, checksum: String, at: DateTime<Utc>) {
        self.remote_file = Some(remote_file);
        self.last_synced_checksum = Some(checksum);
        self.last_sync_at = Some(at);
        self.encryption_changed = false;
    }

    /// Forget everything tied to the remote. The encryption flag is kept.
    pub fn clear_connection(&mut self) {
        *self = SyncSettingsState {
            encryption_enabled: self.encryption_enabled,
            encryption_changed: self.encryption_changed,
            ..Default::default()
        };
    }
}

/// Reads and writes [`SyncSettingsState`] through a [`KeyValueStore`].
#[derive(Clone)]
pub struct SettingsStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Load settings. A missing record yields defaults.
    pub async fn load(&self) -> Result<SyncSettingsState, StoreError> {
        match self.kv.get(SETTINGS_KEY).await? {
            Some(json) => serde_json::from_str(&json).map_err(|e| StoreError::InvalidValue {
                key: SETTINGS_KEY.to_string(),
                detail: e.to_string(),
            }),
            None => Ok(SyncSettingsState::default()),
        }
    }

    pub async fn save(&self, settings: &SyncSettingsState) -> Result<(), StoreError> {
        let json = serde_json::to_string(settings).map_err(|e| StoreError::InvalidValue {
            key: SETTINGS_KEY.to_string(),
            detail: e.to_string(),
        })?;
        self.kv.set(SETTINGS_KEY, &json).await
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.kv.remove(SETTINGS_KEY).await
    }

    /// This device's id, generated and stored on first use.
    pub async fn device_id(&self) -> Result<String, StoreError> {
        if let Some(id) = self.kv.get(DEVICE_ID_KEY).await? {
            if !id.is_empty() {
                return Ok(id);
            }
        }

        let id = Uuid::new_v4().to_string();
        self.kv.set(DEVICE_ID_KEY, &id).await?;
        tracing::debug!("Generated device id {}", id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKeyValueStore;

    fn store() -> (SettingsStore, Arc<MemoryKeyValueStore>) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        (SettingsStore::new(kv.clone()), kv)
    }

    #[tokio::test]
    async fn test_load_missing_is_default() {
        let (settings, _) = store();
        let state = settings.load().await.unwrap();
        assert_eq!(state, SyncSettingsState::default());
        assert!(!state.is_connected());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (settings, _) = store();
        let mut state = SyncSettingsState {
            provider_id: Some("localdir".into()),
            auth: Some(AuthState::permanent("t")),
            encryption_enabled: true,
            ..Default::default()
        };
        state.mark_synced(RemoteFileMeta::new("f").with_revision("r1"), "abc".into(), Utc::now());

        settings.save(&state).await.unwrap();
        let loaded = settings.load().await.unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.is_connected());
    }

    #[tokio::test]
    async fn test_corrupt_settings_is_error() {
        let (settings, kv) = store();
        kv.set(SETTINGS_KEY, "{broken").await.unwrap();
        assert!(matches!(
            settings.load().await,
            Err(StoreError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_device_id_is_stable_and_survives_clear() {
        let (settings, _) = store();
        let first = settings.device_id().await.unwrap();
        settings.save(&SyncSettingsState::default()).await.unwrap();
        settings.clear().await.unwrap();
        assert_eq!(settings.device_id().await.unwrap(), first);
    }

    #[test]
    fn test_clear_connection_keeps_encryption_flag() {
        let mut state = SyncSettingsState {
            provider_id: Some("http".into()),
            auth: Some(AuthState::permanent("t")),
            remote_file: Some(RemoteFileMeta::new("f")),
            last_synced_checksum: Some("c".into()),
            encryption_enabled: true,
            ..Default::default()
        };
        state.clear_connection();
        assert!(!state.is_connected());
        assert!(state.last_synced_checksum.is_none());
        assert!(state.encryption_enabled);
    }
}
