//! The sync state machine.
//!
//! [`SyncOrchestrator`] sequences auth, download, comparison, resolution and
//! upload against one [`RemoteProvider`]. It is the only place that retries
//! or refreshes credentials.
//!
//! Operations never fail with a sync error. Outcomes are recorded in the
//! [`SyncSnapshot`] they return. The only error is [`Busy`], returned without
//! touching any state when another operation is still running.

mod state;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use state::{Busy, ConflictSummary, SyncSnapshot, SyncStatus};
use state::{PendingConflict, State};

use crate::auth::{self, needs_refresh, AUTH_EXPIRY_GRACE};
use crate::compare::{compare, SyncAnchor, SyncComparison};
use crate::envelope::{self, build_envelope};
use crate::error::{ErrorKind, SyncError};
use crate::metrics::{MetricEvent, MetricsRecorder};
use crate::models::Document;
use crate::provider::{AuthState, RemoteFile, RemoteFileMeta, RemoteProvider};
use crate::resolver::{resolve, ConflictStrategy};
use crate::retry::{with_retry, RetryPolicy};
use crate::settings::{SettingsStore, SyncSettingsState};
use crate::store::{DocumentStore, KeyValueStore};

enum SyncOutcome {
    Synced,
    Conflict(PendingConflict),
}

pub struct SyncOrchestrator {
    provider: Arc<dyn RemoteProvider>,
    documents: Arc<dyn DocumentStore>,
    settings: SettingsStore,
    metrics: MetricsRecorder,
    retry: RetryPolicy,
    /// Held for the whole duration of an operation.
    flight: Mutex<()>,
    state: Mutex<State>,
}

impl SyncOrchestrator {
    /// `settings_kv` and `metrics_kv` should be separate namespaces.
    pub fn new(
        provider: Arc<dyn RemoteProvider>,
        documents: Arc<dyn DocumentStore>,
        settings_kv: Arc<dyn KeyValueStore>,
        metrics_kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            provider,
            documents,
            settings: SettingsStore::new(settings_kv),
            metrics: MetricsRecorder::new(metrics_kv),
            retry: RetryPolicy::default(),
            flight: Mutex::new(()),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider_id(&self) -> &str {
        self.provider.id()
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Hold the encryption passphrase in memory. Empty clears it.
    pub async fn set_passphrase(&self, passphrase: Option<String>) {
        self.state.lock().await.passphrase = passphrase.filter(|p| !p.is_empty());
    }

    pub async fn snapshot(&self) -> SyncSnapshot {
        let settings = self.settings.load().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read sync settings: {}", e);
            SyncSettingsState::default()
        });
        let state = self.state.lock().await;

        let status = state.status.unwrap_or(if settings.is_connected() {
            SyncStatus::UpToDate
        } else {
            SyncStatus::NotConnected
        });

        SyncSnapshot {
            status,
            error: state.error.clone(),
            conflict: state.conflict.as_ref().map(PendingConflict::summary),
            provider_id: settings.provider_id,
            account: settings.account,
            last_sync_at: settings.last_sync_at,
            encryption_enabled: settings.encryption_enabled,
            passphrase_set: state.passphrase.is_some(),
        }
    }

    /// Sign in interactively and bind to the remote sync file.
    pub async fn connect(&self) -> Result<SyncSnapshot, Busy> {
        let _flight = self.flight.try_lock().map_err(|_| Busy)?;
        self.begin(true).await;

        match self.run_connect().await {
            Ok(()) => {
                tracing::info!("Connected to {} provider", self.provider.id());
                Ok(self.finish(SyncStatus::UpToDate, None).await)
            }
            Err(e) => Ok(self.fail(e).await),
        }
    }

    /// Reconcile local documents with the remote file.
    pub async fn sync_now(&self) -> Result<SyncSnapshot, Busy> {
        let _flight = self.flight.try_lock().map_err(|_| Busy)?;

        let mut settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => return Ok(self.fail(e.into()).await),
        };
        if !settings.is_connected() {
            return Ok(self.finish(SyncStatus::NotConnected, None).await);
        }
        let passphrase = self.state.lock().await.passphrase.clone();
        if settings.encryption_enabled && passphrase.is_none() {
            return Ok(self.fail(SyncError::passphrase_required()).await);
        }

        self.metrics.record(MetricEvent::Attempt).await;
        self.begin(true).await;

        let snapshot = match self.run_sync(&mut settings, passphrase.as_deref()).await {
            Ok(SyncOutcome::Synced) => {
                self.metrics.record(MetricEvent::Success).await;
                self.finish(SyncStatus::UpToDate, None).await
            }
            Ok(SyncOutcome::Conflict(pending)) => {
                tracing::info!(
                    "Local and remote diverged ({} local, {} remote documents)",
                    pending.local.len(),
                    pending.remote.len()
                );
                self.metrics.record(MetricEvent::Conflict).await;
                self.state.lock().await.conflict = Some(pending);
                self.finish(SyncStatus::Conflict, None).await
            }
            Err(e) => {
                self.metrics.record(MetricEvent::Failure).await;
                self.fail(e).await
            }
        };

        self.metrics.log_conflict_rate().await;
        Ok(snapshot)
    }

    /// Apply `strategy` to the pending conflict.
    ///
    /// Counted as its own attempt. The conflict is kept if resolution fails
    /// so it can be retried.
    pub async fn resolve_conflict(&self, strategy: ConflictStrategy) -> Result<SyncSnapshot, Busy> {
        let _flight = self.flight.try_lock().map_err(|_| Busy)?;

        let (pending, passphrase) = {
            let mut state = self.state.lock().await;
            (state.conflict.take(), state.passphrase.clone())
        };
        let pending = match pending {
            Some(pending) => pending,
            None => {
                tracing::warn!("No conflict to resolve");
                return Ok(self.snapshot().await);
            }
        };

        self.metrics.record(MetricEvent::Attempt).await;
        self.begin(false).await;
        let result = match self.settings.load().await {
            Ok(mut settings) => {
                self.apply_resolution(&mut settings, strategy, &pending, passphrase.as_deref())
                    .await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                tracing::info!("Resolved sync conflict with {}", strategy);
                self.metrics.record(MetricEvent::Success).await;
                Ok(self.finish(SyncStatus::UpToDate, None).await)
            }
            Err(e) => {
                self.state.lock().await.conflict = Some(pending);
                self.metrics.record(MetricEvent::Failure).await;
                Ok(self.fail(e).await)
            }
        }
    }

    /// Replace local documents with the remote file content.
    pub async fn restore_from_cloud(&self) -> Result<SyncSnapshot, Busy> {
        let _flight = self.flight.try_lock().map_err(|_| Busy)?;

        let mut settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => return Ok(self.fail(e.into()).await),
        };
        if !settings.is_connected() {
            return Ok(self.finish(SyncStatus::NotConnected, None).await);
        }
        let passphrase = self.state.lock().await.passphrase.clone();

        self.metrics.record(MetricEvent::Attempt).await;
        self.begin(true).await;

        match self.run_restore(&mut settings, passphrase.as_deref()).await {
            Ok(count) => {
                tracing::info!("Restored {} documents from remote", count);
                self.metrics.record(MetricEvent::Success).await;
                Ok(self.finish(SyncStatus::UpToDate, None).await)
            }
            Err(e) => {
                self.metrics.record(MetricEvent::Failure).await;
                Ok(self.fail(e).await)
            }
        }
    }

    /// Delete the remote file, sign out and forget all sync settings.
    pub async fn delete_cloud_data(&self) -> Result<SyncSnapshot, Busy> {
        let _flight = self.flight.try_lock().map_err(|_| Busy)?;

        let mut settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => return Ok(self.fail(e.into()).await),
        };

        self.begin(true).await;
        if settings.is_connected() {
            match self.run_delete(&mut settings).await {
                Ok(auth) => self.sign_out_quietly(&auth).await,
                Err(e) => return Ok(self.fail(e).await),
            }
        }

        if let Err(e) = self.settings.clear().await {
            return Ok(self.fail(e.into()).await);
        }
        tracing::info!("Deleted remote sync data");
        Ok(self.finish(SyncStatus::NotConnected, None).await)
    }

    /// Pull remote changes on launch when that cannot lose local edits.
    ///
    /// Best-effort: skipped when not connected, when a passphrase is needed
    /// but not held, or when local edits are pending. Failures are logged
    /// and leave the status as it was.
    pub async fn startup_pull(&self) -> Result<SyncSnapshot, Busy> {
        let _flight = self.flight.try_lock().map_err(|_| Busy)?;

        let mut settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Startup pull skipped: {}", e);
                return Ok(self.snapshot().await);
            }
        };
        if !settings.is_connected() {
            tracing::debug!("Startup pull skipped: not connected");
            return Ok(self.snapshot().await);
        }
        let passphrase = self.state.lock().await.passphrase.clone();
        if settings.encryption_enabled && passphrase.is_none() {
            tracing::debug!("Startup pull skipped: passphrase not set");
            return Ok(self.snapshot().await);
        }

        let previous = self.state.lock().await.status;
        self.begin(false).await;

        match self.run_startup_pull(&mut settings, passphrase.as_deref()).await {
            Ok(true) => {
                tracing::info!("Startup pull applied remote changes");
                Ok(self.finish(SyncStatus::UpToDate, None).await)
            }
            Ok(false) => {
                self.state.lock().await.status = previous;
                Ok(self.snapshot().await)
            }
            Err(e) => {
                tracing::warn!("Startup pull failed: {}", e);
                self.state.lock().await.status = previous;
                Ok(self.snapshot().await)
            }
        }
    }

    /// Sign out and forget the connection. Remote data is left alone.
    pub async fn disconnect(&self) -> Result<SyncSnapshot, Busy> {
        let _flight = self.flight.try_lock().map_err(|_| Busy)?;

        let mut settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => return Ok(self.fail(e.into()).await),
        };
        if let Some(auth) = &settings.auth {
            self.sign_out_quietly(auth).await;
        }

        settings.clear_connection();
        if let Err(e) = self.settings.save(&settings).await {
            return Ok(self.fail(e.into()).await);
        }
        self.state.lock().await.conflict = None;
        tracing::info!("Disconnected from {} provider", self.provider.id());
        Ok(self.finish(SyncStatus::NotConnected, None).await)
    }

    /// Toggle encryption of future uploads. Enabling needs a held passphrase.
    pub async fn set_encryption(&self, enabled: bool) -> Result<SyncSnapshot, Busy> {
        let _flight = self.flight.try_lock().map_err(|_| Busy)?;

        if enabled && self.state.lock().await.passphrase.is_none() {
            return Ok(self.fail(SyncError::passphrase_required()).await);
        }

        let result = match self.settings.load().await {
            Ok(mut settings) if settings.encryption_enabled != enabled => {
                settings.encryption_enabled = enabled;
                settings.encryption_changed = true;
                self.settings.save(&settings).await
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            return Ok(self.fail(e.into()).await);
        }

        tracing::info!(
            "Sync encryption {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(self.snapshot().await)
    }

    async fn run_connect(&self) -> Result<(), SyncError> {
        let auth = self.provider.sign_in(true).await?;
        let account = with_retry(&self.retry, "account profile", || {
            self.provider.account_profile(&auth)
        })
        .await?;
        let meta = with_retry(&self.retry, "ensure sync file", || {
            self.provider.ensure_sync_file(&auth)
        })
        .await?;

        let mut settings = self.settings.load().await?;

        // Reconnecting to the same file keeps the anchor and the recorded
        // handle so remote changes made meanwhile are still detected.
        let same_file = settings.provider_id.as_deref() == Some(self.provider.id())
            && settings
                .remote_file
                .as_ref()
                .is_some_and(|recorded| recorded.id == meta.id);
        if !same_file {
            settings.remote_file = Some(meta);
            settings.last_synced_checksum = None;
            settings.last_sync_at = None;
        }

        settings.provider_id = Some(self.provider.id().to_string());
        settings.auth = Some(auth);
        settings.account = Some(account);
        self.settings.save(&settings).await?;
        Ok(())
    }

    async fn run_sync(
        &self,
        settings: &mut SyncSettingsState,
        passphrase: Option<&str>,
    ) -> Result<SyncOutcome, SyncError> {
        let auth = self.fresh_auth(settings).await?;
        let recorded = settings.remote_file.clone().ok_or(SyncError::NotConnected)?;

        self.documents.flush_pending().await?;
        let local_docs = self.documents.load_all().await?;
        let device_id = self.settings.device_id().await?;
        let local = build_envelope(&local_docs, &device_id)?;

        let remote_file = self.download(&auth, &recorded).await?;
        let remote = envelope::decode(&remote_file.raw)?;
        let remote_docs = match &remote {
            Some(remote) => Some(envelope::open(remote, passphrase)?),
            None => None,
        };

        // The remote decides the encryption mode unless it was just toggled
        // on this device.
        if let Some(remote) = &remote {
            if remote.encrypted != settings.encryption_enabled && !settings.encryption_changed {
                tracing::info!(
                    "Remote file is {}, following it",
                    if remote.encrypted { "encrypted" } else { "not encrypted" }
                );
                settings.encryption_enabled = remote.encrypted;
            }
        }

        let anchor = SyncAnchor {
            last_synced_checksum: settings.last_synced_checksum.clone(),
            same_remote_handle: recorded.same_revision(&remote_file.meta),
        };
        let comparison = compare(&local, remote.as_ref(), &anchor);
        tracing::debug!("Sync comparison: {:?}", comparison);

        match comparison {
            SyncComparison::InSync => {
                // Same content, but encryption was toggled here. Rewrite it.
                let rewrite = remote
                    .as_ref()
                    .is_some_and(|remote| remote.encrypted != settings.encryption_enabled);
                let meta = if rewrite {
                    tracing::debug!("Rewriting remote file with current encryption setting");
                    self.upload(&auth, &remote_file.meta, &local_docs, settings, passphrase)
                        .await?
                } else {
                    remote_file.meta
                };
                settings.mark_synced(meta, local.checksum, Utc::now());
            }
            SyncComparison::RemoteNewer => {
                let docs = remote_docs.unwrap_or_default();
                self.documents.replace_all(&docs).await?;
                tracing::debug!("Adopted {} remote documents", docs.len());
                settings.mark_synced(remote_file.meta, envelope::checksum(&docs)?, Utc::now());
            }
            SyncComparison::LocalAhead => {
                let meta = self
                    .upload(&auth, &remote_file.meta, &local_docs, settings, passphrase)
                    .await?;
                tracing::debug!("Uploaded {} local documents", local_docs.len());
                settings.mark_synced(meta, local.checksum, Utc::now());
            }
            SyncComparison::Diverged => {
                // Keep any adopted encryption mode so the resolution upload
                // uses it.
                self.settings.save(settings).await?;
                return Ok(SyncOutcome::Conflict(PendingConflict {
                    local: local_docs,
                    remote: remote_docs.unwrap_or_default(),
                    remote_meta: remote_file.meta,
                }));
            }
        }

        self.settings.save(settings).await?;
        Ok(SyncOutcome::Synced)
    }

    async fn apply_resolution(
        &self,
        settings: &mut SyncSettingsState,
        strategy: ConflictStrategy,
        pending: &PendingConflict,
        passphrase: Option<&str>,
    ) -> Result<(), SyncError> {
        let resolution = resolve(strategy, &pending.local, &pending.remote);
        if resolution.upload && settings.encryption_enabled && passphrase.is_none() {
            return Err(SyncError::passphrase_required());
        }

        // Upload before touching local data so a failed upload leaves the
        // conflict intact.
        let meta = if resolution.upload {
            let auth = self.fresh_auth(settings).await?;
            self.upload(
                &auth,
                &pending.remote_meta,
                &resolution.documents,
                settings,
                passphrase,
            )
            .await?
        } else {
            pending.remote_meta.clone()
        };

        self.documents.replace_all(&resolution.documents).await?;
        settings.mark_synced(
            meta,
            envelope::checksum(&resolution.documents)?,
            Utc::now(),
        );
        self.settings.save(settings).await?;
        Ok(())
    }

    async fn run_restore(
        &self,
        settings: &mut SyncSettingsState,
        passphrase: Option<&str>,
    ) -> Result<usize, SyncError> {
        let auth = self.fresh_auth(settings).await?;
        let recorded = settings.remote_file.clone().ok_or(SyncError::NotConnected)?;

        let remote_file = self.download(&auth, &recorded).await?;
        let remote = envelope::decode(&remote_file.raw)?.ok_or_else(|| {
            SyncError::UserInput("The cloud backup is empty. There is nothing to restore.".into())
        })?;
        let docs = envelope::open(&remote, passphrase)?;

        self.documents.replace_all(&docs).await?;
        settings.mark_synced(remote_file.meta, envelope::checksum(&docs)?, Utc::now());
        self.settings.save(settings).await?;
        Ok(docs.len())
    }

    async fn run_delete(&self, settings: &mut SyncSettingsState) -> Result<AuthState, SyncError> {
        let auth = self.fresh_auth(settings).await?;
        let meta = settings.remote_file.clone().ok_or(SyncError::NotConnected)?;
        with_retry(&self.retry, "delete", || self.provider.delete(&auth, &meta)).await?;
        Ok(auth)
    }

    /// Returns `true` when remote changes were applied.
    async fn run_startup_pull(
        &self,
        settings: &mut SyncSettingsState,
        passphrase: Option<&str>,
    ) -> Result<bool, SyncError> {
        self.documents.flush_pending().await?;
        let local_docs = self.documents.load_all().await?;
        let local_checksum = envelope::checksum(&local_docs)?;
        // An empty set only counts as unchanged before the first sync.
        // After that it may be the user deleting everything.
        let local_unchanged = match settings.last_synced_checksum.as_deref() {
            Some(anchor) => anchor.eq_ignore_ascii_case(&local_checksum),
            None => local_docs.is_empty(),
        };
        if !local_unchanged {
            tracing::debug!("Startup pull skipped: local changes pending");
            return Ok(false);
        }

        let auth = self.fresh_auth(settings).await?;
        let recorded = settings.remote_file.clone().ok_or(SyncError::NotConnected)?;
        let remote_file = self.download(&auth, &recorded).await?;
        let remote = match envelope::decode(&remote_file.raw)? {
            Some(remote) => remote,
            None => return Ok(false),
        };
        if remote.checksum.eq_ignore_ascii_case(&local_checksum) {
            return Ok(false);
        }

        let docs = envelope::open(&remote, passphrase)?;
        self.documents.replace_all(&docs).await?;
        settings.mark_synced(remote_file.meta, envelope::checksum(&docs)?, Utc::now());
        self.settings.save(settings).await?;
        Ok(true)
    }

    /// Current credential, refreshed first if it is about to expire.
    async fn fresh_auth(&self, settings: &mut SyncSettingsState) -> Result<AuthState, SyncError> {
        let current = settings.auth.clone().ok_or(SyncError::NotConnected)?;
        if !needs_refresh(&current, Utc::now(), AUTH_EXPIRY_GRACE) {
            return Ok(current);
        }

        tracing::info!("Credentials expire soon, refreshing");
        let fresh = auth::refresh(self.provider.as_ref(), &current, &self.retry).await?;
        settings.auth = Some(fresh.clone());
        self.settings.save(settings).await?;
        Ok(fresh)
    }

    async fn download(
        &self,
        auth: &AuthState,
        meta: &RemoteFileMeta,
    ) -> Result<RemoteFile, SyncError> {
        with_retry(&self.retry, "download", || self.provider.download(auth, meta)).await
    }

    async fn upload(
        &self,
        auth: &AuthState,
        meta: &RemoteFileMeta,
        documents: &[Document],
        settings: &SyncSettingsState,
        passphrase: Option<&str>,
    ) -> Result<RemoteFileMeta, SyncError> {
        let passphrase = if settings.encryption_enabled {
            Some(passphrase.ok_or_else(SyncError::passphrase_required)?)
        } else {
            None
        };

        let device_id = self.settings.device_id().await?;
        let sealed = envelope::seal(documents, &device_id, passphrase)?;
        let content = envelope::encode(&sealed)?;
        with_retry(&self.retry, "upload", || {
            self.provider.upload(auth, meta, &content)
        })
        .await
    }

    async fn sign_out_quietly(&self, auth: &AuthState) {
        if let Err(e) = self.provider.sign_out(auth).await {
            tracing::warn!("Sign-out failed: {}", e);
        }
    }

    /// Enter `Syncing`, optionally dropping any pending conflict.
    async fn begin(&self, clear_conflict: bool) {
        let mut state = self.state.lock().await;
        state.status = Some(SyncStatus::Syncing);
        state.error = None;
        if clear_conflict {
            state.conflict = None;
        }
    }

    async fn finish(&self, status: SyncStatus, error: Option<SyncError>) -> SyncSnapshot {
        {
            let mut state = self.state.lock().await;
            state.status = Some(status);
            state.error = error;
        }
        tracing::info!("Sync status: {}", status);
        self.snapshot().await
    }

    async fn fail(&self, err: SyncError) -> SyncSnapshot {
        tracing::warn!("Sync error: {}", err);
        if err.kind() == ErrorKind::AuthExpired {
            self.forget_auth().await;
        }
        self.finish(SyncStatus::Error, Some(err)).await
    }

    /// Drop the stored credential so the user has to reconnect.
    async fn forget_auth(&self) {
        let result = match self.settings.load().await {
            Ok(mut settings) => {
                settings.auth = None;
                self.settings.save(&settings).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to clear expired credentials: {}", e);
        }
    }
}
