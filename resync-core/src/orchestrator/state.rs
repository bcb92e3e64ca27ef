//! Observable orchestrator state.

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::error::SyncError;
use crate::models::Document;
use crate::provider::{AccountProfile, RemoteFileMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    NotConnected,
    Syncing,
    UpToDate,
    Conflict,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::NotConnected => write!(f, "not connected"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::UpToDate => write!(f, "up to date"),
            SyncStatus::Conflict => write!(f, "conflict"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

/// Document counts shown when asking the user to pick a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictSummary {
    pub local_count: usize,
    pub remote_count: usize,
}

/// Point-in-time view of the orchestrator for display.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    pub status: SyncStatus,
    pub error: Option<SyncError>,
    pub conflict: Option<ConflictSummary>,
    pub provider_id: Option<String>,
    pub account: Option<AccountProfile>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub encryption_enabled: bool,
    pub passphrase_set: bool,
}

impl SyncSnapshot {
    /// User-facing error text, if any.
    pub fn message(&self) -> Option<String> {
        self.error.as_ref().map(SyncError::user_message)
    }
}

/// Returned when an operation is already running.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("A sync operation is already in progress")]
pub struct Busy;

/// Both sides of an unresolved conflict.
#[derive(Debug, Clone)]
pub(crate) struct PendingConflict {
    pub local: Vec<Document>,
    pub remote: Vec<Document>,
    pub remote_meta: RemoteFileMeta,
}

impl PendingConflict {
    pub fn summary(&self) -> ConflictSummary {
        ConflictSummary {
            local_count: self.local.len(),
            remote_count: self.remote.len(),
        }
    }
}

/// In-memory state. `status` is `None` until the first operation runs.
#[derive(Debug, Default)]
pub(crate) struct State {
    pub status: Option<SyncStatus>,
    pub error: Option<SyncError>,
    pub conflict: Option<PendingConflict>,
    pub passphrase: Option<String>,
}
