//! Resync Core Library
//!
//! Local-first sync of a document collection against a single remote file.

pub mod auth;
pub mod compare;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod resolver;
pub mod retry;
pub mod settings;
pub mod store;

pub use compare::{compare, SyncAnchor, SyncComparison};
pub use crypto::{CryptoError, EncryptedPayload};
pub use envelope::{CodecError, Envelope, ENVELOPE_VERSION};
pub use error::{ErrorKind, SyncError};
pub use metrics::{MetricsRecorder, SyncMetrics};
pub use models::Document;
pub use orchestrator::{Busy, ConflictSummary, SyncOrchestrator, SyncSnapshot, SyncStatus};
pub use provider::{
    AccountProfile, AuthState, HttpProvider, LocalDirProvider, ProviderError, RemoteFile,
    RemoteFileMeta, RemoteProvider,
};
pub use resolver::{resolve, ConflictStrategy, Resolution};
pub use retry::RetryPolicy;
pub use settings::{SettingsStore, SyncSettingsState};
pub use store::{
    DocumentStore, KeyValueStore, MemoryDocumentStore, MemoryKeyValueStore, StoreError,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
