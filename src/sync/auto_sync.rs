//! Startup pull before read commands.
//!
//! When `sync.auto_sync` is enabled, read commands first pull remote changes
//! that cannot overwrite local edits. Anything that goes wrong is reported
//! and skipped so the CLI keeps working offline.

use resync_core::SyncStatus;

use crate::config::Config;
use crate::db::init_db;

use super::build_orchestrator;

/// Performs a startup pull if enabled and sync is configured.
pub fn try_auto_sync(config: &Config) {
    if !config.sync.auto_sync || !config.sync.is_configured() {
        return;
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(_) => return,
    };

    rt.block_on(async {
        let pool = match init_db(&config.database_path.value).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!("Auto-sync skipped: {}", e);
                return;
            }
        };

        let orchestrator = match build_orchestrator(config, pool).await {
            Ok(o) => o,
            Err(_) => return,
        };

        match orchestrator.startup_pull().await {
            Ok(snapshot) if snapshot.status == SyncStatus::Error => {
                if let Some(message) = snapshot.message() {
                    eprintln!("Auto-sync: {}", message);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("Auto-sync skipped: {}", e),
        }
    });
}
