//! Sync CLI commands for the remote backup file.

use clap::{Args, Subcommand, ValueEnum};
use resync_core::{
    Busy, ConflictStrategy, ConflictSummary, SyncOrchestrator, SyncSnapshot, SyncStatus,
};
use std::io::{self, Write};

use crate::config::Config;
use crate::db::init_db;
use crate::sync::{build_orchestrator, SyncSetupError};

/// Sync with the remote backup file
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,

    /// How to resolve a conflict without prompting: cloud, local or both
    #[arg(long, short)]
    strategy: Option<ConflictStrategy>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and status
    Status,

    /// Sign in and bind to the remote file
    Connect,

    /// Sign out and forget the remote (remote data is kept)
    Disconnect,

    /// Replace local documents with the remote copy
    Restore {
        /// Skip confirmation
        #[arg(long, short)]
        force: bool,
    },

    /// Delete the remote file and forget the connection
    DeleteRemote {
        /// Skip confirmation
        #[arg(long, short)]
        force: bool,
    },

    /// Turn encryption of the remote file on or off
    Encryption {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl SyncCommand {
    pub fn run(&self, config: &Config) -> Result<(), SyncCommandError> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| SyncCommandError::RuntimeError(e.to_string()))?;

        rt.block_on(async {
            let pool = init_db(&config.database_path.value).await?;
            let orchestrator = build_orchestrator(config, pool).await?;

            match &self.command {
                None => self.sync(&orchestrator).await,
                Some(SyncSubcommand::Status) => self.status(&orchestrator, config).await,
                Some(SyncSubcommand::Connect) => {
                    let snapshot = orchestrator.connect().await?;
                    report(&snapshot)?;
                    if let Some(account) = &snapshot.account {
                        let name = account
                            .display_name
                            .as_deref()
                            .or(account.email.as_deref())
                            .unwrap_or("unknown account");
                        println!("Connected to {} as {}", orchestrator.provider_id(), name);
                    } else {
                        println!("Connected to {}", orchestrator.provider_id());
                    }
                    println!("Run 'resync sync' to upload your documents.");
                    Ok(())
                }
                Some(SyncSubcommand::Disconnect) => {
                    report(&orchestrator.disconnect().await?)?;
                    println!("Disconnected. Remote data was left in place.");
                    Ok(())
                }
                Some(SyncSubcommand::Restore { force }) => {
                    if !force
                        && !confirm("Replace all local documents with the remote copy?")?
                    {
                        println!("Restore cancelled.");
                        return Ok(());
                    }
                    report(&orchestrator.restore_from_cloud().await?)?;
                    println!("Restored local documents from the remote copy.");
                    Ok(())
                }
                Some(SyncSubcommand::DeleteRemote { force }) => {
                    if !force && !confirm("Delete the remote backup file?")? {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                    report(&orchestrator.delete_cloud_data().await?)?;
                    println!("Remote backup deleted and sync disconnected.");
                    Ok(())
                }
                Some(SyncSubcommand::Encryption { state }) => {
                    let enabled = matches!(state, Toggle::On);
                    report(&orchestrator.set_encryption(enabled).await?)?;
                    println!(
                        "Encryption {}. It takes effect on the next sync.",
                        if enabled { "enabled" } else { "disabled" }
                    );
                    Ok(())
                }
            }
        })
    }

    async fn sync(&self, orchestrator: &SyncOrchestrator) -> Result<(), SyncCommandError> {
        println!("Syncing...");
        let snapshot = orchestrator.sync_now().await?;

        match snapshot.status {
            SyncStatus::NotConnected => {
                println!("Not connected. Run 'resync sync connect' first.");
                Ok(())
            }
            SyncStatus::Conflict => {
                let summary = snapshot.conflict.ok_or_else(|| {
                    SyncCommandError::Failed("conflict reported without details".to_string())
                })?;
                let strategy = match self.strategy {
                    Some(strategy) => strategy,
                    None => match prompt_strategy(summary)? {
                        Some(strategy) => strategy,
                        None => {
                            println!("Conflict left unresolved. Nothing was changed.");
                            return Ok(());
                        }
                    },
                };

                report(&orchestrator.resolve_conflict(strategy).await?)?;
                println!("Conflict resolved ({}).", strategy);
                Ok(())
            }
            _ => {
                report(&snapshot)?;
                println!("Up to date.");
                Ok(())
            }
        }
    }

    async fn status(
        &self,
        orchestrator: &SyncOrchestrator,
        config: &Config,
    ) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        println!("Device:    {}", config.device_name.value);
        println!("Provider:  {}", config.sync.provider);
        if let Some(dir) = &config.sync.remote_dir {
            println!("Directory: {}", dir.display());
        }
        if let Some(url) = &config.sync.server_url {
            println!("Server:    {}", url);
        }
        println!("File:      {}", config.sync.file_name);
        println!(
            "Auto-sync: {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!();

        let snapshot = orchestrator.snapshot().await;
        println!("Status:     {}", snapshot.status);
        if let Some(account) = &snapshot.account {
            if let Some(email) = &account.email {
                println!("Account:    {}", email);
            }
        }
        match snapshot.last_sync_at {
            Some(at) => println!("Last sync:  {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => println!("Last sync:  never"),
        }
        println!(
            "Encryption: {}{}",
            if snapshot.encryption_enabled {
                "on"
            } else {
                "off"
            },
            if snapshot.encryption_enabled && !snapshot.passphrase_set {
                " (set RESYNC_PASSPHRASE to sync)"
            } else {
                ""
            }
        );

        let metrics = orchestrator.metrics().load().await;
        println!();
        println!(
            "Attempts: {}  Successes: {}  Failures: {}  Conflicts: {} ({:.0}%)",
            metrics.attempts,
            metrics.successes,
            metrics.failures,
            metrics.conflicts,
            metrics.conflict_rate() * 100.0
        );

        Ok(())
    }
}

/// Turn an error snapshot into a command failure.
fn report(snapshot: &SyncSnapshot) -> Result<(), SyncCommandError> {
    match (snapshot.status, snapshot.message()) {
        (SyncStatus::Error, Some(message)) => Err(SyncCommandError::Failed(message)),
        (SyncStatus::Error, None) => Err(SyncCommandError::Failed("sync failed".to_string())),
        _ => Ok(()),
    }
}

fn prompt_strategy(summary: ConflictSummary) -> Result<Option<ConflictStrategy>, SyncCommandError> {
    println!();
    println!("Local and remote documents have both changed since the last sync.");
    println!("  local:  {} document(s)", summary.local_count);
    println!("  remote: {} document(s)", summary.remote_count);
    println!();
    println!("  [c] use the cloud copy (local changes are discarded)");
    println!("  [l] keep local (the remote file is overwritten)");
    println!("  [b] keep both (conflicting documents are duplicated)");
    print!("Choose [c/l/b], anything else to skip: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(parse_choice(&input))
}

fn parse_choice(input: &str) -> Option<ConflictStrategy> {
    match input.trim().to_lowercase().as_str() {
        "c" => Some(ConflictStrategy::UseCloud),
        "l" => Some(ConflictStrategy::KeepLocal),
        "b" => Some(ConflictStrategy::KeepBoth),
        other => other.parse().ok(),
    }
}

fn confirm(prompt: &str) -> Result<bool, SyncCommandError> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    Setup(SyncSetupError),
    Database(sqlx::Error),
    Busy,
    Io(io::Error),
    /// The operation ran and ended in an error state.
    Failed(String),
    RuntimeError(String),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::Setup(e) => write!(f, "{}", e),
            SyncCommandError::Database(e) => write!(f, "Database error: {}", e),
            SyncCommandError::Busy => write!(f, "{}", Busy),
            SyncCommandError::Io(e) => write!(f, "I/O error: {}", e),
            SyncCommandError::Failed(message) => write!(f, "{}", message),
            SyncCommandError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::Setup(e) => Some(e),
            SyncCommandError::Database(e) => Some(e),
            SyncCommandError::Io(e) => Some(e),
            SyncCommandError::Busy
            | SyncCommandError::Failed(_)
            | SyncCommandError::RuntimeError(_) => None,
        }
    }
}

impl From<SyncSetupError> for SyncCommandError {
    fn from(e: SyncSetupError) -> Self {
        SyncCommandError::Setup(e)
    }
}

impl From<sqlx::Error> for SyncCommandError {
    fn from(e: sqlx::Error) -> Self {
        SyncCommandError::Database(e)
    }
}

impl From<Busy> for SyncCommandError {
    fn from(_: Busy) -> Self {
        SyncCommandError::Busy
    }
}

impl From<io::Error> for SyncCommandError {
    fn from(e: io::Error) -> Self {
        SyncCommandError::Io(e)
    }
}
