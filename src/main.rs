use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod db;
mod sync;

use commands::{ConfigCommand, DocCommand, DocSubcommand, SyncCommand};
use config::Config;
use sync::try_auto_sync;

#[derive(Parser)]
#[command(name = "resync")]
#[command(version)]
#[command(about = "Keep a local resume library in sync with a single backup file", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage local documents
    Doc(DocCommand),

    /// Sync with the remote backup file
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resync=warn,resync_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let cli_config_path = cli.config.clone();
    let config = Config::load(cli.config)?;

    // Pull remote changes BEFORE read commands
    if is_read_command(&cli.command) {
        try_auto_sync(&config);
    }

    match &cli.command {
        Some(Commands::Doc(cmd)) => cmd.run(&config)?,
        Some(Commands::Sync(cmd)) => cmd.run(&config)?,
        Some(Commands::Config(cmd)) => cmd.run(&config, cli_config_path)?,
        None => println!("Use --help to see available commands"),
    }

    Ok(())
}

/// Returns true if the command only reads local documents.
fn is_read_command(cmd: &Option<Commands>) -> bool {
    matches!(
        cmd,
        Some(Commands::Doc(d)) if matches!(d.command,
            DocSubcommand::List | DocSubcommand::Export { .. })
    )
}
