use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# resync configuration

# Path to SQLite database (default: platform data dir + resync/resync.db)
# database_path: ~/.local/share/resync/resync.db

# Name shown for this device
# device_name: laptop

sync:
  # localdir: a folder on disk, e.g. inside Dropbox or iCloud Drive
  # http: a WebDAV-style server (set server_url and api_key)
  provider: localdir
  # remote_dir: ~/Dropbox/resync
  # server_url: https://dav.example.com/backups
  # api_key: your-api-key
  file_name: resync.json
  # Pull remote changes before read commands
  auto_sync: false

# The encryption passphrase is never stored. Set RESYNC_PASSPHRASE instead.
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!("device_name: {}", config.device_name.value);
                        println!("  source: {}", config.device_name.source);
                        println!();

                        println!("sync.provider: {}", config.sync.provider);
                        if let Some(dir) = &config.sync.remote_dir {
                            println!("sync.remote_dir: {}", dir.display());
                        }
                        if let Some(url) = &config.sync.server_url {
                            println!("sync.server_url: {}", url);
                        }
                        println!(
                            "sync.api_key: {}",
                            if config.sync.api_key.is_some() {
                                "(set)"
                            } else {
                                "(not set)"
                            }
                        );
                        println!("sync.file_name: {}", config.sync.file_name);
                        println!("sync.auto_sync: {}", config.sync.auto_sync);
                        println!(
                            "passphrase: {}",
                            if config.passphrase.is_some() {
                                "(set from RESYNC_PASSPHRASE)"
                            } else {
                                "(not set)"
                            }
                        );
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'resync config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use tempfile::tempdir;

    #[test]
    fn test_init_writes_loadable_config() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("resync").join("config.yaml");

        let cmd = ConfigCommand {
            command: ConfigSubcommand::Init,
        };
        let config = Config::load(Some(path.clone())).unwrap();
        cmd.run(&config, Some(path.clone())).unwrap();
        assert!(path.exists());

        let loaded = Config::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.config_file, Some(path));
        assert_eq!(loaded.sync.provider, ProviderKind::Localdir);
        assert!(!loaded.sync.auto_sync);
    }
}
