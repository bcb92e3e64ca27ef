use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the remote sync file.
pub const DEFAULT_FILE_NAME: &str = "resync.json";

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Which remote provider backs the sync file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// A directory on disk, typically inside a synced folder.
    #[default]
    Localdir,
    /// A WebDAV-style HTTP server.
    Http,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Localdir => write!(f, "localdir"),
            ProviderKind::Http => write!(f, "http"),
        }
    }
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Directory holding the sync file (localdir provider)
    #[serde(default)]
    pub remote_dir: Option<PathBuf>,
    /// Server URL (http provider), e.g. "https://dav.example.com/backups"
    #[serde(default)]
    pub server_url: Option<String>,
    /// API key for authentication (http provider)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Name of the remote file
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Pull remote changes before read commands (default: false)
    #[serde(default)]
    pub auto_sync: bool,
}

fn default_file_name() -> String {
    DEFAULT_FILE_NAME.to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            remote_dir: None,
            server_url: None,
            api_key: None,
            file_name: default_file_name(),
            auto_sync: false,
        }
    }
}

impl SyncConfig {
    /// Returns true if the selected provider has what it needs to reach the remote.
    pub fn is_configured(&self) -> bool {
        match self.provider {
            ProviderKind::Localdir => self.remote_dir.is_some(),
            ProviderKind::Http => self.server_url.is_some() && self.api_key.is_some(),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Human-readable name of this device
    pub device_name: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
    /// Encryption passphrase, only ever read from the environment
    #[serde(skip)]
    pub passphrase: Option<String>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    device_name: Option<String>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let default_db_path = Self::default_data_dir().join("resync.db");

        let mut database_path = ConfigValue::new(default_db_path, ConfigSource::Default);
        let mut device_name = ConfigValue::new(default_device_name(), ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                database_path =
                    ConfigValue::new(resolve_relative(&path, db_path), ConfigSource::File);
            }
            if let Some(name) = file_config.device_name {
                device_name = ConfigValue::new(name, ConfigSource::File);
            }
            if let Some(mut sync_config) = file_config.sync {
                sync_config.remote_dir = sync_config
                    .remote_dir
                    .map(|dir| resolve_relative(&path, dir));
                sync = sync_config;
            }
        }

        if let Ok(db_path) = std::env::var("RESYNC_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(dir) = std::env::var("RESYNC_SYNC_DIR") {
            sync.provider = ProviderKind::Localdir;
            sync.remote_dir = Some(PathBuf::from(dir));
        }
        if let Ok(url) = std::env::var("RESYNC_SYNC_URL") {
            sync.provider = ProviderKind::Http;
            sync.server_url = Some(url);
        }
        if let Ok(key) = std::env::var("RESYNC_SYNC_API_KEY") {
            sync.api_key = Some(key);
        }
        let passphrase = std::env::var("RESYNC_PASSPHRASE")
            .ok()
            .filter(|p| !p.is_empty());

        Ok(Self {
            database_path,
            device_name,
            config_file,
            sync,
            passphrase,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/resync/
    /// - macOS: ~/Library/Application Support/resync/
    /// - Windows: %APPDATA%/resync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/resync/
    /// - macOS: ~/Library/Application Support/resync/
    /// - Windows: %APPDATA%/resync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Relative paths in the config file are relative to the file itself.
fn resolve_relative(config_path: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        config_path
            .parent()
            .map(|p| p.join(&path))
            .unwrap_or(path)
    } else {
        path
    }
}

fn default_device_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "this device".to_string())
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
