//! Configuration loading and root folder resolution
//!
//! Bootstrap settings come from a TOML file. Individual values can be
//! overridden, highest priority first, by:
//! 1. Command-line argument
//! 2. Environment variable (`LEADFLOW_*`)
//! 3. TOML config file
//! 4. Built-in default

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the root folder
pub const ROOT_FOLDER_ENV: &str = "LEADFLOW_ROOT_FOLDER";

/// Environment variable pointing at an explicit config file
pub const CONFIG_FILE_ENV: &str = "LEADFLOW_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the database and local marker files
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit SQLite database path (defaults to `<root>/leadflow.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Default tenant when a request does not name one
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Reconciliation poller tick interval
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound on rows fetched per source and tenant
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,

    /// Per-source fetch timeout
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Local fallback file for processed markers (defaults to `<root>/processed_markers.json`)
    #[serde(default)]
    pub marker_file: Option<PathBuf>,

    /// Remote data API; when absent the local SQLite store is the source
    #[serde(default)]
    pub remote: Option<RemoteConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// PostgREST-style remote data API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_path: None,
            port: default_port(),
            tenant_id: None,
            poll_interval_secs: default_poll_interval_secs(),
            fetch_limit: default_fetch_limit(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            marker_file: None,
            remote: None,
            logging: LoggingConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    5780
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_fetch_limit() -> u32 {
    1000
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load from the first config file found, or fall back to defaults
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            return Self::load(Path::new(&path));
        }
        match find_config_file() {
            Some(path) => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            None => {
                tracing::info!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Apply `LEADFLOW_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("LEADFLOW_PORT") {
            self.port = v
                .parse()
                .map_err(|e| Error::Config(format!("Invalid LEADFLOW_PORT: {}", e)))?;
        }
        if let Ok(v) = std::env::var("LEADFLOW_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = v
                .parse()
                .map_err(|e| Error::Config(format!("Invalid LEADFLOW_POLL_INTERVAL_SECS: {}", e)))?;
        }
        if let Ok(v) = std::env::var("LEADFLOW_TENANT_ID") {
            self.tenant_id = Some(v);
        }
        if let Ok(v) = std::env::var("LEADFLOW_DATABASE") {
            self.database_path = Some(PathBuf::from(v));
        }
        if let (Ok(base_url), Ok(api_key)) = (
            std::env::var("LEADFLOW_REMOTE_URL"),
            std::env::var("LEADFLOW_REMOTE_API_KEY"),
        ) {
            self.remote = Some(RemoteConfig { base_url, api_key });
        }
        self.validate()
    }

    /// Reject values that would make the service misbehave
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be greater than 0".to_string()));
        }
        if self.fetch_limit == 0 {
            return Err(Error::Config("fetch_limit must be greater than 0".to_string()));
        }
        if let Some(remote) = &self.remote {
            if remote.base_url.trim().is_empty() {
                return Err(Error::Config("remote.base_url cannot be empty".to_string()));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Database path: explicit setting or `<root>/leadflow.db`
    pub fn database_path(&self, root: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| root.join("leadflow.db"))
    }

    /// Local marker file: explicit setting or `<root>/processed_markers.json`
    pub fn marker_file(&self, root: &Path) -> PathBuf {
        self.marker_file
            .clone()
            .unwrap_or_else(|| root.join("processed_markers.json"))
    }
}

/// Root folder resolution:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        return PathBuf::from(path);
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// First existing config file among the platform locations
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("leadflow").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/leadflow/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder
fn get_default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("leadflow"))
        .unwrap_or_else(|| PathBuf::from("./leadflow_data"))
}

/// Create the root folder if it does not exist yet
pub fn ensure_root_folder(root: &Path) -> Result<()> {
    if !root.exists() {
        std::fs::create_dir_all(root)?;
        tracing::info!("Created root folder: {}", root.display());
    }
    Ok(())
}
