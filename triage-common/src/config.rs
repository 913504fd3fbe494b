//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a small TOML file. Every field has a
//! compiled default, so a missing or partial file never prevents startup.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `TRIAGE_ROOT_FOLDER` environment variable
//! 3. `root_folder` in the TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::record::RecordId;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "TRIAGE_ROOT_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "TRIAGE_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "triage.db";

/// Built-in defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub port: u16,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = if cfg!(target_os = "linux") {
            // ~/.local/share/triage
            dirs::data_local_dir()
                .map(|d| d.join("triage"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/triage"))
        } else if cfg!(target_os = "macos") {
            dirs::data_dir()
                .map(|d| d.join("triage"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/triage"))
        } else if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("triage"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\triage"))
        } else {
            PathBuf::from("./triage_data")
        };

        Self {
            root_folder,
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

/// Remote tracking server the replica mirrors
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host name, without scheme
    #[serde(default)]
    pub host: String,

    /// Product whose records are synced
    #[serde(default)]
    pub product: String,

    #[serde(default)]
    pub use_ssl: bool,
}

impl ServerConfig {
    /// Browser URL of a record on the remote server
    pub fn record_url(&self, id: RecordId) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}/show_bug.cgi?id={}", scheme, self.host, id)
    }
}

/// Sync tuning
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    /// Concurrent status x severity fetch groups
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// High/Medium/Low levels applied after the initial sync
    #[serde(default = "default_initial_levels")]
    pub initial_levels: [usize; 3],
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            initial_levels: default_initial_levels(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
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

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TomlConfig {
    /// Root folder for the database and fixtures
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database path; defaults to `<root>/triage.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// JSON fixture served as the remote record source
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            database_path: None,
            fixture_path: None,
            server: ServerConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load a config file, falling back to defaults when it is missing
    ///
    /// A file that exists but fails to parse is still an error. The origin
    /// is logged immediately; callers that install their subscriber from the
    /// loaded config use [`TomlConfig::load_with_origin`] instead.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let (config, origin) = Self::load_with_origin(path)?;
        origin.log();
        Ok(config)
    }

    /// Like [`TomlConfig::load_or_default`], but returns where the config
    /// came from instead of logging it
    pub fn load_with_origin(path: Option<&Path>) -> Result<(Self, ConfigOrigin)> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return Ok((Self::default(), ConfigOrigin::NoConfigDir)),
            },
        };

        if !path.exists() {
            return Ok((Self::default(), ConfigOrigin::Missing(path)));
        }

        let config = Self::load(&path)?;
        Ok((config, ConfigOrigin::File(path)))
    }

    fn validate(&self) -> Result<()> {
        if self.sync.max_concurrent_fetches == 0 {
            return Err(Error::Config(
                "sync.max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        let [high, medium, low] = self.sync.initial_levels;
        if high > medium || medium > low {
            return Err(Error::Config(format!(
                "sync.initial_levels must be non-decreasing, got [{}, {}, {}]",
                high, medium, low
            )));
        }
        Ok(())
    }

    /// Database path, relative to `root_folder` when not absolute
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        match &self.database_path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => root_folder.join(p),
            None => root_folder.join(DATABASE_FILE),
        }
    }
}

/// Default configuration file path for the platform
///
/// `TRIAGE_CONFIG` wins over the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("triage").join("config.toml"))
}

/// Where a loaded [`TomlConfig`] came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Parsed from this file
    File(PathBuf),
    /// File does not exist; defaults in use
    Missing(PathBuf),
    /// No config directory on this platform; defaults in use
    NoConfigDir,
}

impl ConfigOrigin {
    pub fn is_default(&self) -> bool {
        !matches!(self, ConfigOrigin::File(_))
    }

    /// Report the origin, warning when defaults are in use
    pub fn log(&self) {
        match self {
            ConfigOrigin::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigOrigin::Missing(path) => {
                warn!("Config file not found: {} (using defaults)", path.display())
            }
            ConfigOrigin::NoConfigDir => {
                warn!("Could not determine config directory, using defaults")
            }
        }
    }
}

/// Resolves the root folder using the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_value: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_value = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("[{}] Root folder from command line: {}", self.module_name, path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                info!("[{}] Root folder from {}: {}", self.module_name, ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            info!("[{}] Root folder from config file: {}", self.module_name, path.display());
            return path.clone();
        }

        let path = CompiledDefaults::for_current_platform().root_folder;
        info!("[{}] Root folder from compiled default: {}", self.module_name, path.display());
        path
    }
}

/// Create the root folder if it does not exist yet
pub fn ensure_root_folder(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created root folder: {}", path.display());
    }
    Ok(())
}

fn default_port() -> u16 {
    5790
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_initial_levels() -> [usize; 3] {
    [20, 40, 60]
}
