//! Configuration system for extcap-host
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard paths)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Helper and pipe directory resolution

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default prefix of capture channel names
pub const DEFAULT_PIPE_PREFIX: &str = "extcap_host";

/// Application directory name used under the platform config/data dirs
const APP_DIR: &str = "extcap-host";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Host settings
    pub host: HostSettings,

    /// Helper discovery settings
    pub helpers: HelperSettings,

    /// Capture channel settings
    pub pipes: PipeSettings,
}

/// Host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Helper discovery settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperSettings {
    /// Directory scanned for capture helpers
    pub directory: Option<PathBuf>,
}

impl HelperSettings {
    /// Configured directory, or the platform default
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(ConfigLoader::default_helper_dir)
    }
}

/// Capture channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeSettings {
    /// Directory for FIFOs (ignored for Windows named pipes)
    pub directory: Option<PathBuf>,

    /// Fixed name prefix of every channel
    pub prefix: String,
}

impl Default for PipeSettings {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: DEFAULT_PIPE_PREFIX.to_string(),
        }
    }
}

impl PipeSettings {
    /// Configured directory, or the system temp dir
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Configuration loader
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. CLI --config flag
    /// 2. EXTCAP_HOST_CONFIG environment variable
    /// 3. ~/.config/extcap-host/config.toml
    /// 4. /etc/extcap-host/config.toml
    /// 5. Default values
    pub fn load(&self) -> ConfigResult<HostConfig> {
        let config_path = self.find_config_file();

        let mut config = if let Some(path) = config_path {
            info!("Loading configuration from: {}", path.display());
            self.load_from_file(&path)?
        } else {
            debug!("No config file found, using defaults");
            HostConfig::default()
        };

        self.apply_env_overrides(&mut config);
        self.validate(&config)?;

        Ok(config)
    }

    /// Find the config file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("CLI config path does not exist: {}", path.display());
        }

        if let Ok(env_path) = std::env::var("EXTCAP_HOST_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("EXTCAP_HOST_CONFIG path does not exist: {}", env_path);
        }

        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Some(path);
            }
        }

        #[cfg(unix)]
        {
            let path = PathBuf::from("/etc").join(APP_DIR).join("config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Load configuration from a TOML file
    fn load_from_file(&self, path: &Path) -> ConfigResult<HostConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: HostConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut HostConfig) {
        if let Ok(val) = std::env::var("EXTCAP_HOST_LOG_LEVEL") {
            config.host.log_level = val;
        }
        if let Ok(val) = std::env::var("EXTCAP_HOST_HELPER_DIR") {
            config.helpers.directory = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("EXTCAP_HOST_PIPE_DIR") {
            config.pipes.directory = Some(PathBuf::from(val));
        }
    }

    /// Validate configuration
    fn validate(&self, config: &HostConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.host.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.host.log_level, valid_levels
            )));
        }

        let prefix = &config.pipes.prefix;
        if prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "Pipe prefix cannot be empty".to_string(),
            ));
        }
        if prefix.contains(['/', '\\']) {
            return Err(ConfigError::ValidationError(format!(
                "Pipe prefix must not contain path separators: {}",
                prefix
            )));
        }

        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, config: &HostConfig, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| {
            ConfigError::ValidationError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Get the default config file path for the current platform
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    /// Default helper directory: `<data_local_dir>/extcap-host/extcap`
    pub fn default_helper_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR).join("extcap"))
            .unwrap_or_else(|| PathBuf::from("extcap"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
