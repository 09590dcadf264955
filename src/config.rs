//! Configuration System
//!
//! Loads configuration from TOML files and environment variables.
//! Environment variables override file settings.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub timeline: TimelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Index building and query configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Directory holding index stores
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// How many times per second the indexer commits and reports progress
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate_hz: u32,

    /// Maximum instants memoized per index; 0 means unbounded
    #[serde(default = "default_instant_cache_limit")]
    pub instant_cache_limit: usize,

    /// Buffered notifications per subscriber before the oldest are dropped
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_data_dir() -> String {
    dirs::cache_dir()
        .map(|p| p.join("tracedex").to_string_lossy().to_string())
        .unwrap_or_else(|| "./tracedex_data".to_string())
}

fn default_refresh_rate() -> u32 {
    60
}

fn default_instant_cache_limit() -> usize {
    4096
}

fn default_event_capacity() -> usize {
    64
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            refresh_rate_hz: default_refresh_rate(),
            instant_cache_limit: default_instant_cache_limit(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl IndexConfig {
    /// Defaults with stores kept in `data_dir`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_string_lossy().to_string(),
            ..Self::default()
        }
    }

    /// Directory holding index stores, with a leading `~` expanded
    pub fn data_path(&self) -> PathBuf {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.data_dir)),
            None => PathBuf::from(&self.data_dir),
        }
    }

    /// Wall-clock budget between indexer commits
    pub fn commit_interval(&self) -> Duration {
        Duration::from_secs(1) / self.refresh_rate_hz.max(1)
    }
}

/// Timeline sampling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineConfig {
    /// Clock ticks per column
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Columns kept in the sample cache
    #[serde(default = "default_timeline_capacity")]
    pub capacity: usize,
}

fn default_interval() -> u64 {
    1000
}

fn default_timeline_capacity() -> usize {
    2048
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            capacity: default_timeline_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("tracedex").join("config.toml")),
            Some(PathBuf::from("/etc/tracedex/config.toml")),
            Some(PathBuf::from("./tracedex.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.index.refresh_rate_hz == 0 {
            return Err(ConfigError::Invalid(
                "index.refresh_rate_hz must be at least 1".to_string(),
            ));
        }
        if self.timeline.interval == 0 {
            return Err(ConfigError::Invalid(
                "timeline.interval must be at least 1".to_string(),
            ));
        }
        if self.timeline.capacity == 0 {
            return Err(ConfigError::Invalid(
                "timeline.capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("TRACEDEX_DATA_DIR") {
            self.index.data_dir = data_dir;
        }
        if let Ok(rate) = std::env::var("TRACEDEX_REFRESH_RATE_HZ") {
            match rate.parse::<u32>() {
                Ok(r) if r > 0 => self.index.refresh_rate_hz = r,
                _ => tracing::warn!("Ignoring invalid TRACEDEX_REFRESH_RATE_HZ={:?}", rate),
            }
        }

        if let Ok(level) = std::env::var("TRACEDEX_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TRACEDEX_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for crate::error::IndexError {
    fn from(e: ConfigError) -> Self {
        crate::error::IndexError::Config(e.to_string())
    }
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Tracedex Configuration
#
# Environment variables override these settings:
# - TRACEDEX_DATA_DIR
# - TRACEDEX_REFRESH_RATE_HZ
# - TRACEDEX_LOG_LEVEL
# - TRACEDEX_LOG_FORMAT

[index]
# Directory for index stores (one .tdx file per trace log)
data_dir = "~/.cache/tracedex"

# Indexer commits and progress updates per second
refresh_rate_hz = 60

# Instants memoized per open index (0 = unbounded)
instant_cache_limit = 4096

# Notifications buffered per subscriber
event_capacity = 64

[timeline]
# Clock ticks per timeline column
interval = 1000

# Columns kept in the sample cache
capacity = 2048

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/tracedex/tracedex.log"
"#
    .to_string()
}
