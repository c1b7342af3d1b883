use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{RecordXmlEscaping, SruVersion};

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ClientConfig {
    pub network: NetworkConfig,
    pub protocol: ProtocolConfig,
    pub pool: PoolConfig,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts for failed requests
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds (for exponential backoff cap)
    pub max_retry_delay_ms: u64,
    /// User agent string
    pub user_agent: String,
}

/// Protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Version used for requests that do not name one
    pub default_version: SruVersion,
    /// Treat protocol etiquette violations as errors
    pub strict_mode: bool,
    /// Record escaping requested when a request does not name one
    pub default_record_xml_escaping: RecordXmlEscaping,
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads
    pub threads: Option<usize>,
    /// Maximum number of queued requests
    pub queue_capacity: usize,
}

impl NetworkConfig {
    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Delay before the first retry
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Upper bound for the backoff delay
    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
            user_agent: format!("sru-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            default_version: SruVersion::V1_2,
            strict_mode: false,
            default_record_xml_escaping: RecordXmlEscaping::Xml,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: None,
            queue_capacity: 1024,
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment
    pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
        let mut config = ClientConfig::default();

        if let Some(config_path) = path {
            let file_config = Self::load_from_file(config_path)?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file()? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides(config)?;

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub fn load_from_file(path: &Path) -> Result<ClientConfig> {
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => {
                let config: ClientConfig = toml::from_str(&content)?;
                Ok(config)
            }
            Some("json") => {
                let config: ClientConfig = serde_json::from_str(&content)?;
                Ok(config)
            }
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<ClientConfig>(&content) {
                    Ok(config)
                } else {
                    let config: ClientConfig = serde_json::from_str(&content)?;
                    Ok(config)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Result<Option<ClientConfig>> {
        let config_names = [
            "sru-client.toml",
            "sru-client.json",
            ".sru-client.toml",
            ".sru-client.json",
        ];

        // Check current directory first
        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path)?));
            }
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("sru-client");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path)?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: ClientConfig) -> Result<ClientConfig> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: ClientConfig,
    ) -> Result<ClientConfig> {
        // Network settings
        if let Some(timeout) = env.get("SRU_CLIENT_TIMEOUT") {
            config.network.timeout_seconds = timeout.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid SRU_CLIENT_TIMEOUT value: {}", timeout))
            })?;
        }

        if let Some(retry_attempts) = env.get("SRU_CLIENT_RETRY_ATTEMPTS") {
            config.network.retry_attempts = retry_attempts.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid SRU_CLIENT_RETRY_ATTEMPTS value: {}",
                    retry_attempts
                ))
            })?;
        }

        if let Some(user_agent) = env.get("SRU_CLIENT_USER_AGENT") {
            config.network.user_agent = user_agent;
        }

        // Protocol settings
        if let Some(version) = env.get("SRU_CLIENT_VERSION") {
            config.protocol.default_version = SruVersion::parse(&version).ok_or_else(|| {
                ConfigError::Environment(format!("Invalid SRU_CLIENT_VERSION value: {}", version))
            })?;
        }

        if let Some(strict) = env.get("SRU_CLIENT_STRICT") {
            config.protocol.strict_mode = strict.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid SRU_CLIENT_STRICT value: {}", strict))
            })?;
        }

        if let Some(escaping) = env.get("SRU_CLIENT_RECORD_ESCAPING") {
            config.protocol.default_record_xml_escaping =
                RecordXmlEscaping::parse(&escaping.to_lowercase()).ok_or_else(|| {
                    ConfigError::Environment(format!(
                        "Invalid SRU_CLIENT_RECORD_ESCAPING value: {}",
                        escaping
                    ))
                })?;
        }

        // Pool settings
        if let Some(threads) = env.get("SRU_CLIENT_THREADS") {
            config.pool.threads = Some(threads.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid SRU_CLIENT_THREADS value: {}", threads))
            })?);
        }

        if let Some(capacity) = env.get("SRU_CLIENT_QUEUE_CAPACITY") {
            config.pool.queue_capacity = capacity.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid SRU_CLIENT_QUEUE_CAPACITY value: {}",
                    capacity
                ))
            })?;
        }

        Ok(config)
    }

    /// Merge two configurations (second takes precedence for non-None values)
    pub fn merge_configs(mut base: ClientConfig, override_config: ClientConfig) -> ClientConfig {
        // Network settings
        base.network = override_config.network;

        // Protocol settings
        base.protocol = override_config.protocol;

        // Pool settings
        if override_config.pool.threads.is_some() {
            base.pool.threads = override_config.pool.threads;
        }
        base.pool.queue_capacity = override_config.pool.queue_capacity;

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &ClientConfig) -> Result<()> {
        // Validate threads
        if let Some(threads) = config.pool.threads {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of threads must be greater than 0".to_string(),
                ));
            }
            if threads > 1000 {
                return Err(ConfigError::Validation(
                    "Number of threads cannot exceed 1000".to_string(),
                ));
            }
        }

        if config.pool.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        // Validate network settings
        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if config.network.retry_attempts > 10 {
            return Err(ConfigError::Validation(
                "Retry attempts cannot exceed 10".to_string(),
            ));
        }

        if config.network.retry_delay_ms > config.network.max_retry_delay_ms {
            return Err(ConfigError::Validation(
                "Retry delay cannot exceed the maximum retry delay".to_string(),
            ));
        }

        if config.network.user_agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "User agent must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the effective thread count
    pub fn get_thread_count(config: &ClientConfig) -> usize {
        config.pool.threads.unwrap_or_else(num_cpus::get)
    }
}
