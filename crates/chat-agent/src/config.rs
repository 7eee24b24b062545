use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use etcetera::{choose_app_strategy, AppStrategy, AppStrategyArgs};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ServerDescriptor;
use crate::session::SessionLimits;

pub static APP_STRATEGY: Lazy<AppStrategyArgs> = Lazy::new(|| AppStrategyArgs {
    top_level_domain: "Community".to_string(),
    author: "Compute Community".to_string(),
    app_name: "chat-agent".to_string(),
});

pub const CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_HOST: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

pub const HOST_ENV: &str = "CHAT_AGENT_HOST";
pub const MODEL_ENV: &str = "CHAT_AGENT_MODEL";
pub const API_KEY_ENV: &str = "CHAT_AGENT_API_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine the config directory: {0}")]
    NoHomeDir(String),
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config file {path}: {source}")]
    FileError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    DeserializeError(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub host: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_rounds: usize,
    pub connect_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub model_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_rounds: 15,
            connect_timeout_secs: 30,
            tool_timeout_secs: 100,
            model_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub servers: Vec<ServerDescriptor>,
    pub limits: LimitsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            servers: vec![ServerDescriptor::new("weather", "http://localhost:1337/sse")],
            limits: LimitsConfig::default(),
        }
    }
}

impl Config {
    /// `~/.config/chat-agent/config.yaml` on Linux and macOS.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let strategy = choose_app_strategy(APP_STRATEGY.clone())
            .map_err(|e| ConfigError::NoHomeDir(e.to_string()))?;
        Ok(strategy.config_dir().join(CONFIG_FILE))
    }

    /// Load the config file, then apply environment overrides.
    ///
    /// An explicit path must exist; a missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    tracing::debug!(path = %path.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };

        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = env::var(HOST_ENV) {
            self.provider.host = host;
        }
        if let Ok(model) = env::var(MODEL_ENV) {
            self.provider.model = model;
        }
        if let Ok(key) = env::var(API_KEY_ENV) {
            self.provider.api_key = Some(key).filter(|key| !key.is_empty());
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.host.trim().is_empty() {
            return Err(ConfigError::Invalid("provider.host is empty".to_string()));
        }
        if self.limits.max_rounds == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_rounds must be at least 1".to_string(),
            ));
        }
        if self.limits.connect_timeout_secs == 0
            || self.limits.tool_timeout_secs == 0
            || self.limits.model_timeout_secs == 0
        {
            return Err(ConfigError::Invalid("timeouts must be non-zero".to_string()));
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.name.is_empty() {
                return Err(ConfigError::Invalid("server name is empty".to_string()));
            }
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate server name {}",
                    server.name
                )));
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.connect_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.tool_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.model_timeout_secs)
    }

    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_rounds: self.limits.max_rounds,
            model_timeout: self.model_timeout(),
        }
    }
}
