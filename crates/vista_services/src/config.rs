//! Service configuration
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment: `VISTA_SERVER_URL`, `VISTA_USER`, `VISTA_AUTH_TOKEN`,
//!    `VISTA_SYNC_INTERVAL_MS`
//! 2. An explicit config file passed to [`ServiceConfig::load`]
//! 3. `vista.toml` in the working directory
//! 4. Built-in defaults
//!
//! # Example Config File
//!
//! ```toml
//! [server]
//! url = "wss://scenes.example.com/api"
//! user_name = "surveyor"
//! request_timeout_ms = 10000
//!
//! [sync]
//! interval_ms = 1000
//! max_pending_messages = 256
//!
//! [store]
//! pretty_documents = true
//! strict_release = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vista_core::SceneError;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "vista.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

impl From<ConfigError> for SceneError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Io { path, source } => SceneError::ReadFailure {
                path: path.display().to_string(),
                reason: source.to_string(),
            },
            ConfigError::Parse(e) => SceneError::parse(e.to_string()),
            ConfigError::Invalid(msg) => SceneError::invalid(msg),
        }
    }
}

/// Remote scene server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket endpoint of the scene server
    pub url: String,
    /// Display name reported to other collaborators
    pub user_name: String,
    /// Optional bearer token sent at login
    pub auth_token: Option<String>,
    pub connect_timeout_ms: u64,
    /// Deadline for each request, including sync ticks
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9400".to_string(),
            user_name: "vista".to_string(),
            auth_token: None,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Collaboration tick settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum time between two non-forced ticks
    pub interval_ms: u64,
    /// Outbound messages held before `queue_message` refuses more
    pub max_pending_messages: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            max_pending_messages: 256,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Persistence settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Indent documents written to memory and files
    pub pretty_documents: bool,
    /// Refuse to release a scene while nodes still hold user data
    pub strict_release: bool,
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub store: StoreConfig,
}

impl ServiceConfig {
    /// Load configuration from all sources
    ///
    /// An explicit `path` must exist. Without one, `vista.toml` is used if it
    /// is present. Environment overrides are applied last and the result is
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `VISTA_*` overrides looked up through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("VISTA_SERVER_URL").filter(|v| !v.is_empty()) {
            log::info!("Server URL from env: {}", url);
            self.server.url = url;
        }
        if let Some(user) = lookup("VISTA_USER").filter(|v| !v.is_empty()) {
            self.server.user_name = user;
        }
        if let Some(token) = lookup("VISTA_AUTH_TOKEN").filter(|v| !v.is_empty()) {
            self.server.auth_token = Some(token);
        }
        if let Some(interval) = lookup("VISTA_SYNC_INTERVAL_MS") {
            match interval.parse() {
                Ok(ms) => self.sync.interval_ms = ms,
                Err(_) => log::warn!("Ignoring VISTA_SYNC_INTERVAL_MS={:?}", interval),
            }
        }
    }

    /// Reject values that would make the services unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.connect_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.sync.max_pending_messages == 0 {
            return Err(ConfigError::Invalid(
                "sync.max_pending_messages must be greater than zero".into(),
            ));
        }
        url::Url::parse(&self.server.url)
            .map_err(|e| ConfigError::Invalid(format!("server.url: {}", e)))?;
        Ok(())
    }
}
