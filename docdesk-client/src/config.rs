//! Client configuration.
//!
//! Settings come from, in increasing precedence:
//! 1. Built-in defaults
//! 2. `config.toml` in the platform config directory (or an explicit path)
//! 3. `DOCDESK_BASE_URL` and `DOCDESK_LOG_LEVEL`
//!
//! ```toml
//! base_url = "https://docs.example.com/api"
//! request_timeout_secs = 10
//! refresh_timeout_secs = 10
//! vault = "keyring"
//! keyring_service = "docdesk"
//! log_level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const ENV_BASE_URL: &str = "DOCDESK_BASE_URL";
pub const ENV_LOG_LEVEL: &str = "DOCDESK_LOG_LEVEL";

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to parse config: {message}")]
    Parse { message: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Where the durable refresh cookie is kept between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultBackend {
    /// Process memory only; every run starts signed out.
    Memory,
    /// OS keyring, falling back to memory when unavailable.
    #[default]
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root, for example `https://docs.example.com/api`.
    pub base_url: String,

    pub request_timeout_secs: u64,

    pub refresh_timeout_secs: u64,

    pub vault: VaultBackend,

    /// Keyring service name the refresh cookie is stored under.
    pub keyring_service: String,

    /// Logging level.
    pub log_level: String,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 10,
            refresh_timeout_secs: 10,
            vault: VaultBackend::default(),
            keyring_service: "docdesk".to_string(),
            log_level: "info".to_string(),
            config_path: None,
        }
    }
}

impl ClientConfig {
    /// Default location of `config.toml`, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|d| d.config_dir().join("config.toml"))
    }

    /// Load configuration, apply environment overrides, and validate.
    ///
    /// An explicit `path` must exist. The default path is optional; when it
    /// is missing the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            message: format!("{:?}: {}", path, e),
        })?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Override settings from environment-style lookups.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = base_url;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "request_timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.refresh_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "refresh_timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.vault == VaultBackend::Keyring && self.keyring_service.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "keyring_service must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Parsed API root. Must be an absolute `http` or `https` URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::Invalid {
            message: format!("base_url {:?} is not a valid URL: {}", self.base_url, e),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::Invalid {
                message: format!("base_url must use http or https, not {}", other),
            }),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "docdesk", "docdesk")
}
