//! Layered configuration: built-in defaults, then a TOML file, then the
//! environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use coordination::escalation::EscalationConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CHEAP_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_CHEAP_MODEL: &str = "deepseek-chat";
pub const DEFAULT_SMART_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_SMART_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_SANDBOX_URL: &str = "https://api.e2b.dev";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("missing API key for the {component}; set {var}")]
    MissingKey {
        component: &'static str,
        var: &'static str,
    },

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// An OpenAI-compatible completion endpoint for one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierEndpoint {
    pub url: String,
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

/// REST sandbox used to run candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxEndpoint {
    pub url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

/// Top-level healer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealerConfig {
    pub cheap: TierEndpoint,
    pub smart: TierEndpoint,
    pub sandbox: SandboxEndpoint,
    pub generation_timeout_secs: u64,
    pub validation_timeout_secs: u64,
    /// JSON fix memory location.
    pub memory_path: PathBuf,
    pub cheap_cost: f64,
    pub smart_cost: f64,
}

impl Default for HealerConfig {
    fn default() -> Self {
        let escalation = EscalationConfig::default();
        Self {
            cheap: TierEndpoint {
                url: DEFAULT_CHEAP_URL.into(),
                model: DEFAULT_CHEAP_MODEL.into(),
                api_key: None,
            },
            smart: TierEndpoint {
                url: DEFAULT_SMART_URL.into(),
                model: DEFAULT_SMART_MODEL.into(),
                api_key: None,
            },
            sandbox: SandboxEndpoint {
                url: DEFAULT_SANDBOX_URL.into(),
                api_key: None,
            },
            generation_timeout_secs: escalation.generation_timeout.as_secs(),
            validation_timeout_secs: escalation.validation_timeout.as_secs(),
            memory_path: Self::home_dir()
                .unwrap_or_else(|| PathBuf::from(".timealready"))
                .join("memory.json"),
            cheap_cost: escalation.cheap_cost,
            smart_cost: escalation.smart_cost,
        }
    }
}

impl HealerConfig {
    /// `~/.timealready`, when a home directory exists.
    pub fn home_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".timealready"))
    }

    /// Load `.env` from the working directory, then `~/.timealready/.env`.
    /// Variables already set are never overridden.
    pub fn load_dotenv() {
        if let Ok(path) = dotenv::dotenv() {
            debug!(path = %path.display(), "Loaded .env");
        }
        if let Some(path) = Self::home_dir().map(|d| d.join(".env")) {
            if path.exists() && dotenv::from_path(&path).is_ok() {
                debug!(path = %path.display(), "Loaded .env");
            }
        }
    }

    /// Defaults, then `explicit` (or `~/.timealready/config.toml` when
    /// present), then the process environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::home_dir()
                .map(|d| d.join("config.toml"))
                .filter(|p| p.exists()),
        };

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment-style overrides from `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("TIMEALREADY_CHEAP_URL") {
            self.cheap.url = v;
        }
        if let Some(v) = lookup("TIMEALREADY_CHEAP_MODEL") {
            self.cheap.model = v;
        }
        if let Some(v) = lookup("TIMEALREADY_SMART_URL") {
            self.smart.url = v;
        }
        if let Some(v) = lookup("TIMEALREADY_SMART_MODEL") {
            self.smart.model = v;
        }
        if let Some(v) = lookup("TIMEALREADY_SMART_API_KEY") {
            self.smart.api_key = Some(v);
        }
        if let Some(v) = lookup("TIMEALREADY_API_KEY") {
            if self.smart.api_key.is_none() {
                self.smart.api_key = Some(v.clone());
            }
            self.cheap.api_key = Some(v);
        }
        if let Some(v) = lookup("TIMEALREADY_SANDBOX_URL") {
            self.sandbox.url = v;
        }
        if let Some(v) = lookup("E2B_API_KEY").or_else(|| lookup("E2B_API_TOKEN")) {
            self.sandbox.api_key = Some(v);
        }
        if let Some(v) = lookup("TIMEALREADY_GENERATION_TIMEOUT_SECS") {
            self.generation_timeout_secs = parse_secs("TIMEALREADY_GENERATION_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("TIMEALREADY_VALIDATION_TIMEOUT_SECS") {
            self.validation_timeout_secs = parse_secs("TIMEALREADY_VALIDATION_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("TIMEALREADY_MEMORY_PATH") {
            self.memory_path = PathBuf::from(v);
        }
        Ok(())
    }

    /// Check that every remote collaborator can be reached with credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cheap.api_key.is_none() {
            return Err(ConfigError::MissingKey {
                component: "cheap tier",
                var: "TIMEALREADY_API_KEY",
            });
        }
        if self.smart.api_key.is_none() {
            return Err(ConfigError::MissingKey {
                component: "smart tier",
                var: "TIMEALREADY_SMART_API_KEY",
            });
        }
        if self.sandbox.api_key.is_none() {
            return Err(ConfigError::MissingKey {
                component: "sandbox",
                var: "E2B_API_KEY",
            });
        }
        if self.generation_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("generation_timeout_secs"));
        }
        if self.validation_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("validation_timeout_secs"));
        }
        Ok(())
    }

    pub fn escalation(&self) -> EscalationConfig {
        EscalationConfig {
            cheap_cost: self.cheap_cost,
            smart_cost: self.smart_cost,
            generation_timeout: Duration::from_secs(self.generation_timeout_secs),
            validation_timeout: Duration::from_secs(self.validation_timeout_secs),
        }
    }
}

fn parse_secs(var: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
