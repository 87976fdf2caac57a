//! Client configuration
//!
//! Loaded from `<config_dir>/parley/config.toml` (or an explicit path), then
//! overridden by `PARLEY_*` environment variables. A missing file is not an
//! error; every field has a default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// How a send without a conversation id gets one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationCreation {
    /// Create the conversation before sending
    #[default]
    Eager,
    /// Let the server assign the id through the stream
    Deferred,
}

/// Conversation context stamped on every created conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContext {
    pub service_code: Option<String>,
    pub provider_id: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Root of the console API; resource paths are joined onto it
    pub base_url: String,
    pub service_code: Option<String>,
    pub provider_id: Option<String>,
    pub model: Option<String>,
    pub connect_timeout_secs: u64,
    pub conversation_creation: ConversationCreation,
    /// Where the session token is persisted
    pub token_path: PathBuf,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            service_code: None,
            provider_id: None,
            model: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            conversation_creation: ConversationCreation::default(),
            token_path: config_root().join("token.json"),
        }
    }
}

fn config_root() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parley")
}

impl ConsoleConfig {
    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        config_root().join("config.toml")
    }

    /// Load from `path` (or the default location) and apply env overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse config file: {config_path:?}"))?
        } else {
            debug!("No config file at {:?}, using defaults", config_path);
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override fields from `PARLEY_*` variables, looked up through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PARLEY_BASE_URL") {
            self.base_url = url;
        }
        if let Some(code) = lookup("PARLEY_SERVICE_CODE") {
            self.service_code = Some(code);
        }
        if let Some(provider) = lookup("PARLEY_PROVIDER_ID") {
            self.provider_id = Some(provider);
        }
        if let Some(model) = lookup("PARLEY_MODEL") {
            self.model = Some(model);
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn service_context(&self) -> ServiceContext {
        ServiceContext {
            service_code: self.service_code.clone(),
            provider_id: self.provider_id.clone(),
            model: self.model.clone(),
        }
    }
}
