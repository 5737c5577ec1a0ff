use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::provider::SubprocessConfig;
use crate::relay::RelayConfig;
use crate::session::ReconnectPolicy;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub relay: RelaySettings,
}

impl Config {
    /// Load from a YAML file (missing file means defaults), then apply
    /// environment overrides.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path).await?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    async fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Apply `PORT`, `SESSION_DATA_DIR` and `WEBHOOK_URL` overrides.
    ///
    /// An empty `WEBHOOK_URL` disables the relay.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "PORT",
                value: port,
            })?;
        }
        if let Some(dir) = lookup("SESSION_DATA_DIR").filter(|d| !d.is_empty()) {
            self.session.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("WEBHOOK_URL") {
            let url = url.trim();
            self.relay.webhook_url = (!url.is_empty()).then(|| url.to_string());
        }
        Ok(())
    }

    /// Parsed and checked webhook destination, if any.
    pub fn webhook_url(&self) -> Result<Option<Url>, ConfigError> {
        let Some(raw) = self.relay.webhook_url.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidWebhookUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidWebhookUrl {
                url: raw.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        Ok(Some(url))
    }

    pub fn relay_config(&self) -> Result<RelayConfig, ConfigError> {
        Ok(RelayConfig {
            webhook_url: self.webhook_url()?,
            timeout: Duration::from_secs(self.relay.timeout_seconds),
            max_in_flight: self.relay.max_in_flight,
        })
    }

    pub fn subprocess_config(&self) -> SubprocessConfig {
        SubprocessConfig {
            command: self.provider.command.clone(),
            args: self.provider.args.clone(),
            session_dir: self.session.data_dir.clone(),
            request_timeout: Duration::from_secs(self.provider.request_timeout_seconds),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let reconnect = &self.session.reconnect;
        ReconnectPolicy {
            initial_delay: Duration::from_millis(reconnect.initial_delay_ms),
            max_delay: Duration::from_millis(reconnect.max_delay_ms.max(reconnect.initial_delay_ms)),
            multiplier: reconnect.multiplier,
        }
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    60
}

// ============================================================================
// SessionConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Where the bridge persists authentication between restarts.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".chatbridge/session")
}

#[derive(Debug, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

// ============================================================================
// ProviderConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    /// Bridge executable.
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_provider_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            request_timeout_seconds: default_provider_timeout(),
        }
    }
}

fn default_command() -> String {
    "chatbridge-bridge".to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

// ============================================================================
// RelaySettings
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RelaySettings {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_relay_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_seconds: default_relay_timeout(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_relay_timeout() -> u64 {
    5
}

fn default_max_in_flight() -> usize {
    8
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("invalid value for {key}: '{value}'")]
    InvalidEnv { key: &'static str, value: String },

    #[error("invalid webhook url '{url}': {reason}")]
    InvalidWebhookUrl { url: String, reason: String },
}

// ============================================================================
// Tests
// ============================================================================
