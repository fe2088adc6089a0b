use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;
use super::protocol::RequestStyle;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub embed: EmbedConfig,
}

/// Where the listening service lives and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Host (and optional port / path) of the websocket service, without scheme.
    #[serde(default = "default_host")]
    pub host: String,
    /// `wss://` when true, `ws://` otherwise (local development only).
    #[serde(default = "default_tls")]
    pub tls: bool,
    #[serde(default)]
    pub request_style: RequestStyle,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval between status requests on an open connection.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Upper bound on the initial "checking" state.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Player embed base; the track id is appended as a path segment.
    #[serde(default = "default_embed_base")]
    pub base_url: String,
}

impl EndpointConfig {
    pub fn url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{}://{}", scheme, self.host.trim_start_matches('/'))
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            tls: default_tls(),
            request_style: RequestStyle::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            startup_timeout_ms: default_startup_timeout_ms(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            base_url: default_embed_base(),
        }
    }
}

fn default_host() -> String {
    "localhost:3001".to_string()
}

fn default_tls() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_refresh_interval_ms() -> u64 {
    3_000
}

fn default_startup_timeout_ms() -> u64 {
    5_000
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_embed_base() -> String {
    "https://open.spotify.com/embed/track".to_string()
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.endpoint.host.trim().is_empty() {
            anyhow::bail!("endpoint.host must not be empty");
        }
        if self.polling.refresh_interval_ms == 0 {
            anyhow::bail!("polling.refresh_interval_ms must be positive");
        }
        Ok(())
    }
}
