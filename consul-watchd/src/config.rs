use std::path::Path;
use serde::Deserialize;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub slack: SlackConfig,
    #[serde(default)]
    pub consul: ConsulConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    /// Incoming-webhook URL to post messages to
    pub webhook_url: String,
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    #[serde(default = "default_icon_emoji")]
    pub icon_emoji: String,
    /// Override the webhook's default channel
    #[serde(default)]
    pub channel: Option<String>,
    /// Usernames to @-mention on alerts
    #[serde(default)]
    pub notify_users: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsulConfig {
    #[serde(default = "default_consul_address")]
    pub address: String,
    #[serde(default = "default_consul_port")]
    pub port: u16,
    /// KV keys whose values are appended to every message
    #[serde(default)]
    pub additional_vars: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Cap on the exponential backoff while waiting for the registry to
    /// report its first service
    #[serde(default = "default_startup_retry_max")]
    pub startup_retry_max_secs: u64,
    /// Give up after this many startup attempts; 0 retries forever
    #[serde(default)]
    pub startup_max_attempts: u32,
}

fn default_bot_name() -> String {
    "consul-watchd".to_string()
}

fn default_icon_emoji() -> String {
    ":ghost:".to_string()
}

fn default_consul_address() -> String {
    "consul.service.consul".to_string()
}

fn default_consul_port() -> u16 {
    8500
}

fn default_poll_interval() -> u64 {
    10
}

fn default_startup_retry_max() -> u64 {
    60
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: default_consul_address(),
            port: default_consul_port(),
            additional_vars: Vec::new(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            startup_retry_max_secs: default_startup_retry_max(),
            startup_max_attempts: 0,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
