//! Configuration loading and parsing

use anyhow::{Context, Result};
use can_signal_db::{DatabaseConfig, RxFilter, VirtualChannel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// JSON network description
    pub description: Option<PathBuf>,
    /// Bus of the description to load
    pub bus: Option<String>,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Frames to replay, `ID#HEX`
    #[serde(default)]
    pub replay: Vec<String>,
    /// Signal assignments, `Message.Signal=VALUE`
    #[serde(default)]
    pub set: Vec<String>,
    /// Messages to transmit
    #[serde(default)]
    pub send: Vec<String>,
    /// Listener paths to print, `Message` or `Message.Signal`
    #[serde(default)]
    pub watch: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(default = "default_channel_name")]
    pub name: String,
    #[serde(default)]
    pub loopback: bool,
    #[serde(default)]
    pub timestamps: bool,
    #[serde(default)]
    pub rx_filters: Vec<RxFilter>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: default_channel_name(),
            loopback: false,
            timestamps: false,
            rx_filters: Vec::new(),
        }
    }
}

fn default_channel_name() -> String {
    "vcan0".to_string()
}

impl ChannelConfig {
    /// Build the virtual channel described by this section
    pub fn build(&self) -> VirtualChannel {
        let mut channel = VirtualChannel::new(self.name.clone())
            .with_loopback(self.loopback)
            .with_timestamps(self.timestamps);
        channel.set_rx_filters(self.rx_filters.clone());
        channel
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
