//! Configuration types for the preamp remote client

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::command::AdjustSeparator;
use crate::error::{RemoteError, Result};
use crate::fields::FieldRule;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub commands: CommandConfig,
    #[serde(default)]
    pub panel: PanelConfig,
    /// Field rules merged over the built-in table
    #[serde(default)]
    pub fields: HashMap<String, FieldRule>,
}

/// WebSocket endpoint of the preamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
}

impl GatewayConfig {
    /// Build the `ws://` URL the client connects to
    pub fn url(&self) -> Result<Url> {
        if self.host.is_empty() {
            return Err(RemoteError::InvalidGateway("host is empty".to_string()));
        }
        if !self.path.starts_with('/') {
            return Err(RemoteError::InvalidGateway(format!(
                "path must start with '/': {}",
                self.path
            )));
        }

        let raw = match self.port {
            Some(port) => format!("ws://{}:{}{}", self.host, port, self.path),
            None => format!("ws://{}{}", self.host, self.path),
        };
        Url::parse(&raw).map_err(|e| RemoteError::InvalidGateway(format!("{}: {}", raw, e)))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            path: default_path(),
            connection_timeout_seconds: default_connection_timeout(),
        }
    }
}

/// Fixed-delay reconnection. There is no retry ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_interval")]
    pub interval_ms: u64,
}

impl ReconnectConfig {
    /// Delay before the next connection attempt; zero is rejected
    pub fn interval(&self) -> Result<Duration> {
        if self.interval_ms == 0 {
            return Err(RemoteError::Config(
                "reconnect.interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(Duration::from_millis(self.interval_ms))
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_reconnect_interval(),
        }
    }
}

/// Outbound command encoding
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default)]
    pub separator: AdjustSeparator,
}

/// Elements exposed by the in-memory control panel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default = "default_elements")]
    pub elements: Vec<String>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            elements: default_elements(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_path() -> String {
    "/ws".to_string()
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_reconnect_interval() -> u64 {
    2000
}

fn default_elements() -> Vec<String> {
    [
        "Volume",
        "VolumeValue",
        "Input",
        "Power",
        "Temp1",
        "Temp1Value",
        "Temp2",
        "Temp2Value",
    ]
    .iter()
    .map(|id| id.to_string())
    .collect()
}

/// Load configuration from a JSON file
pub fn load_config(path: &PathBuf) -> std::result::Result<Config, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
