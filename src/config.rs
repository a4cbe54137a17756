//! Client configuration: the rendezvous server address and optional ICE servers.
//!
//! Stored as JSON next to the binary (`config.json` by default) and created
//! with defaults on first run.

use crate::peer::types::ServerConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Rendezvous server websocket url
    pub server_ip: String,

    /// ICE servers replacing the default public STUN server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice_servers: Option<Vec<ServerConfig>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_ip: DEFAULT_SERVER_URL.to_string(),
            ice_servers: None,
        }
    }
}

impl ClientConfig {
    /// Read the config file, writing the default one first if it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            info!("Created default config file: {}", path.display());
            return Ok(config);
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ClientConfig = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let json = serde_json::to_string(self).context("Failed to serialize config")?;
        fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Combine a server given on the command line with the config file.
    ///
    /// Without `server_override` the file is loaded (and created if missing).
    /// With it, an existing file still supplies the ICE servers but no file is created.
    pub fn resolve(server_override: Option<String>, path: &Path) -> Result<Self> {
        match server_override {
            None => Self::load_or_create(path),
            Some(server_ip) => {
                let ice_servers = if path.exists() {
                    Self::load(path)?.ice_servers
                } else {
                    None
                };
                Ok(Self {
                    server_ip,
                    ice_servers,
                })
            }
        }
    }
}
