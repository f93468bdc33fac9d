use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub link: LinkConfig,
    pub trade: TradeConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Address the TCP frame bridge listens on (the platform shifter dials in).
    pub bridge_addr: String,
    /// Per-frame wait while connecting / navigating menus.
    pub handshake_timeout_ms: u64,
    /// Clock-stall tolerance once party data is in flight.
    pub stall_timeout_secs: u64,
    /// Idle time in the post-trade phase before the session is considered over.
    pub cleanup_idle_secs: u64,
    /// Tolerated link timeouts before party data starts.
    pub retry_budget: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TradeConfig {
    pub send_slot: u8,
    pub receive_slot: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub slots_dir: String,
    pub slot_count: u8,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl LinkConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    pub fn cleanup_idle(&self) -> Duration {
        Duration::from_secs(self.cleanup_idle_secs)
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }
}
