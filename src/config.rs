//! Configuration management for the Skywire VPN relay

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::{
    DEFAULT_IDLE_INTERVAL_MS, DEFAULT_KEEPALIVE_INTERVAL_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RECEIVE_TIMEOUT_MS, DEFAULT_RETRY_INTERVAL_MS, MAX_PACKET_SIZE,
};

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Identifier used to tag log lines of this connection
    #[serde(default)]
    pub connection_id: u32,

    /// Remote tunnel endpoint hostname or IP address
    pub server: String,

    /// Remote tunnel endpoint port
    pub port: u16,

    /// Consecutive failed attempts tolerated before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Pause after an empty interface read
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Keepalive period while the socket is idle
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,

    /// Receive silence after which the server is considered gone
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    /// DNS resolver pushed to the virtual interface
    #[serde(default = "default_dns_server")]
    pub dns_server: IpAddr,

    /// Local TUN settings (Linux CLI host only)
    #[serde(default)]
    pub tun: TunConfig,
}

/// Local TUN device settings used when this process creates the interface itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunConfig {
    /// Requested interface name (kernel picks one if empty)
    #[serde(default = "default_tun_name")]
    pub name: String,

    /// Local tunnel address
    #[serde(default = "default_tun_address")]
    pub address: Ipv4Addr,

    /// Prefix length of the tunnel address
    #[serde(default = "default_prefix_len")]
    pub prefix_len: u8,

    /// Interface MTU
    #[serde(default = "default_mtu")]
    pub mtu: u16,

    /// Physical interface protected sockets are bound to
    /// (detected from the default route when unset)
    #[serde(default)]
    pub protect_interface: Option<String>,
}

impl Default for TunConfig {
    fn default() -> Self {
        Self {
            name: default_tun_name(),
            address: default_tun_address(),
            prefix_len: default_prefix_len(),
            mtu: default_mtu(),
            protect_interface: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}
fn default_idle_interval_ms() -> u64 {
    DEFAULT_IDLE_INTERVAL_MS
}
fn default_keepalive_interval_ms() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL_MS
}
fn default_receive_timeout_ms() -> u64 {
    DEFAULT_RECEIVE_TIMEOUT_MS
}
fn default_dns_server() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))
}
fn default_tun_name() -> String {
    "skywire0".to_string()
}
fn default_tun_address() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 255, 2)
}
fn default_prefix_len() -> u8 {
    29
}
fn default_mtu() -> u16 {
    1500
}

impl RelayConfig {
    /// Create a configuration with default timings for the given endpoint.
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            connection_id: 0,
            server: server.into(),
            port,
            max_attempts: default_max_attempts(),
            retry_interval_ms: default_retry_interval_ms(),
            idle_interval_ms: default_idle_interval_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            receive_timeout_ms: default_receive_timeout_ms(),
            dns_server: default_dns_server(),
            tun: TunConfig::default(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), Error> {
        if self.server.trim().is_empty() {
            return Err(Error::config("server must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("port must be non-zero"));
        }
        if self.max_attempts == 0 {
            return Err(Error::config("max_attempts must be at least 1"));
        }
        if self.retry_interval_ms == 0
            || self.idle_interval_ms == 0
            || self.keepalive_interval_ms == 0
            || self.receive_timeout_ms == 0
        {
            return Err(Error::config("intervals must be non-zero"));
        }
        if self.tun.prefix_len > 32 {
            return Err(Error::config(format!(
                "invalid prefix length /{}",
                self.tun.prefix_len
            )));
        }
        if usize::from(self.tun.mtu) > MAX_PACKET_SIZE {
            return Err(Error::config(format!(
                "mtu {} exceeds maximum packet size {}",
                self.tun.mtu, MAX_PACKET_SIZE
            )));
        }
        Ok(())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

/// Load and validate a JSON configuration file.
pub fn load_json<P: AsRef<Path>>(path: P) -> Result<RelayConfig> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: RelayConfig = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
