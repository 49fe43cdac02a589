//! Skywire VPN client relay
//!
//! Moves IP packets between a host-provided virtual interface and a UDP
//! socket connected to a remote Skywire VPN server, reconnecting on failure.
//!
//! # Modules
//!
//! - [`relay`]: connection supervisor and the two packet pumps
//! - [`interface`]: interface settings and serialized establishment
//! - [`host`]: traits the embedding host implements
//! - [`adapter`]: descriptor-backed interfaces (local TUN, host fds)
//! - [`ffi`]: C ABI for mobile hosts
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use skywire_vpn::{Connection, RelayConfig, StaticTunnel};
//!
//! let config = RelayConfig::new("vpn.example.com", 7000);
//! let tunnel = Arc::new(StaticTunnel::new(config.tun.address, config.tun.prefix_len, config.tun.mtu));
//! let conn = Arc::new(Connection::new(config, host, tunnel));
//! let handle = conn.start();
//! // ...
//! conn.stop();
//! handle.await??;
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod ffi;
pub mod host;
pub mod interface;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod relay;

// Re-export main types
pub use config::{RelayConfig, TunConfig};
pub use error::{Error, Result};
pub use host::{
    ConfigureIntent, EstablishListener, HostPlatform, StaticTunnel, TunnelLibrary,
    VirtualInterface,
};
pub use interface::{InterfaceSettings, Route};
pub use relay::{Connection, RelayState, StopSignal};

/// Largest datagram relayed in either direction.
pub const MAX_PACKET_SIZE: usize = i16::MAX as usize;

// Default configuration constants
pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 100;
pub const DEFAULT_KEEPALIVE_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 20_000;
