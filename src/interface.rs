//! Virtual interface configuration.
//!
//! Builds the interface settings from tunnel parameters and establishes the
//! interface under a process-wide lock.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::host::{ConfigureIntent, EstablishListener, HostPlatform, TunnelLibrary, VirtualInterface};

/// Serializes `HostPlatform::establish` across every connection in the process.
static ESTABLISH_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Address families the interface accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

/// Route configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Destination network.
    pub dest: Ipv4Addr,
    /// Prefix length (e.g., 1 for /1).
    pub prefix_len: u8,
}

impl Route {
    pub const fn new(dest: Ipv4Addr, prefix_len: u8) -> Self {
        Self { dest, prefix_len }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dest, self.prefix_len)
    }
}

/// Two halves of the address space. Together they win over an existing
/// default route without removing it.
pub const HALF_DEFAULT_ROUTES: [Route; 2] = [
    Route::new(Ipv4Addr::new(0, 0, 0, 0), 1),
    Route::new(Ipv4Addr::new(128, 0, 0, 0), 1),
];

/// Everything the host needs to build the interface.
#[derive(Clone)]
pub struct InterfaceSettings {
    pub mtu: u16,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub allowed_families: Vec<AddressFamily>,
    pub routes: Vec<Route>,
    pub dns_servers: Vec<IpAddr>,
    /// Session label, the remote host name.
    pub session: String,
    pub configure_intent: Option<ConfigureIntent>,
}

impl fmt::Debug for InterfaceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceSettings")
            .field("mtu", &self.mtu)
            .field("address", &self.address)
            .field("prefix_len", &self.prefix_len)
            .field("allowed_families", &self.allowed_families)
            .field("routes", &self.routes)
            .field("dns_servers", &self.dns_servers)
            .field("session", &self.session)
            .field("configure_intent", &self.configure_intent.is_some())
            .finish()
    }
}

impl InterfaceSettings {
    /// Derive settings from the tunneling library's parameters.
    pub fn from_tunnel(
        tunnel: &dyn TunnelLibrary,
        dns: IpAddr,
        session: &str,
        configure_intent: Option<ConfigureIntent>,
    ) -> Self {
        Self {
            mtu: tunnel.mtu(),
            address: tunnel.tun_ip(),
            prefix_len: tunnel.tun_prefix(),
            allowed_families: vec![AddressFamily::Ipv4],
            routes: HALF_DEFAULT_ROUTES.to_vec(),
            dns_servers: vec![dns],
            session: session.to_string(),
            configure_intent,
        }
    }

    /// Netmask corresponding to `prefix_len`.
    pub fn netmask(&self) -> Ipv4Addr {
        prefix_to_netmask(self.prefix_len)
    }
}

/// Convert a prefix length to a dotted netmask.
pub fn prefix_to_netmask(prefix_len: u8) -> Ipv4Addr {
    let bits = match prefix_len {
        0 => 0,
        p if p >= 32 => u32::MAX,
        p => u32::MAX << (32 - u32::from(p)),
    };
    Ipv4Addr::from(bits)
}

/// Establish the interface and notify the listener, under the global lock.
pub fn establish(
    host: &dyn HostPlatform,
    settings: &InterfaceSettings,
    listener: Option<&EstablishListener>,
) -> Result<Arc<dyn VirtualInterface>> {
    debug!(address = %settings.address, prefix = settings.prefix_len, mtu = settings.mtu,
        "Establishing virtual interface");

    let iface = {
        let _guard = ESTABLISH_LOCK.lock();
        let iface = host
            .establish(settings)
            .map_err(|e| Error::tun(format!("Failed to establish interface: {e}")))?;
        if let Some(listener) = listener {
            listener(&iface);
        }
        iface
    };

    info!(device = %iface.name(), ip = %settings.address, "New interface");
    Ok(iface)
}
