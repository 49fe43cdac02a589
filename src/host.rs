//! Collaborator interfaces.
//!
//! The relay never creates routing exclusions or virtual interfaces by itself;
//! the embedding host supplies them through these traits:
//! - [`HostPlatform`]: socket protection and interface establishment
//! - [`TunnelLibrary`]: tunnel parameters and auxiliary sockets
//! - [`VirtualInterface`]: the established interface's packet handle

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::os::fd::RawFd;
use std::sync::Arc;

use async_trait::async_trait;

use crate::interface::InterfaceSettings;

/// An established virtual network interface.
///
/// Each relay direction uses one side: the outbound pump only calls `recv`,
/// the inbound pump only calls `send`.
#[async_trait]
pub trait VirtualInterface: Send + Sync {
    /// Interface name, for logs.
    fn name(&self) -> &str;

    /// Wait for and read one packet. `Ok(0)` means nothing is available yet.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write one packet.
    async fn send(&self, packet: &[u8]) -> io::Result<usize>;

    /// Release the interface. Called once per attempt after both pumps stopped.
    fn close(&self) -> io::Result<()>;

    /// Underlying descriptor, when there is one.
    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

/// Host platform primitives.
pub trait HostPlatform: Send + Sync {
    /// Exclude a socket from routing through the virtual interface.
    ///
    /// Returns false when the host refuses.
    fn protect(&self, fd: RawFd) -> bool;

    /// Create the virtual interface described by `settings`.
    ///
    /// Not reentrant; the configurator serializes calls process-wide.
    fn establish(&self, settings: &InterfaceSettings) -> io::Result<Arc<dyn VirtualInterface>>;
}

/// Parameters and sockets owned by the tunneling library.
pub trait TunnelLibrary: Send + Sync {
    /// Pop the next auxiliary socket that needs protection, if any.
    fn next_auxiliary_socket(&self) -> Option<RawFd>;

    /// Local tunnel IPv4 address.
    fn tun_ip(&self) -> Ipv4Addr;

    /// Prefix length of the tunnel address.
    fn tun_prefix(&self) -> u8;

    /// Interface MTU.
    fn mtu(&self) -> u16;

    /// Report the local address chosen for the transport socket.
    fn set_local_addr(&self, addr: SocketAddr);
}

/// Opaque host value attached to the interface session (e.g. a UI intent).
pub type ConfigureIntent = Arc<dyn std::any::Any + Send + Sync>;

/// Called once for every successfully established interface.
pub type EstablishListener = Arc<dyn Fn(&Arc<dyn VirtualInterface>) + Send + Sync>;

/// Tunnel parameters fixed by configuration, for hosts without a tunneling
/// library of their own.
pub struct StaticTunnel {
    address: Ipv4Addr,
    prefix_len: u8,
    mtu: u16,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
}

impl StaticTunnel {
    pub fn new(address: Ipv4Addr, prefix_len: u8, mtu: u16) -> Self {
        Self {
            address,
            prefix_len,
            mtu,
            local_addr: parking_lot::Mutex::new(None),
        }
    }

    /// Local address reported by the last attempt.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

impl TunnelLibrary for StaticTunnel {
    fn next_auxiliary_socket(&self) -> Option<RawFd> {
        None
    }

    fn tun_ip(&self) -> Ipv4Addr {
        self.address
    }

    fn tun_prefix(&self) -> u8 {
        self.prefix_len
    }

    fn mtu(&self) -> u16 {
        self.mtu
    }

    fn set_local_addr(&self, addr: SocketAddr) {
        *self.local_addr.lock() = Some(addr);
    }
}
