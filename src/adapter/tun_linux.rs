//! Linux TUN device implementation.

use std::ffi::CStr;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::process::Command;

use async_trait::async_trait;
use libc::{
    c_char, c_int, c_short, c_void, ioctl, open, sockaddr_in, socket, AF_INET, IFF_NO_PI,
    IFF_TUN, O_CLOEXEC, O_NONBLOCK, O_RDWR, SOCK_DGRAM,
};
use tracing::{debug, info, warn};

use super::FdInterface;
use crate::host::VirtualInterface;
use crate::interface::{InterfaceSettings, Route};

/// TUNSETIFF ioctl number.
const TUNSETIFF: libc::c_ulong = 0x400454ca;

/// SIOCSIFADDR - Set interface address.
const SIOCSIFADDR: libc::c_ulong = 0x8916;

/// SIOCSIFNETMASK - Set interface netmask.
const SIOCSIFNETMASK: libc::c_ulong = 0x891c;

/// SIOCSIFFLAGS - Set interface flags.
const SIOCSIFFLAGS: libc::c_ulong = 0x8914;

/// SIOCGIFFLAGS - Get interface flags.
const SIOCGIFFLAGS: libc::c_ulong = 0x8913;

/// SIOCSIFMTU - Set interface MTU.
const SIOCSIFMTU: libc::c_ulong = 0x8922;

/// IFF_UP - Interface is up.
const IFF_UP: c_short = 0x1;

/// IFF_RUNNING - Interface is running.
const IFF_RUNNING: c_short = 0x40;

/// Interface request structure.
#[repr(C)]
struct IfReq {
    ifr_name: [c_char; 16],
    ifr_flags: c_short,
    _pad: [u8; 22],
}

/// Interface request with address.
#[repr(C)]
struct IfReqAddr {
    ifr_name: [c_char; 16],
    ifr_addr: sockaddr_in,
}

/// Interface request with MTU.
#[repr(C)]
struct IfReqMtu {
    ifr_name: [c_char; 16],
    ifr_mtu: c_int,
    _pad: [u8; 20],
}

/// Linux TUN device configured for the relay.
pub struct TunDevice {
    io: FdInterface,
    name: String,
}

impl TunDevice {
    /// Create and fully configure a TUN device from `settings`.
    ///
    /// If `name` is empty, the kernel will assign a name like "tun0".
    pub fn create(name: &str, settings: &InterfaceSettings) -> io::Result<Self> {
        let (fd, name) = open_tun(name)?;
        info!("Created TUN device: {}", name);

        let control = control_socket()?;
        set_address(&control, &name, settings.address, settings.netmask())?;
        set_mtu(&control, &name, settings.mtu)?;
        set_flags(&control, &name, true)?;

        for route in &settings.routes {
            add_route(&name, route)?;
        }
        for dns in &settings.dns_servers {
            configure_dns(&name, *dns);
        }

        info!(device = %name, ip = %settings.address, prefix = settings.prefix_len,
            mtu = settings.mtu, session = %settings.session, "TUN interface configured");

        Ok(Self {
            io: FdInterface::new(fd, name.clone())?,
            name,
        })
    }
}

fn open_tun(name: &str) -> io::Result<(OwnedFd, String)> {
    unsafe {
        // Open the TUN clone device
        let raw = open(
            b"/dev/net/tun\0".as_ptr() as *const c_char,
            O_RDWR | O_NONBLOCK | O_CLOEXEC,
        );
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = OwnedFd::from_raw_fd(raw);

        let mut ifr = IfReq {
            ifr_name: [0; 16],
            ifr_flags: (IFF_TUN | IFF_NO_PI) as c_short,
            _pad: [0; 22],
        };
        copy_name(name, &mut ifr.ifr_name);

        if ioctl(fd.as_raw_fd(), TUNSETIFF, &mut ifr as *mut _ as *mut c_void) < 0 {
            return Err(io::Error::last_os_error());
        }

        // Get the actual interface name
        let name = CStr::from_ptr(ifr.ifr_name.as_ptr())
            .to_string_lossy()
            .into_owned();
        Ok((fd, name))
    }
}

/// Create a control socket for ioctl operations.
fn control_socket() -> io::Result<OwnedFd> {
    unsafe {
        let fd = socket(AF_INET, SOCK_DGRAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(OwnedFd::from_raw_fd(fd))
    }
}

/// Copy interface name to a buffer.
fn copy_name(name: &str, buf: &mut [c_char; 16]) {
    for (i, byte) in name.bytes().take(15).enumerate() {
        buf[i] = byte as c_char;
    }
}

fn set_address(sock: &OwnedFd, name: &str, ip: Ipv4Addr, netmask: Ipv4Addr) -> io::Result<()> {
    for (request, addr) in [(SIOCSIFADDR, ip), (SIOCSIFNETMASK, netmask)] {
        unsafe {
            let mut ifr = IfReqAddr {
                ifr_name: [0; 16],
                ifr_addr: std::mem::zeroed(),
            };
            copy_name(name, &mut ifr.ifr_name);
            ifr.ifr_addr.sin_family = AF_INET as u16;
            ifr.ifr_addr.sin_addr.s_addr = u32::from_ne_bytes(addr.octets());

            if ioctl(sock.as_raw_fd(), request, &mut ifr as *mut _ as *mut c_void) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    debug!("Configured {} with IP {} netmask {}", name, ip, netmask);
    Ok(())
}

fn set_mtu(sock: &OwnedFd, name: &str, mtu: u16) -> io::Result<()> {
    unsafe {
        let mut ifr = IfReqMtu {
            ifr_name: [0; 16],
            ifr_mtu: mtu as c_int,
            _pad: [0; 20],
        };
        copy_name(name, &mut ifr.ifr_name);

        if ioctl(sock.as_raw_fd(), SIOCSIFMTU, &mut ifr as *mut _ as *mut c_void) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    debug!("Set MTU to {} on {}", mtu, name);
    Ok(())
}

/// Bring the link up or down.
fn set_flags(sock: &OwnedFd, name: &str, up: bool) -> io::Result<()> {
    unsafe {
        let mut ifr = IfReq {
            ifr_name: [0; 16],
            ifr_flags: 0,
            _pad: [0; 22],
        };
        copy_name(name, &mut ifr.ifr_name);

        if ioctl(sock.as_raw_fd(), SIOCGIFFLAGS, &mut ifr as *mut _ as *mut c_void) < 0 {
            return Err(io::Error::last_os_error());
        }

        if up {
            ifr.ifr_flags |= IFF_UP | IFF_RUNNING;
        } else {
            ifr.ifr_flags &= !(IFF_UP | IFF_RUNNING);
        }

        if ioctl(sock.as_raw_fd(), SIOCSIFFLAGS, &mut ifr as *mut _ as *mut c_void) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    debug!("Interface {} is {}", name, if up { "up" } else { "down" });
    Ok(())
}

/// Add a route directly through the interface.
fn add_route(name: &str, route: &Route) -> io::Result<()> {
    let status = Command::new("ip")
        .args(["route", "replace", &route.to_string(), "dev", name])
        .status()?;

    if !status.success() {
        return Err(io::Error::other(format!("Failed to add route {route} dev {name}")));
    }
    debug!("Added route: {} dev {}", route, name);
    Ok(())
}

/// Point the interface's resolver at `dns`. Failures only warn: not every
/// system runs systemd-resolved.
fn configure_dns(name: &str, dns: IpAddr) {
    let dns = dns.to_string();

    let applied = Command::new("resolvectl")
        .args(["dns", name, &dns])
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if applied {
        let _ = Command::new("resolvectl").args(["domain", name, "~."]).status();
        info!("Configured DNS {} via resolvectl", dns);
    } else {
        warn!("Could not configure DNS {} on {}", dns, name);
    }
}

#[async_trait]
impl VirtualInterface for TunDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.io.recv(buf).await
    }

    async fn send(&self, packet: &[u8]) -> io::Result<usize> {
        self.io.send(packet).await
    }

    /// Take the link down; routes through it disappear with it.
    fn close(&self) -> io::Result<()> {
        self.io.close()?;
        let control = control_socket()?;
        set_flags(&control, &self.name, false)
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.io.raw_fd()
    }
}

impl Drop for TunDevice {
    fn drop(&mut self) {
        debug!("Closing TUN device: {}", self.name);
    }
}
