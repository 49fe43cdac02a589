//! Linux host for the CLI.
//!
//! Protection binds sockets to the physical interface that carried the
//! default route before the tunnel came up, so their route lookup skips the
//! tunnel's half-default routes.

use std::io;
use std::os::fd::RawFd;
use std::process::Command;
use std::sync::Arc;

use libc::{c_void, setsockopt, socklen_t, SOL_SOCKET, SO_BINDTODEVICE};
use tracing::{debug, info, warn};

use crate::adapter::TunDevice;
use crate::config::TunConfig;
use crate::error::{Error, Result};
use crate::host::{HostPlatform, VirtualInterface};
use crate::interface::InterfaceSettings;

/// Host platform backed by the local kernel.
pub struct LinuxHost {
    tun_name: String,
    protect_interface: String,
}

impl LinuxHost {
    /// Build the host, detecting the default interface when not configured.
    pub fn new(config: &TunConfig) -> Result<Self> {
        let protect_interface = match &config.protect_interface {
            Some(name) => name.clone(),
            None => default_interface()?,
        };
        info!(interface = %protect_interface, "Protected sockets bound to physical interface");

        Ok(Self {
            tun_name: config.name.clone(),
            protect_interface,
        })
    }

    pub fn protect_interface(&self) -> &str {
        &self.protect_interface
    }
}

impl HostPlatform for LinuxHost {
    fn protect(&self, fd: RawFd) -> bool {
        let name = self.protect_interface.as_bytes();
        let rc = unsafe {
            setsockopt(
                fd,
                SOL_SOCKET,
                SO_BINDTODEVICE,
                name.as_ptr() as *const c_void,
                name.len() as socklen_t,
            )
        };
        if rc < 0 {
            warn!(fd, error = %io::Error::last_os_error(), "SO_BINDTODEVICE failed");
            return false;
        }
        debug!(fd, interface = %self.protect_interface, "Socket protected");
        true
    }

    fn establish(&self, settings: &InterfaceSettings) -> io::Result<Arc<dyn VirtualInterface>> {
        let device = TunDevice::create(&self.tun_name, settings)?;
        Ok(Arc::new(device))
    }
}

/// Name of the interface carrying the current default route.
fn default_interface() -> Result<String> {
    let output = Command::new("ip")
        .args(["-4", "route", "show", "default"])
        .output()?;
    if !output.status.success() {
        return Err(Error::config("`ip route show default` failed"));
    }
    parse_default_interface(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| Error::config("no default route; set tun.protect_interface"))
}

/// Extract the `dev` of the first route line.
pub fn parse_default_interface(routes: &str) -> Option<String> {
    routes.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "dev" {
                return tokens.next().map(str::to_string);
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_interface() {
        let out = "default via 192.168.1.1 dev wlp2s0 proto dhcp src 192.168.1.20 metric 600\n";
        assert_eq!(parse_default_interface(out).as_deref(), Some("wlp2s0"));

        let multi = "default dev ppp0 scope link\ndefault via 10.0.0.1 dev eth0\n";
        assert_eq!(parse_default_interface(multi).as_deref(), Some("ppp0"));

        assert_eq!(parse_default_interface(""), None);
        assert_eq!(parse_default_interface("default via 10.0.0.1"), None);
    }
}
