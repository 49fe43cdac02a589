//! Virtual interface adapters.
//!
//! This module provides descriptor-backed interfaces for hosts that hand
//! the relay a TUN descriptor, and Linux TUN creation for the CLI host.

mod fd;

#[cfg(target_os = "linux")]
mod tun_linux;

pub use fd::FdInterface;

#[cfg(target_os = "linux")]
pub use tun_linux::TunDevice;
