//! FFI types for C interoperability.
//!
//! These types are designed to be safe across the C ABI boundary.

use std::ffi::{c_char, c_void, CStr};
use std::net::IpAddr;
use std::os::raw::c_uint;

use crate::config::RelayConfig;
use crate::error::Error;
use crate::relay::RelayState;

/// Result codes for FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkywireResult {
    /// Operation succeeded.
    Ok = 0,
    /// Invalid parameter (null pointer, etc.).
    InvalidParam = -1,
    /// Relay already started.
    AlreadyRunning = -2,
    /// A socket could not be protected.
    ProtectFailed = -3,
    /// Attempt budget exhausted.
    Exhausted = -4,
    /// Server address could not be resolved.
    DnsFailed = -5,
    /// I/O error.
    IoError = -7,
    /// Internal error.
    InternalError = -99,
}

impl From<&Error> for SkywireResult {
    fn from(e: &Error) -> Self {
        match e {
            Error::ProtectFailed { .. } => SkywireResult::ProtectFailed,
            Error::AttemptsExhausted { .. } => SkywireResult::Exhausted,
            Error::DnsResolution(_) => SkywireResult::DnsFailed,
            Error::Io(_) | Error::ServerGone(_) | Error::TunDevice(_) => SkywireResult::IoError,
            Error::Config(_) => SkywireResult::InvalidParam,
            Error::AlreadyRunning => SkywireResult::AlreadyRunning,
            Error::TaskFailed(_) => SkywireResult::InternalError,
        }
    }
}

/// Connection state for callbacks.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkywireState {
    Idle = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    Stopped = 4,
    Failed = 5,
}

impl From<&RelayState> for SkywireState {
    fn from(state: &RelayState) -> Self {
        match state {
            RelayState::Idle => SkywireState::Idle,
            RelayState::Connecting { .. } => SkywireState::Connecting,
            RelayState::Connected => SkywireState::Connected,
            RelayState::Reconnecting { .. } => SkywireState::Reconnecting,
            RelayState::Stopped => SkywireState::Stopped,
            RelayState::Failed(_) => SkywireState::Failed,
        }
    }
}

/// Relay configuration passed from mobile apps.
///
/// Zero timing values select the defaults.
#[repr(C)]
pub struct SkywireRelayConfig {
    /// Identifier used in log tags.
    pub connection_id: c_uint,
    /// Server hostname or IP (null-terminated UTF-8).
    pub server: *const c_char,
    /// Server port.
    pub port: c_uint,
    /// DNS resolver for the interface (null-terminated UTF-8, can be null).
    pub dns_server: *const c_char,
    /// Consecutive failed attempts before giving up.
    pub max_attempts: c_uint,
    /// Pause between attempts.
    pub retry_interval_ms: c_uint,
    /// Keepalive period on an idle link.
    pub keepalive_interval_ms: c_uint,
    /// Receive silence treated as a dead server.
    pub receive_timeout_ms: c_uint,
}

impl SkywireRelayConfig {
    /// Convert to a validated `RelayConfig`.
    ///
    /// # Safety
    /// String pointers must be null or valid null-terminated strings.
    pub unsafe fn to_relay_config(&self) -> Option<RelayConfig> {
        let server = cstr_to_string(self.server)?;
        let port = u16::try_from(self.port).ok()?;

        let mut config = RelayConfig::new(server, port);
        config.connection_id = self.connection_id;
        if let Some(dns) = cstr_to_string(self.dns_server) {
            config.dns_server = dns.parse::<IpAddr>().ok()?;
        }
        if self.max_attempts > 0 {
            config.max_attempts = self.max_attempts;
        }
        if self.retry_interval_ms > 0 {
            config.retry_interval_ms = u64::from(self.retry_interval_ms);
        }
        if self.keepalive_interval_ms > 0 {
            config.keepalive_interval_ms = u64::from(self.keepalive_interval_ms);
        }
        if self.receive_timeout_ms > 0 {
            config.receive_timeout_ms = u64::from(self.receive_timeout_ms);
        }

        config.validate().ok()?;
        Some(config)
    }
}

/// Tunnel parameters filled in by the host's tunneling library.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SkywireTunnelParams {
    /// Local tunnel IPv4 address, network byte order.
    pub tun_ip: [u8; 4],
    /// Prefix length of the tunnel address.
    pub prefix_len: u8,
    /// Interface MTU.
    pub mtu: u16,
}

/// One route of the interface.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SkywireRoute {
    pub dest: [u8; 4],
    pub prefix_len: u8,
}

/// Interface description handed to the host's establish callback.
///
/// Pointers are only valid for the duration of the callback.
#[repr(C)]
pub struct SkywireInterfaceSettings {
    pub mtu: u16,
    pub address: [u8; 4],
    pub prefix_len: u8,
    pub routes: *const SkywireRoute,
    pub route_count: usize,
    /// DNS resolver (null-terminated UTF-8).
    pub dns_server: *const c_char,
    /// Session label (null-terminated UTF-8).
    pub session: *const c_char,
}

/// Opaque handle to a relay client.
pub type SkywireHandle = *mut c_void;

/// Null handle constant.
pub const SKYWIRE_HANDLE_NULL: SkywireHandle = std::ptr::null_mut();

/// Convert a C string to a Rust string.
pub(super) unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}
