//! FFI callbacks supplied by the embedding app.
//!
//! The app owns socket protection and interface creation; these callbacks
//! are how the relay reaches them. [`CallbackBridge`] adapts the callback
//! table to [`HostPlatform`] and [`TunnelLibrary`].

use std::ffi::{c_char, c_void, CString};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::os::fd::RawFd;
use std::sync::Arc;

use tracing::debug;

use super::types::{
    SkywireInterfaceSettings, SkywireResult, SkywireRoute, SkywireState, SkywireTunnelParams,
};
use crate::adapter::FdInterface;
use crate::config::TunConfig;
use crate::host::{EstablishListener, HostPlatform, TunnelLibrary, VirtualInterface};
use crate::interface::InterfaceSettings;
use crate::relay::RelayState;

/// Socket protection callback type.
/// Called when a socket must bypass the VPN interface.
///
/// # Parameters
/// - `context`: User context pointer.
/// - `fd`: The socket file descriptor to protect.
///
/// # Returns
/// true if protection succeeded, false otherwise.
pub type ProtectSocketCallback = Option<extern "C" fn(context: *mut c_void, fd: i32) -> bool>;

/// Pop the next socket of the tunneling library that needs protection.
///
/// # Returns
/// A descriptor, or a value <= 0 when there are none left.
pub type NextAuxiliarySocketCallback = Option<extern "C" fn(context: *mut c_void) -> i32>;

/// Fill in the tunnel parameters.
///
/// # Returns
/// false if no parameters are available; defaults are used then.
pub type TunnelParamsCallback =
    Option<extern "C" fn(context: *mut c_void, params: *mut SkywireTunnelParams) -> bool>;

/// Create the virtual interface.
///
/// # Parameters
/// - `settings`: Interface description, valid only during the call.
///
/// # Returns
/// The interface descriptor (ownership passes to the relay), or -1 on failure.
pub type EstablishCallback =
    Option<extern "C" fn(context: *mut c_void, settings: *const SkywireInterfaceSettings) -> i32>;

/// Notified once for every newly established interface.
pub type EstablishedCallback = Option<extern "C" fn(context: *mut c_void, fd: i32)>;

/// Receives the local address of the tunnel socket ("ip:port").
pub type LocalAddrCallback = Option<extern "C" fn(context: *mut c_void, addr: *const c_char)>;

/// Callback for state changes.
pub type StateCallback = Option<extern "C" fn(context: *mut c_void, state: SkywireState)>;

/// Callback for the end of a run.
///
/// # Parameters
/// - `context`: User-provided context pointer.
/// - `result`: Reason (Ok = stopped on request, error code otherwise).
pub type DisconnectedCallback =
    Option<extern "C" fn(context: *mut c_void, result: SkywireResult)>;

/// Callback for log messages.
///
/// # Parameters
/// - `context`: User-provided context pointer.
/// - `level`: Log level (0=debug, 1=info, 2=warn, 3=error).
/// - `message`: Null-terminated UTF-8 log message.
pub type LogCallback =
    Option<extern "C" fn(context: *mut c_void, level: i32, message: *const c_char)>;

/// Collection of all callbacks.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SkywireCallbacks {
    /// User context pointer passed to all callbacks.
    pub context: *mut c_void,
    /// Socket protection (required for a working tunnel).
    pub protect_socket: ProtectSocketCallback,
    /// Auxiliary sockets of the tunneling library.
    pub next_auxiliary_socket: NextAuxiliarySocketCallback,
    /// Tunnel parameters.
    pub get_tunnel_params: TunnelParamsCallback,
    /// Interface creation (required for a working tunnel).
    pub establish: EstablishCallback,
    /// Interface established notification.
    pub on_establish: EstablishedCallback,
    /// Local address of the tunnel socket.
    pub set_local_addr: LocalAddrCallback,
    /// State change callback.
    pub on_state_changed: StateCallback,
    /// Run finished callback.
    pub on_disconnected: DisconnectedCallback,
    /// Log callback.
    pub on_log: LogCallback,
}

impl Default for SkywireCallbacks {
    fn default() -> Self {
        Self {
            context: std::ptr::null_mut(),
            protect_socket: None,
            next_auxiliary_socket: None,
            get_tunnel_params: None,
            establish: None,
            on_establish: None,
            set_local_addr: None,
            on_state_changed: None,
            on_disconnected: None,
            on_log: None,
        }
    }
}

// Safety: The app guarantees its callbacks and context may be used from
// any thread; the relay calls them from runtime worker threads.
unsafe impl Send for SkywireCallbacks {}
unsafe impl Sync for SkywireCallbacks {}

impl SkywireCallbacks {
    /// Log a message through the registered callback.
    ///
    /// # Parameters
    /// - `level`: Log level (0=debug, 1=info, 2=warn, 3=error)
    /// - `msg`: The message to log
    #[inline]
    pub fn log(&self, level: i32, msg: &str) {
        if let Some(cb) = self.on_log {
            if let Ok(cstr) = CString::new(msg) {
                cb(self.context, level, cstr.as_ptr());
            }
        }
    }

    /// Log an info message (level 1).
    #[inline]
    pub fn log_info(&self, msg: &str) {
        self.log(1, msg);
    }

    /// Log an error message (level 3).
    #[inline]
    pub fn log_error(&self, msg: &str) {
        self.log(3, msg);
    }

    pub fn notify_state(&self, state: &RelayState) {
        if let Some(cb) = self.on_state_changed {
            cb(self.context, SkywireState::from(state));
        }
    }

    pub fn notify_established(&self, fd: i32) {
        if let Some(cb) = self.on_establish {
            cb(self.context, fd);
        }
    }

    pub fn notify_disconnected(&self, result: SkywireResult) {
        if let Some(cb) = self.on_disconnected {
            cb(self.context, result);
        }
    }

    /// Listener forwarding every established interface to `on_establish`.
    pub fn establish_listener(&self) -> Option<EstablishListener> {
        if self.on_establish.is_none() {
            return None;
        }
        let callbacks = *self;
        let listener: EstablishListener = Arc::new(move |iface: &Arc<dyn VirtualInterface>| {
            callbacks.notify_established(iface.raw_fd().unwrap_or(-1));
        });
        Some(listener)
    }
}

/// Host and tunneling library backed by app callbacks.
pub struct CallbackBridge {
    callbacks: SkywireCallbacks,
}

impl CallbackBridge {
    pub fn new(callbacks: SkywireCallbacks) -> Self {
        Self { callbacks }
    }

    /// Current tunnel parameters, or the local TUN defaults.
    fn params(&self) -> SkywireTunnelParams {
        let mut params = SkywireTunnelParams::default();
        if let Some(cb) = self.callbacks.get_tunnel_params {
            if cb(self.callbacks.context, &mut params) {
                return params;
            }
        }
        let defaults = TunConfig::default();
        SkywireTunnelParams {
            tun_ip: defaults.address.octets(),
            prefix_len: defaults.prefix_len,
            mtu: defaults.mtu,
        }
    }
}

impl HostPlatform for CallbackBridge {
    fn protect(&self, fd: RawFd) -> bool {
        match self.callbacks.protect_socket {
            Some(cb) => cb(self.callbacks.context, fd),
            None => false,
        }
    }

    fn establish(&self, settings: &InterfaceSettings) -> io::Result<Arc<dyn VirtualInterface>> {
        let cb = self
            .callbacks
            .establish
            .ok_or_else(|| io::Error::other("no establish callback registered"))?;

        let routes: Vec<SkywireRoute> = settings
            .routes
            .iter()
            .map(|r| SkywireRoute {
                dest: r.dest.octets(),
                prefix_len: r.prefix_len,
            })
            .collect();
        let dns = settings
            .dns_servers
            .first()
            .map(|d| CString::new(d.to_string()))
            .transpose()
            .map_err(io::Error::other)?;
        let session = CString::new(settings.session.as_str()).map_err(io::Error::other)?;

        let raw = SkywireInterfaceSettings {
            mtu: settings.mtu,
            address: settings.address.octets(),
            prefix_len: settings.prefix_len,
            routes: routes.as_ptr(),
            route_count: routes.len(),
            dns_server: dns.as_ref().map_or(std::ptr::null(), |d| d.as_ptr()),
            session: session.as_ptr(),
        };

        let fd = cb(self.callbacks.context, &raw);
        if fd < 0 {
            return Err(io::Error::other("host refused to establish the interface"));
        }
        debug!(fd, "Host established interface");

        // Safety: the establish contract hands ownership of `fd` to us.
        let iface = unsafe { FdInterface::from_raw_fd(fd, format!("tun-fd{fd}"))? };
        Ok(Arc::new(iface))
    }
}

impl TunnelLibrary for CallbackBridge {
    fn next_auxiliary_socket(&self) -> Option<RawFd> {
        let cb = self.callbacks.next_auxiliary_socket?;
        let fd = cb(self.callbacks.context);
        (fd > 0).then_some(fd)
    }

    fn tun_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.params().tun_ip)
    }

    fn tun_prefix(&self) -> u8 {
        self.params().prefix_len
    }

    fn mtu(&self) -> u16 {
        self.params().mtu
    }

    fn set_local_addr(&self, addr: SocketAddr) {
        if let Some(cb) = self.callbacks.set_local_addr {
            if let Ok(cstr) = CString::new(addr.to_string()) {
                cb(self.callbacks.context, cstr.as_ptr());
            }
        }
    }
}
