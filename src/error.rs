//! Error types for the Skywire VPN relay.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the relay.
#[derive(Error, Debug)]
pub enum Error {
    /// The host refused to exclude a socket from VPN routing.
    #[error("Cannot protect the tunnel socket (fd {fd})")]
    ProtectFailed { fd: i32 },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No datagram arrived within the receive timeout.
    #[error("Server is gone: nothing received for {0} ms")]
    ServerGone(u64),

    /// Virtual interface could not be established or used.
    #[error("TUN device error: {0}")]
    TunDevice(String),

    /// DNS resolution error
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// Attempt budget exhausted without ever reconnecting.
    #[error("Connection failed after {attempts} consecutive attempts")]
    AttemptsExhausted { attempts: u32 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pump task ended abnormally.
    #[error("Pump task failed: {0}")]
    TaskFailed(String),

    /// Connection is already running.
    #[error("Connection is already running")]
    AlreadyRunning,
}

impl Error {
    /// Create a new TUN device error.
    pub fn tun<S: Into<String>>(msg: S) -> Self {
        Self::TunDevice(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Check if the supervisor may start another attempt after this error.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ProtectFailed { .. }
                | Self::Io(_)
                | Self::ServerGone(_)
                | Self::TunDevice(_)
                | Self::TaskFailed(_)
        )
    }
}
