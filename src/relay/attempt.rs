//! A single connection attempt: acquire, pump, tear down.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::interface::{self, InterfaceSettings};

use super::connection::Connection;
use super::inbound::{InboundConfig, InboundPump};
use super::outbound;
use super::state::RelayState;
use super::timing::LinkTiming;

impl Connection {
    /// Run one attempt against `server`.
    ///
    /// Returns whether the interface was established, however the attempt
    /// ended afterwards. Errors are only returned for failures before that
    /// point; pump failures are logged here and reported as a lost connection.
    pub(super) async fn attempt(&self, server: SocketAddr) -> Result<bool> {
        let socket = Arc::new(self.open_transport(server)?);

        let settings = InterfaceSettings::from_tunnel(
            self.tunnel.as_ref(),
            self.config.dns_server,
            &self.config.server,
            self.configure_intent.clone(),
        );
        let iface = interface::establish(self.host.as_ref(), &settings, self.on_establish.as_ref())?;

        self.set_state(RelayState::Connected);
        info!(device = %iface.name(), "Connected");

        let attempt_stop = self.stop.child();
        let timing = Arc::new(LinkTiming::new());

        let inbound = InboundPump::spawn(
            Arc::clone(&iface),
            Arc::clone(&socket),
            Arc::clone(&timing),
            attempt_stop.clone(),
            InboundConfig {
                keepalive_interval: self.config.keepalive_interval(),
                receive_timeout: self.config.receive_timeout(),
            },
        );

        let outbound_result = outbound::run(
            iface.as_ref(),
            &socket,
            &timing,
            &attempt_stop,
            self.config.idle_interval(),
        )
        .await;

        inbound.stop();
        let inbound_result = inbound.join().await;

        if let Err(e) = iface.close() {
            warn!(device = %iface.name(), error = %e, "Unable to close interface");
        }

        for (direction, result) in [("outbound", outbound_result), ("inbound", inbound_result)] {
            match result {
                Ok(stats) => {
                    debug!(direction, packets = stats.packets, bytes = stats.bytes, "Pump finished");
                }
                Err(e) => warn!(direction, error = %e, "Connection lost, will retry"),
            }
        }

        Ok(true)
    }

    /// Create, protect and connect the tunnel socket.
    fn open_transport(&self, server: SocketAddr) -> Result<UdpSocket> {
        let bind_addr: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = std::net::UdpSocket::bind(bind_addr)?;

        // Protect before connecting so the handshake never enters the tunnel.
        self.protect(socket.as_raw_fd())?;
        while let Some(fd) = self.tunnel.next_auxiliary_socket() {
            debug!(fd, "Protecting auxiliary socket");
            self.protect(fd)?;
        }

        socket.connect(server)?;
        socket.set_nonblocking(true)?;

        let local = socket.local_addr()?;
        self.tunnel.set_local_addr(local);
        debug!(%local, %server, "Tunnel socket connected");

        Ok(UdpSocket::from_std(socket)?)
    }

    fn protect(&self, fd: RawFd) -> Result<()> {
        if self.host.protect(fd) {
            Ok(())
        } else {
            Err(Error::ProtectFailed { fd })
        }
    }
}
