//! Inbound pump: transport socket → virtual interface.
//!
//! Runs as its own task for the lifetime of one attempt. Besides forwarding it
//! keeps idle NAT mappings alive and detects a silent server.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, Instrument};

use crate::error::{Error, Result};
use crate::host::VirtualInterface;
use crate::MAX_PACKET_SIZE;

use super::stop::StopSignal;
use super::timing::LinkTiming;
use super::PumpStats;

/// Datagram sent on an idle link. IP packets never start with a zero byte,
/// so the server can tell it apart from traffic.
pub const KEEPALIVE_PACKET: [u8; 1] = [0];

/// Timings for the inbound direction.
#[derive(Debug, Clone, Copy)]
pub struct InboundConfig {
    pub keepalive_interval: Duration,
    pub receive_timeout: Duration,
}

/// Check if a received datagram is a control message rather than an IP packet.
pub fn is_control_message(datagram: &[u8]) -> bool {
    datagram.first().map_or(true, |b| *b == 0)
}

/// Handle to a running inbound pump.
pub struct InboundPump {
    stop: StopSignal,
    handle: JoinHandle<Result<PumpStats>>,
}

impl InboundPump {
    /// Spawn the pump for one attempt.
    ///
    /// `attempt` is requested when the pump fails so the outbound direction
    /// unwinds as well. The pump's own stop is a child of `attempt`.
    pub fn spawn(
        iface: Arc<dyn VirtualInterface>,
        socket: Arc<UdpSocket>,
        timing: Arc<LinkTiming>,
        attempt: StopSignal,
        config: InboundConfig,
    ) -> Self {
        let stop = attempt.child();
        let task_stop = stop.clone();

        let handle = tokio::spawn(
            async move {
                let result = run(iface.as_ref(), &socket, &timing, &task_stop, config).await;
                if result.is_err() {
                    attempt.request();
                }
                result
            }
            .in_current_span(),
        );

        Self { stop, handle }
    }

    /// Ask the pump to exit at its next check, regardless of socket activity.
    pub fn stop(&self) {
        self.stop.request();
    }

    /// Wait for the pump task to end.
    pub async fn join(self) -> Result<PumpStats> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::TaskFailed(e.to_string())),
        }
    }
}

async fn run(
    iface: &dyn VirtualInterface,
    socket: &UdpSocket,
    timing: &LinkTiming,
    stop: &StopSignal,
    config: InboundConfig,
) -> Result<PumpStats> {
    let mut packet = vec![0u8; MAX_PACKET_SIZE];
    let mut stats = PumpStats::default();

    let mut last_received = Instant::now();

    debug!(device = %iface.name(), "Start forwarding inbound packets");

    loop {
        // Recomputed every pass: every send on the socket pushes it out.
        let keepalive_at = Instant::from_std(timing.keepalive_deadline(config.keepalive_interval));

        tokio::select! {
            biased;

            _ = stop.requested() => break,

            _ = sleep_until(last_received + config.receive_timeout) => {
                return Err(Error::ServerGone(config.receive_timeout.as_millis() as u64));
            }

            received = socket.recv(&mut packet) => {
                let length = received?;
                last_received = Instant::now();

                if is_control_message(&packet[..length]) {
                    trace!(len = length, "Control message");
                    continue;
                }

                iface.send(&packet[..length]).await?;
                stats.record(length);
                trace!(len = length, "Inbound packet");
            }

            _ = sleep_until(keepalive_at) => {
                if timing.should_send_keepalive(config.keepalive_interval) {
                    socket.send(&KEEPALIVE_PACKET).await?;
                    timing.mark_sent();
                    trace!("Keepalive sent");
                }
            }
        }
    }

    debug!(packets = stats.packets, bytes = stats.bytes, "Inbound pump stopped");
    Ok(stats)
}
