//! Outbound pump: virtual interface → transport socket.

use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::error::Result;
use crate::host::VirtualInterface;
use crate::MAX_PACKET_SIZE;

use super::stop::StopSignal;
use super::timing::LinkTiming;
use super::PumpStats;

/// Forward packets read from `iface` to `socket` until `stop` is requested.
///
/// Runs on the supervisor's task. One buffer is reused for every packet and
/// every packet becomes exactly one datagram of the same length.
pub(super) async fn run(
    iface: &dyn VirtualInterface,
    socket: &UdpSocket,
    timing: &LinkTiming,
    stop: &StopSignal,
    idle_interval: Duration,
) -> Result<PumpStats> {
    let mut packet = vec![0u8; MAX_PACKET_SIZE];
    let mut stats = PumpStats::default();

    debug!(device = %iface.name(), "Start forwarding outbound packets");

    loop {
        if stop.is_requested() {
            break;
        }

        let length = tokio::select! {
            biased;
            _ = stop.requested() => break,
            read = iface.recv(&mut packet) => read?,
        };

        if length == 0 {
            // Nothing queued on the interface.
            tokio::select! {
                biased;
                _ = stop.requested() => break,
                _ = tokio::time::sleep(idle_interval) => {}
            }
            continue;
        }

        socket.send(&packet[..length]).await?;
        timing.mark_sent();
        stats.record(length);
        trace!(len = length, "Outbound packet");
    }

    debug!(packets = stats.packets, bytes = stats.bytes, "Outbound pump stopped");
    Ok(stats)
}
