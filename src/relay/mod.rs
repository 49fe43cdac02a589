//! Packet relay between the virtual interface and the tunnel socket.
//!
//! This module contains:
//! - `connection.rs`: the supervisor and its retry state machine
//! - `attempt.rs`: one acquire → pump → teardown cycle
//! - `outbound.rs` / `inbound.rs`: the two pump directions
//! - `stop.rs`: the cooperative stop signal
//! - `timing.rs`: keepalive bookkeeping shared by both pumps
//! - `state.rs`: externally observable connection state

mod attempt;
mod connection;
mod inbound;
mod outbound;
mod state;
mod stop;
mod timing;

pub use connection::Connection;
pub use inbound::{is_control_message, InboundConfig, InboundPump, KEEPALIVE_PACKET};
pub use state::RelayState;
pub use stop::StopSignal;
pub use timing::LinkTiming;

/// Counters of one pump direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub packets: u64,
    pub bytes: u64,
}

impl PumpStats {
    #[inline]
    fn record(&mut self, len: usize) {
        self.packets += 1;
        self.bytes += len as u64;
    }
}
