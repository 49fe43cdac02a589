//! Link timing shared by the two pump directions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Send-side activity of one attempt's transport socket.
///
/// The outbound pump marks every datagram it sends; the inbound pump reads
/// the mark to schedule the next keepalive. Stored as milliseconds since the
/// attempt started so no lock is needed.
#[derive(Debug)]
pub struct LinkTiming {
    started: Instant,
    last_send_ms: AtomicU64,
}

impl LinkTiming {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_send_ms: AtomicU64::new(0),
        }
    }

    /// Mark a datagram sent.
    pub fn mark_sent(&self) {
        let now_ms = self.started.elapsed().as_millis() as u64;
        self.last_send_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Instant of the last send, or of the attempt start.
    pub fn last_send(&self) -> Instant {
        self.started + Duration::from_millis(self.last_send_ms.load(Ordering::Relaxed))
    }

    /// When a keepalive becomes due if nothing else is sent before.
    pub fn keepalive_deadline(&self, interval: Duration) -> Instant {
        self.last_send() + interval
    }

    /// Time since the last send, or since the attempt started.
    pub fn since_last_send(&self) -> Duration {
        self.last_send().elapsed()
    }

    /// Check if we should send keepalive.
    pub fn should_send_keepalive(&self, interval: Duration) -> bool {
        Instant::now() >= self.keepalive_deadline(interval)
    }
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self::new()
    }
}
