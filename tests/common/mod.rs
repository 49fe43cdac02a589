//! In-memory host, tunnel and interface used by the relay tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use skywire_vpn::{
    Connection, HostPlatform, InterfaceSettings, RelayConfig, RelayState, TunnelLibrary,
    VirtualInterface,
};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Packets queued for the interface to "read" and a sink for what it "writes".
#[derive(Clone)]
struct Wire {
    outgoing: Arc<Mutex<VecDeque<Vec<u8>>>>,
    delivered: mpsc::UnboundedSender<Vec<u8>>,
    /// Interface reads left to fail with an I/O error.
    failing_reads: Arc<AtomicU32>,
}

/// Virtual interface backed by memory. Reads never block: an empty queue
/// reads as zero bytes, like a non-blocking TUN descriptor.
pub struct MemoryInterface {
    name: String,
    wire: Wire,
    closed: Arc<AtomicU32>,
}

#[async_trait]
impl VirtualInterface for MemoryInterface {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let failing = &self.wire.failing_reads;
        if failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(io::Error::other("interface read failed"));
        }
        match self.wire.outgoing.lock().pop_front() {
            Some(packet) => {
                buf[..packet.len()].copy_from_slice(&packet);
                Ok(packet.len())
            }
            None => Ok(0),
        }
    }

    async fn send(&self, packet: &[u8]) -> io::Result<usize> {
        self.wire
            .delivered
            .send(packet.to_vec())
            .map_err(|_| io::Error::other("receiver dropped"))?;
        Ok(packet.len())
    }

    fn close(&self) -> io::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Host recording every call it receives.
pub struct MockHost {
    pub protect_ok: AtomicBool,
    /// Descriptors refused even while `protect_ok` holds.
    pub refused_fds: Mutex<Vec<RawFd>>,
    pub protected: Mutex<Vec<RawFd>>,
    pub establish_calls: AtomicU32,
    /// Outcomes of the next establish calls; `establish_default` once drained.
    pub establish_plan: Mutex<VecDeque<bool>>,
    pub establish_default: AtomicBool,
    pub closed: Arc<AtomicU32>,
    pub last_settings: Mutex<Option<InterfaceSettings>>,
    wire: Wire,
}

impl MockHost {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = Self {
            protect_ok: AtomicBool::new(true),
            refused_fds: Mutex::new(Vec::new()),
            protected: Mutex::new(Vec::new()),
            establish_calls: AtomicU32::new(0),
            establish_plan: Mutex::new(VecDeque::new()),
            establish_default: AtomicBool::new(true),
            closed: Arc::new(AtomicU32::new(0)),
            last_settings: Mutex::new(None),
            wire: Wire {
                outgoing: Arc::new(Mutex::new(VecDeque::new())),
                delivered: tx,
                failing_reads: Arc::new(AtomicU32::new(0)),
            },
        };
        (Arc::new(host), rx)
    }

    /// Queue a packet as if an app had written it to the interface.
    pub fn push_outgoing(&self, packet: Vec<u8>) {
        self.wire.outgoing.lock().push_back(packet);
    }

    /// Make the next `n` interface reads fail.
    pub fn fail_next_reads(&self, n: u32) {
        self.wire.failing_reads.store(n, Ordering::SeqCst);
    }

    pub fn protect_calls(&self) -> usize {
        self.protected.lock().len()
    }

    pub fn establish_calls(&self) -> u32 {
        self.establish_calls.load(Ordering::SeqCst)
    }
}

impl HostPlatform for MockHost {
    fn protect(&self, fd: RawFd) -> bool {
        self.protected.lock().push(fd);
        self.protect_ok.load(Ordering::SeqCst) && !self.refused_fds.lock().contains(&fd)
    }

    fn establish(&self, settings: &InterfaceSettings) -> io::Result<Arc<dyn VirtualInterface>> {
        let n = self.establish_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_settings.lock() = Some(settings.clone());

        let ok = self
            .establish_plan
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.establish_default.load(Ordering::SeqCst));
        if !ok {
            return Err(io::Error::other("establish refused"));
        }

        Ok(Arc::new(MemoryInterface {
            name: format!("mem{n}"),
            wire: self.wire.clone(),
            closed: Arc::clone(&self.closed),
        }))
    }
}

/// Tunneling library with fixed parameters.
pub struct MockTunnel {
    pub auxiliary: Mutex<Vec<RawFd>>,
    pub local_addr: Mutex<Option<SocketAddr>>,
}

impl MockTunnel {
    pub fn new() -> Arc<Self> {
        Self::with_auxiliary(Vec::new())
    }

    pub fn with_auxiliary(fds: Vec<RawFd>) -> Arc<Self> {
        Arc::new(Self {
            auxiliary: Mutex::new(fds),
            local_addr: Mutex::new(None),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

impl TunnelLibrary for MockTunnel {
    fn next_auxiliary_socket(&self) -> Option<RawFd> {
        let mut fds = self.auxiliary.lock();
        if fds.is_empty() {
            None
        } else {
            Some(fds.remove(0))
        }
    }

    fn tun_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 255, 6)
    }

    fn tun_prefix(&self) -> u8 {
        29
    }

    fn mtu(&self) -> u16 {
        1500
    }

    fn set_local_addr(&self, addr: SocketAddr) {
        *self.local_addr.lock() = Some(addr);
    }
}

/// A loopback UDP "server".
pub async fn server() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

/// Configuration pointing at `server` with test-friendly timings.
pub fn fast_config(server: &UdpSocket) -> RelayConfig {
    let mut config = RelayConfig::new("127.0.0.1", server.local_addr().unwrap().port());
    config.retry_interval_ms = 20;
    config.idle_interval_ms = 5;
    config.keepalive_interval_ms = 10_000;
    config.receive_timeout_ms = 10_000;
    config
}

/// An IPv4-looking packet of `len` bytes.
pub fn ip_packet(len: usize, fill: u8) -> Vec<u8> {
    let mut packet = vec![fill; len];
    packet[0] = 0x45;
    packet
}

/// Wait until the connection state satisfies `pred`.
pub async fn wait_for_state(conn: &Connection, pred: impl Fn(&RelayState) -> bool) {
    let mut states = conn.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if pred(&*states.borrow_and_update()) {
                return;
            }
            if states.changed().await.is_err() {
                return;
            }
        }
    })
    .await
    .expect("state not reached in time");
}

/// Poll `cond` until it holds.
pub async fn eventually(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
