//! Connection supervisor.
//!
//! Resolves the server once, then runs attempts until stopped or until
//! `max_attempts` consecutive attempts failed to get connected.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::host::{ConfigureIntent, EstablishListener, HostPlatform, TunnelLibrary};

use super::state::RelayState;
use super::stop::StopSignal;

/// One logical VPN session.
pub struct Connection {
    pub(super) config: RelayConfig,
    pub(super) host: Arc<dyn HostPlatform>,
    pub(super) tunnel: Arc<dyn TunnelLibrary>,
    pub(super) configure_intent: Option<ConfigureIntent>,
    pub(super) on_establish: Option<EstablishListener>,
    pub(super) stop: StopSignal,
    state: watch::Sender<RelayState>,
    running: AtomicBool,
}

impl Connection {
    pub fn new(
        config: RelayConfig,
        host: Arc<dyn HostPlatform>,
        tunnel: Arc<dyn TunnelLibrary>,
    ) -> Self {
        let (state, _) = watch::channel(RelayState::Idle);
        Self {
            config,
            host,
            tunnel,
            configure_intent: None,
            on_establish: None,
            stop: StopSignal::new(),
            state,
            running: AtomicBool::new(false),
        }
    }

    /// Attach an opaque value to the interface session. Not interpreted here.
    pub fn with_configure_intent(mut self, intent: ConfigureIntent) -> Self {
        self.configure_intent = Some(intent);
        self
    }

    /// Register the listener fired for every newly established interface.
    pub fn with_establish_listener(mut self, listener: EstablishListener) -> Self {
        self.on_establish = Some(listener);
        self
    }

    pub fn id(&self) -> u32 {
        self.config.connection_id
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Log tag identifying this connection.
    pub fn tag(&self) -> String {
        format!("VpnConnection[{}]", self.config.connection_id)
    }

    pub fn state(&self) -> RelayState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    pub(super) fn set_state(&self, state: RelayState) {
        self.state.send_replace(state);
    }

    /// Run the supervisor on its own task.
    pub fn start(self: &Arc<Self>) -> JoinHandle<Result<()>> {
        let conn = Arc::clone(self);
        tokio::spawn(async move { conn.run().await })
    }

    /// Request stop. Idempotent and safe at any point, including before start.
    ///
    /// The active attempt's pumps observe it through their child signals.
    pub fn stop(&self) {
        if !self.stop.is_requested() {
            info!(tag = %self.tag(), "Stop requested");
        }
        self.stop.request();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_requested()
    }

    /// Run the attempt/retry loop on the caller's task.
    pub async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }

        let span = info_span!("connection", id = self.config.connection_id,
            server = %self.config.server, port = self.config.port);
        let result = self.supervise().instrument(span).await;

        match &result {
            Ok(()) => self.set_state(RelayState::Stopped),
            Err(e) => self.set_state(RelayState::Failed(e.to_string())),
        }
        result
    }

    async fn supervise(&self) -> Result<()> {
        info!("Starting");

        if self.stop.is_requested() {
            info!("Stopped before the first attempt");
            return Ok(());
        }

        let server = tokio::select! {
            biased;
            _ = self.stop.requested() => return Ok(()),
            resolved = self.resolve() => resolved?,
        };

        let max_attempts = self.config.max_attempts;
        let mut failures: u32 = 0;

        while !self.stop.is_requested() {
            self.set_state(RelayState::Connecting {
                attempt: failures + 1,
            });

            let connected = match self.attempt(server).await {
                Ok(connected) => connected,
                Err(e) if !e.is_retriable() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Attempt failed");
                    false
                }
            };

            if connected {
                failures = 0;
            } else {
                failures += 1;
            }

            if self.stop.is_requested() {
                break;
            }

            if failures >= max_attempts {
                error!(attempts = failures, "Giving up");
                return Err(Error::AttemptsExhausted { attempts: failures });
            }

            self.set_state(RelayState::Reconnecting { failures });
            tokio::select! {
                biased;
                _ = self.stop.requested() => break,
                _ = tokio::time::sleep(self.config.retry_interval()) => {}
            }
        }

        info!("Stopped");
        Ok(())
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        let host = self.config.server.as_str();
        let mut addrs = tokio::net::lookup_host((host, self.config.port))
            .await
            .map_err(|e| Error::DnsResolution(format!("{host}: {e}")))?;
        let addr = addrs
            .next()
            .ok_or_else(|| Error::DnsResolution(format!("{host}: no addresses")))?;
        info!(%addr, "Resolved server");
        Ok(addr)
    }
}
