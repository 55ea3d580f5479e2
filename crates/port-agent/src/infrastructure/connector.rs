//! Reconnecting upstream connector.
//!
//! Keeps exactly one connection to an instrument endpoint alive for the life
//! of the process.  The loop is strictly sequential:
//!
//! ```text
//! ┌─► dial ──ok──► build endpoint, reset backoff ──► drive until closed ─┐
//! │     │                                                               │
//! │     └─err──► log failure ───────────────────────────────────────────┤
//! │                                                                     ▼
//! └──────────── sleep(backoff.next_delay())  ◄── unless shutting down ──┘
//! ```
//!
//! Because dialling, driving and sleeping happen one after another in a
//! single task, there is never more than one attempt in flight and no new
//! attempt while a connection is live.  Shutdown interrupts whichever step is
//! pending, including the reconnect sleep.

use std::sync::{Arc, Mutex, PoisonError};

use agent_core::{Backoff, EndpointConfig, EndpointKind, RelayError};
use tokio::time;
use tracing::{info, warn};

use crate::application::{build_connection, ConnectionHandle, PortAgent, WeakConnection};
use crate::domain::UpstreamSpec;
use crate::infrastructure::dialer::{Dialer, TcpDialer};
use crate::infrastructure::driver::drive_connection;
use crate::infrastructure::shutdown::ShutdownSignal;

/// Shared, non-owning view of a connector's current connection.
#[derive(Debug, Clone, Default)]
pub struct ActiveConnection {
    slot: Arc<Mutex<WeakConnection>>,
}

impl ActiveConnection {
    /// The live connection, if there is one.
    pub fn get(&self) -> Option<ConnectionHandle> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    fn bind(&self, handle: &ConnectionHandle) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = handle.downgrade();
    }
}

/// Maintains the connection to one instrument address.
pub struct InstrumentConnector<D: Dialer = TcpDialer> {
    address: String,
    kind: EndpointKind,
    endpoint: EndpointConfig,
    backoff: Backoff,
    dialer: D,
    agent: Arc<dyn PortAgent>,
    active: ActiveConnection,
}

impl InstrumentConnector<TcpDialer> {
    /// A connector dialling over plain TCP.
    ///
    /// # Errors
    ///
    /// See [`InstrumentConnector::with_dialer`].
    pub fn new(spec: &UpstreamSpec, agent: Arc<dyn PortAgent>) -> Result<Self, RelayError> {
        Self::with_dialer(spec, agent, TcpDialer)
    }
}

impl<D: Dialer> InstrumentConnector<D> {
    /// # Errors
    ///
    /// - [`RelayError::MisconfiguredRole`] if `spec.role` is a client role.
    /// - A policy error if `spec.policy` is invalid.
    pub fn with_dialer(
        spec: &UpstreamSpec,
        agent: Arc<dyn PortAgent>,
        dialer: D,
    ) -> Result<Self, RelayError> {
        let kind = EndpointKind::upstream(spec.role, spec.variant)?;
        let backoff = Backoff::new(spec.policy)?;
        Ok(Self {
            address: spec.address.clone(),
            kind,
            endpoint: spec.endpoint,
            backoff,
            dialer,
            agent,
            active: ActiveConnection::default(),
        })
    }

    /// Diagnostic view of the current connection; stays valid after `run`
    /// starts.
    pub fn active_connection(&self) -> ActiveConnection {
        self.active.clone()
    }

    /// Connects, reconnects and drives connections until shutdown.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) {
        let role = self.kind.role();

        loop {
            let attempt = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                result = self.dialer.dial(&self.address) => result,
            };

            match attempt {
                Ok(stream) => {
                    info!(event = "instrument_connected", address = %self.address, role = %role);
                    let connection = build_connection(self.kind, self.endpoint, None, &self.agent, None);
                    self.active.bind(connection.handle());
                    self.backoff.reset();

                    drive_connection(stream, connection, shutdown.clone()).await;
                    info!(event = "instrument_disconnected", address = %self.address, role = %role);
                }
                Err(e) => {
                    warn!(
                        event = "connect_failed",
                        address = %self.address,
                        role = %role,
                        error = %e
                    );
                }
            }

            if shutdown.is_triggered() {
                break;
            }

            let delay = self.backoff.next_delay();
            info!(
                event = "reconnect_scheduled",
                address = %self.address,
                delay_ms = delay.as_millis() as u64,
                retries = self.backoff.retries()
            );

            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!(address = %self.address, "pending reconnect cancelled");
                    break;
                }
                _ = time::sleep(delay) => {}
            }
        }

        info!(address = %self.address, role = %role, "connector stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
