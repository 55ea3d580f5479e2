//! Downstream listener binders.
//!
//! A binder is configured once with a client role and the
//! `(packet_type, endpoint_type)` pair for that role; every connection it
//! accepts gets a fresh endpoint built from that fixed configuration.
//! Clients that drop are never retried.  The binder just waits for the next
//! accept.
//!
//! [`CommandRegistrar`] is the binder for command clients: it also hands each
//! new connection to the agent's command registry before the connection's
//! first byte is read.

use std::net::SocketAddr;
use std::sync::Arc;

use agent_core::{ConnectionRole, EndpointConfig, EndpointKind, RelayError};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::application::{build_connection, BinderStats, Connection, PortAgent};
use crate::infrastructure::driver::drive_connection;
use crate::infrastructure::shutdown::ShutdownSignal;

/// Turns an accepted socket into a connection ready to drive.
pub trait Acceptor: Send + Sync + 'static {
    fn role(&self) -> ConnectionRole;

    /// Builds the endpoint for one accepted client.
    fn on_accept(&self, peer: Option<SocketAddr>) -> Connection;
}

/// Binder for data and sniffer clients.
pub struct ListenerBinder {
    kind: EndpointKind,
    endpoint: EndpointConfig,
    agent: Arc<dyn PortAgent>,
    stats: Arc<BinderStats>,
}

impl ListenerBinder {
    /// # Errors
    ///
    /// [`RelayError::MisconfiguredRole`] for instrument roles, and for
    /// [`ConnectionRole::ClientCommand`], which must go through
    /// [`CommandRegistrar`] so its connections get registered.
    pub fn new(
        role: ConnectionRole,
        endpoint: EndpointConfig,
        agent: Arc<dyn PortAgent>,
    ) -> Result<Self, RelayError> {
        if role == ConnectionRole::ClientCommand {
            return Err(RelayError::MisconfiguredRole {
                role,
                reason: "command clients must be accepted by a command registrar",
            });
        }
        Ok(Self::for_kind(EndpointKind::downstream(role)?, endpoint, agent))
    }

    fn for_kind(kind: EndpointKind, endpoint: EndpointConfig, agent: Arc<dyn PortAgent>) -> Self {
        Self {
            kind,
            endpoint,
            agent,
            stats: Arc::new(BinderStats::default()),
        }
    }

    pub fn endpoint(&self) -> EndpointConfig {
        self.endpoint
    }

    pub fn stats(&self) -> &BinderStats {
        &self.stats
    }

    fn build(&self, peer: Option<SocketAddr>) -> Connection {
        self.stats.record_accept();
        let connection = build_connection(
            self.kind,
            self.endpoint,
            peer,
            &self.agent,
            Some(Arc::downgrade(&self.stats)),
        );
        info!(
            event = "client_accepted",
            role = %self.kind.role(),
            address = ?peer,
            connection = %connection.handle().id()
        );
        connection
    }
}

impl Acceptor for ListenerBinder {
    fn role(&self) -> ConnectionRole {
        self.kind.role()
    }

    fn on_accept(&self, peer: Option<SocketAddr>) -> Connection {
        self.build(peer)
    }
}

/// Binder for command clients.
pub struct CommandRegistrar {
    binder: ListenerBinder,
}

impl CommandRegistrar {
    pub fn new(endpoint: EndpointConfig, agent: Arc<dyn PortAgent>) -> Self {
        Self {
            binder: ListenerBinder::for_kind(EndpointKind::ClientCommand, endpoint, agent),
        }
    }

    pub fn stats(&self) -> &BinderStats {
        self.binder.stats()
    }
}

impl Acceptor for CommandRegistrar {
    fn role(&self) -> ConnectionRole {
        ConnectionRole::ClientCommand
    }

    fn on_accept(&self, peer: Option<SocketAddr>) -> Connection {
        let connection = self.binder.build(peer);
        // Synchronous, before the driver exists, so no inbound byte can precede it.
        self.binder.agent.register_commands(connection.handle().clone());
        connection
    }
}

/// Accepts clients on `listener` until shutdown, driving each on its own task.
///
/// Accept errors are logged and the loop keeps going.  Returns only after
/// every client accepted here has been torn down.
pub async fn serve_listener<A: Acceptor>(
    acceptor: Arc<A>,
    listener: TcpListener,
    mut shutdown: ShutdownSignal,
) {
    let role = acceptor.role();
    let local = listener.local_addr().ok();
    let mut clients = JoinSet::new();
    info!(event = "listening", role = %role, address = ?local);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.wait() => break,

            Some(finished) = clients.join_next(), if !clients.is_empty() => {
                if let Err(e) = finished {
                    error!(role = %role, "client task failed: {e}");
                }
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(role = %role, address = %peer, "set_nodelay failed: {e}");
                    }
                    let connection = acceptor.on_accept(Some(peer));
                    clients.spawn(drive_connection(stream, connection, shutdown.clone()));
                }
                Err(e) => {
                    error!(role = %role, "accept failed: {e}");
                }
            },
        }
    }

    drop(listener);
    while let Some(finished) = clients.join_next().await {
        if let Err(e) = finished {
            error!(role = %role, "client task failed: {e}");
        }
    }

    info!(role = %role, address = ?local, "listener stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
