//! The seam between the connection layer and whoever owns the agent.
//!
//! Connectors, listeners and endpoint protocols know the agent only through
//! the [`PortAgent`] trait.  Each live connection is represented by a
//! [`ConnectionHandle`]: a cheap clone carrying its identity and a queue for
//! bytes that should be written to it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use agent_core::{ConnectionId, ConnectionRole, EndpointConfig, Packet};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Writes queued per connection before further writes are dropped.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 128;

/// Capabilities the connection layer consumes from the agent.
///
/// All methods are called from the connection's own task and must not block.
#[cfg_attr(test, mockall::automock)]
pub trait PortAgent: Send + Sync {
    /// Adds a freshly accepted command connection to the command registry.
    ///
    /// Called exactly once per command connection, before any of its bytes
    /// are processed.  Removing it again is the agent's job, on
    /// [`PortAgent::endpoint_disconnected`].
    fn register_commands(&self, connection: ConnectionHandle);

    /// A connection of any role is up and ready to receive bytes.
    fn endpoint_connected(&self, connection: ConnectionHandle);

    /// A connection of any role has closed.
    fn endpoint_disconnected(&self, id: ConnectionId, role: ConnectionRole);

    /// Bytes read from a connection, tagged with that connection's config.
    fn route(&self, packet: Packet);
}

#[derive(Debug)]
struct HandleInner {
    id: ConnectionId,
    role: ConnectionRole,
    endpoint: EndpointConfig,
    peer: Option<SocketAddr>,
    outbound: mpsc::Sender<Vec<u8>>,
    /// Set while writes are being dropped, so a stalled peer logs once.
    congested: AtomicBool,
}

/// Identity of, and write access to, one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Creates a handle with a fresh id, plus the receiving end of its
    /// outbound queue for the task that drives the socket.
    pub fn new(
        role: ConnectionRole,
        endpoint: EndpointConfig,
        peer: Option<SocketAddr>,
    ) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (outbound, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let handle = Self {
            inner: Arc::new(HandleInner {
                id: ConnectionId::new(),
                role,
                endpoint,
                peer,
                outbound,
                congested: AtomicBool::new(false),
            }),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn role(&self) -> ConnectionRole {
        self.inner.role
    }

    pub fn endpoint(&self) -> EndpointConfig {
        self.inner.endpoint
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.inner.peer
    }

    /// Queues `bytes` for writing without waiting.
    ///
    /// Returns `false` if the connection has gone away, or if its queue is
    /// full because the peer stopped reading; in that case `bytes` is dropped.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        match self.inner.outbound.try_send(bytes) {
            Ok(()) => {
                if self.inner.congested.swap(false, Ordering::Relaxed) {
                    debug!(connection = %self.inner.id, "peer caught up; writes resumed");
                }
                true
            }
            Err(TrySendError::Full(dropped)) => {
                if !self.inner.congested.swap(true, Ordering::Relaxed) {
                    warn!(
                        connection = %self.inner.id,
                        role = %self.inner.role,
                        len = dropped.len(),
                        "outbound queue full; dropping writes until the peer catches up"
                    );
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// `true` once the task driving this connection has finished.
    pub fn is_closed(&self) -> bool {
        self.inner.outbound.is_closed()
    }

    /// A non-owning reference, for status lookups.
    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection(Arc::downgrade(&self.inner))
    }
}

/// Non-owning reference to a connection.
#[derive(Debug, Clone, Default)]
pub struct WeakConnection(Weak<HandleInner>);

impl WeakConnection {
    /// Returns the handle if the connection is still open.
    pub fn upgrade(&self) -> Option<ConnectionHandle> {
        self.0
            .upgrade()
            .map(|inner| ConnectionHandle { inner })
            .filter(|handle| !handle.is_closed())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
