//! Endpoint protocols: one object per live connection.
//!
//! An endpoint sits between the socket driver and the [`PortAgent`].  The
//! driver calls `connection_made`, then `data_received` for every chunk it
//! reads, then `connection_lost`.  The endpoint turns those calls into agent
//! notifications and packets for its role.
//!
//! | kind                               | inbound bytes become               |
//! |------------------------------------|------------------------------------|
//! | instrument, `PassThrough`          | packets of the configured type     |
//! | instrument, `BinaryTimestampSetting` | same, after enabling timestamps  |
//! | instrument, `PassThroughUnchanged` | verbatim packets                   |
//! | client data                        | packets of the configured type     |
//! | client command                     | one packet per newline-ended line  |
//! | client sniffer                     | nothing (passive)                  |

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use agent_core::{EndpointConfig, EndpointKind, Packet, ProtocolVariant};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::port_agent::{ConnectionHandle, PortAgent};

/// Command sent to a terminal server's command port to make it prefix data
/// with binary timestamps.
pub const BINARY_TIMESTAMP_COMMAND: &[u8] = b"time 2\n";

/// Longest command line buffered before it is forwarded regardless.
const MAX_COMMAND_LINE: usize = 64 * 1024;

/// Per-connection protocol object.
pub trait EndpointProtocol: Send {
    /// The connection this endpoint serves.
    fn handle(&self) -> &ConnectionHandle;

    /// The socket is up; called once before any data.
    fn connection_made(&mut self);

    /// A chunk of bytes was read from the socket.
    fn data_received(&mut self, data: &[u8]);

    /// The socket closed; called once, last.
    fn connection_lost(&mut self);
}

/// A freshly built endpoint and the queue its driver writes from.
pub struct Connection {
    pub endpoint: Box<dyn EndpointProtocol>,
    pub outbound: mpsc::Receiver<Vec<u8>>,
}

impl Connection {
    pub fn handle(&self) -> &ConnectionHandle {
        self.endpoint.handle()
    }
}

/// Accept counters owned by a listener.  Endpoints hold a `Weak` to it and
/// report their own closure.
#[derive(Debug, Default)]
pub struct BinderStats {
    accepted: AtomicU64,
    live: AtomicUsize,
}

impl BinderStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub(crate) fn record_accept(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::Relaxed);
    }

    fn record_close(&self) {
        let _ = self
            .live
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }
}

/// Builds the endpoint for `kind` around a new connection handle.
///
/// `origin` is the accepting listener's stats, if any; upstream connections
/// pass `None`.
pub fn build_connection(
    kind: EndpointKind,
    config: EndpointConfig,
    peer: Option<SocketAddr>,
    agent: &Arc<dyn PortAgent>,
    origin: Option<Weak<BinderStats>>,
) -> Connection {
    let (handle, outbound) = ConnectionHandle::new(kind.role(), config, peer);
    let agent = Arc::clone(agent);

    let endpoint: Box<dyn EndpointProtocol> = match kind {
        EndpointKind::Instrument { variant, .. } => match variant {
            ProtocolVariant::PassThrough => Box::new(PassThroughEndpoint { handle, agent }),
            ProtocolVariant::BinaryTimestampSetting => Box::new(TimestampingEndpoint {
                inner: PassThroughEndpoint { handle, agent },
            }),
            ProtocolVariant::PassThroughUnchanged => Box::new(VerbatimEndpoint { handle, agent }),
        },
        EndpointKind::ClientData => Box::new(ClientEndpoint {
            handle,
            agent,
            origin,
            passive: false,
        }),
        EndpointKind::ClientSniffer => Box::new(ClientEndpoint {
            handle,
            agent,
            origin,
            passive: true,
        }),
        EndpointKind::ClientCommand => Box::new(CommandEndpoint {
            handle,
            agent,
            origin,
            pending: Vec::new(),
        }),
    };

    Connection { endpoint, outbound }
}

fn notify_lost(agent: &Arc<dyn PortAgent>, handle: &ConnectionHandle) {
    agent.endpoint_disconnected(handle.id(), handle.role());
}

fn release(origin: &Option<Weak<BinderStats>>) {
    if let Some(stats) = origin.as_ref().and_then(Weak::upgrade) {
        stats.record_close();
    }
}

// ── Instrument endpoints ──────────────────────────────────────────────────────

/// Wraps raw instrument bytes.
struct PassThroughEndpoint {
    handle: ConnectionHandle,
    agent: Arc<dyn PortAgent>,
}

impl EndpointProtocol for PassThroughEndpoint {
    fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    fn connection_made(&mut self) {
        self.agent.endpoint_connected(self.handle.clone());
    }

    fn data_received(&mut self, data: &[u8]) {
        let packet = Packet::wrap(self.handle.endpoint(), self.handle.id(), data.to_vec());
        self.agent.route(packet);
    }

    fn connection_lost(&mut self) {
        notify_lost(&self.agent, &self.handle);
    }
}

/// Pass-through that first switches the terminal server to binary timestamps.
struct TimestampingEndpoint {
    inner: PassThroughEndpoint,
}

impl EndpointProtocol for TimestampingEndpoint {
    fn handle(&self) -> &ConnectionHandle {
        self.inner.handle()
    }

    fn connection_made(&mut self) {
        // Queued ahead of anything the agent routes here once it knows about us.
        if self.inner.handle.send(BINARY_TIMESTAMP_COMMAND.to_vec()) {
            debug!(connection = %self.inner.handle.id(), "requested binary timestamps");
        } else {
            warn!(connection = %self.inner.handle.id(), "could not queue binary timestamp command");
        }
        self.inner.connection_made();
    }

    fn data_received(&mut self, data: &[u8]) {
        self.inner.data_received(data);
    }

    fn connection_lost(&mut self) {
        self.inner.connection_lost();
    }
}

/// Upstream that already speaks port agent packets.
struct VerbatimEndpoint {
    handle: ConnectionHandle,
    agent: Arc<dyn PortAgent>,
}

impl EndpointProtocol for VerbatimEndpoint {
    fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    fn connection_made(&mut self) {
        self.agent.endpoint_connected(self.handle.clone());
    }

    fn data_received(&mut self, data: &[u8]) {
        let packet = Packet::verbatim(self.handle.endpoint(), self.handle.id(), data.to_vec());
        self.agent.route(packet);
    }

    fn connection_lost(&mut self) {
        notify_lost(&self.agent, &self.handle);
    }
}

// ── Client endpoints ──────────────────────────────────────────────────────────

/// Data client, or a passive sniffer whose input is dropped.
struct ClientEndpoint {
    handle: ConnectionHandle,
    agent: Arc<dyn PortAgent>,
    origin: Option<Weak<BinderStats>>,
    passive: bool,
}

impl EndpointProtocol for ClientEndpoint {
    fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    fn connection_made(&mut self) {
        self.agent.endpoint_connected(self.handle.clone());
    }

    fn data_received(&mut self, data: &[u8]) {
        if self.passive {
            trace!(connection = %self.handle.id(), len = data.len(), "sniffer input discarded");
            return;
        }
        let packet = Packet::wrap(self.handle.endpoint(), self.handle.id(), data.to_vec());
        self.agent.route(packet);
    }

    fn connection_lost(&mut self) {
        notify_lost(&self.agent, &self.handle);
        release(&self.origin);
    }
}

/// Command client.  Forwards one packet per complete line.
struct CommandEndpoint {
    handle: ConnectionHandle,
    agent: Arc<dyn PortAgent>,
    origin: Option<Weak<BinderStats>>,
    pending: Vec<u8>,
}

impl CommandEndpoint {
    fn forward(&self, line: Vec<u8>) {
        let packet = Packet::wrap(self.handle.endpoint(), self.handle.id(), line);
        self.agent.route(packet);
    }
}

impl EndpointProtocol for CommandEndpoint {
    fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    fn connection_made(&mut self) {
        self.agent.endpoint_connected(self.handle.clone());
    }

    fn data_received(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.forward(line);
        }

        if self.pending.len() > MAX_COMMAND_LINE {
            warn!(
                connection = %self.handle.id(),
                len = self.pending.len(),
                "command line too long; forwarding unterminated"
            );
            let line = std::mem::take(&mut self.pending);
            self.forward(line);
        }
    }

    fn connection_lost(&mut self) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.forward(line);
        }
        notify_lost(&self.agent, &self.handle);
        release(&self.origin);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
