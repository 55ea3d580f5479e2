//! In-process port agent: tracks live connections and routes packets.
//!
//! The [`Router`] is the concrete [`PortAgent`] the binary runs with.  It keeps
//! every live connection grouped by [`EndpointType`], plus the command
//! registry, and forwards each packet according to where it came from:
//!
//! ```text
//! Instrument / InstrumentData ──► Client, Logger
//! Digi (command responses)    ──► command registry, Logger
//! Client (driver data)        ──► Instrument, InstrumentData, Logger
//! Command                     ──► Digi, Logger
//! Logger / Unknown            ──► (dropped)
//! ```
//!
//! Payloads are forwarded as-is; framing them is not this layer's concern.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use agent_core::{ConnectionId, ConnectionRole, EndpointType, Packet};
use tracing::{debug, info, trace};

use super::port_agent::{ConnectionHandle, PortAgent};

/// Where a packet may be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination {
    Endpoints(EndpointType),
    CommandRegistry,
}

fn destinations(source: EndpointType) -> &'static [Destination] {
    use Destination::*;
    match source {
        EndpointType::Instrument | EndpointType::InstrumentData => &[
            Endpoints(EndpointType::Client),
            Endpoints(EndpointType::Logger),
        ],
        EndpointType::Digi => &[CommandRegistry, Endpoints(EndpointType::Logger)],
        EndpointType::Client => &[
            Endpoints(EndpointType::Instrument),
            Endpoints(EndpointType::InstrumentData),
            Endpoints(EndpointType::Logger),
        ],
        EndpointType::Command => &[
            Endpoints(EndpointType::Digi),
            Endpoints(EndpointType::Logger),
        ],
        EndpointType::Logger | EndpointType::Unknown => &[],
    }
}

#[derive(Debug, Default)]
struct RouterState {
    endpoints: HashMap<EndpointType, HashMap<ConnectionId, ConnectionHandle>>,
    commands: HashMap<ConnectionId, ConnectionHandle>,
}

/// Point-in-time connection counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterSnapshot {
    pub endpoints: HashMap<EndpointType, usize>,
    pub commands: usize,
}

impl RouterSnapshot {
    pub fn count(&self, endpoint_type: EndpointType) -> usize {
        self.endpoints.get(&endpoint_type).copied().unwrap_or(0)
    }
}

/// Routing port agent.
#[derive(Debug, Default)]
pub struct Router {
    state: Mutex<RouterState>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RouterState> {
        // A panic while holding the lock leaves the maps consistent enough to keep routing.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current connection counts, for diagnostics.
    pub fn snapshot(&self) -> RouterSnapshot {
        let state = self.state();
        RouterSnapshot {
            endpoints: state
                .endpoints
                .iter()
                .filter(|(_, conns)| !conns.is_empty())
                .map(|(ty, conns)| (*ty, conns.len()))
                .collect(),
            commands: state.commands.len(),
        }
    }
}

impl PortAgent for Router {
    fn register_commands(&self, connection: ConnectionHandle) {
        debug!(connection = %connection.id(), peer = ?connection.peer(), "command connection registered");
        self.state().commands.insert(connection.id(), connection);
    }

    fn endpoint_connected(&self, connection: ConnectionHandle) {
        let endpoint_type = connection.endpoint().endpoint_type;
        info!(
            event = "endpoint_connected",
            connection = %connection.id(),
            role = %connection.role(),
            address = ?connection.peer()
        );
        self.state()
            .endpoints
            .entry(endpoint_type)
            .or_default()
            .insert(connection.id(), connection);
    }

    fn endpoint_disconnected(&self, id: ConnectionId, role: ConnectionRole) {
        info!(event = "endpoint_disconnected", connection = %id, role = %role);
        let mut state = self.state();
        for conns in state.endpoints.values_mut() {
            conns.remove(&id);
        }
        state.commands.remove(&id);
    }

    fn route(&self, packet: Packet) {
        let state = self.state();
        let mut delivered = 0usize;

        for destination in destinations(packet.endpoint_type) {
            let targets: Box<dyn Iterator<Item = &ConnectionHandle> + '_> = match destination {
                Destination::Endpoints(ty) => match state.endpoints.get(ty) {
                    Some(conns) => Box::new(conns.values()),
                    None => continue,
                },
                Destination::CommandRegistry => Box::new(state.commands.values()),
            };
            for handle in targets.filter(|h| h.id() != packet.source) {
                if handle.send(packet.payload.clone()) {
                    delivered += 1;
                }
            }
        }

        trace!(
            source = %packet.source,
            endpoint_type = ?packet.endpoint_type,
            len = packet.payload.len(),
            delivered,
            "routed packet"
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{EndpointConfig, PacketType};
    use tokio::sync::mpsc::Receiver;

    fn connect(
        router: &Router,
        role: ConnectionRole,
        packet_type: PacketType,
        endpoint_type: EndpointType,
    ) -> (ConnectionHandle, Receiver<Vec<u8>>) {
        let (handle, rx) =
            ConnectionHandle::new(role, EndpointConfig::new(packet_type, endpoint_type), None);
        router.endpoint_connected(handle.clone());
        (handle, rx)
    }

    fn packet_from(handle: &ConnectionHandle, payload: &[u8]) -> Packet {
        Packet::wrap(handle.endpoint(), handle.id(), payload.to_vec())
    }

    #[test]
    fn test_instrument_data_reaches_every_client_and_sniffer() {
        // Arrange
        let router = Router::new();
        let (instrument, _irx) = connect(&router, ConnectionRole::InstrumentData, PacketType::FromInstrument, EndpointType::Instrument);
        let (_c1, mut c1_rx) = connect(&router, ConnectionRole::ClientData, PacketType::FromDriver, EndpointType::Client);
        let (_c2, mut c2_rx) = connect(&router, ConnectionRole::ClientData, PacketType::FromDriver, EndpointType::Client);
        let (_s, mut s_rx) = connect(&router, ConnectionRole::ClientSniffer, PacketType::Unknown, EndpointType::Logger);

        // Act
        router.route(packet_from(&instrument, b"sample"));

        // Assert
        assert_eq!(c1_rx.try_recv().unwrap(), b"sample".to_vec());
        assert_eq!(c2_rx.try_recv().unwrap(), b"sample".to_vec());
        assert_eq!(s_rx.try_recv().unwrap(), b"sample".to_vec());
    }

    #[test]
    fn test_client_data_reaches_instrument_but_not_other_clients() {
        let router = Router::new();
        let (_instrument, mut irx) = connect(&router, ConnectionRole::InstrumentData, PacketType::FromInstrument, EndpointType::Instrument);
        let (c1, mut c1_rx) = connect(&router, ConnectionRole::ClientData, PacketType::FromDriver, EndpointType::Client);
        let (_c2, mut c2_rx) = connect(&router, ConnectionRole::ClientData, PacketType::FromDriver, EndpointType::Client);

        router.route(packet_from(&c1, b"wake\r"));

        assert_eq!(irx.try_recv().unwrap(), b"wake\r".to_vec());
        assert!(c1_rx.try_recv().is_err());
        assert!(c2_rx.try_recv().is_err());
    }

    #[test]
    fn test_digi_responses_reach_registered_command_connections() {
        // Arrange
        let router = Router::new();
        let (digi, _drx) = connect(&router, ConnectionRole::InstrumentCommand, PacketType::DigiResponse, EndpointType::Digi);
        let (cmd, mut cmd_rx) = ConnectionHandle::new(
            ConnectionRole::ClientCommand,
            EndpointConfig::new(PacketType::PortAgentCommand, EndpointType::Command),
            None,
        );
        router.register_commands(cmd.clone());
        router.endpoint_connected(cmd);

        // Act
        router.route(packet_from(&digi, b"OK\r\n"));

        // Assert: delivered once, through the registry
        assert_eq!(cmd_rx.try_recv().unwrap(), b"OK\r\n".to_vec());
        assert!(cmd_rx.try_recv().is_err());
    }

    #[test]
    fn test_commands_reach_digi_command_port() {
        let router = Router::new();
        let (_digi, mut drx) = connect(&router, ConnectionRole::InstrumentCommand, PacketType::DigiResponse, EndpointType::Digi);
        let (cmd, _crx) = connect(&router, ConnectionRole::ClientCommand, PacketType::PortAgentCommand, EndpointType::Command);

        router.route(packet_from(&cmd, b"time 2\n"));

        assert_eq!(drx.try_recv().unwrap(), b"time 2\n".to_vec());
    }

    #[test]
    fn test_sniffer_input_goes_nowhere() {
        let router = Router::new();
        let (_instrument, mut irx) = connect(&router, ConnectionRole::InstrumentData, PacketType::FromInstrument, EndpointType::Instrument);
        let (sniffer, _srx) = connect(&router, ConnectionRole::ClientSniffer, PacketType::Unknown, EndpointType::Logger);

        router.route(packet_from(&sniffer, b"noise"));

        assert!(irx.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_removes_from_endpoints_and_registry() {
        // Arrange
        let router = Router::new();
        let (cmd, _rx) = ConnectionHandle::new(
            ConnectionRole::ClientCommand,
            EndpointConfig::new(PacketType::PortAgentCommand, EndpointType::Command),
            None,
        );
        router.register_commands(cmd.clone());
        router.endpoint_connected(cmd.clone());
        assert_eq!(router.snapshot().commands, 1);

        // Act
        router.endpoint_disconnected(cmd.id(), cmd.role());

        // Assert
        let snapshot = router.snapshot();
        assert_eq!(snapshot.commands, 0);
        assert_eq!(snapshot.count(EndpointType::Command), 0);
    }

    #[test]
    fn test_digi_response_skips_closed_command_connections() {
        // Arrange: one live operator, one whose driver already finished
        let router = Router::new();
        let config = EndpointConfig::new(PacketType::PortAgentCommand, EndpointType::Command);
        let (digi, _drx) = connect(&router, ConnectionRole::InstrumentCommand, PacketType::DigiResponse, EndpointType::Digi);
        let (open, mut open_rx) = ConnectionHandle::new(ConnectionRole::ClientCommand, config, None);
        let (closed, closed_rx) = ConnectionHandle::new(ConnectionRole::ClientCommand, config, None);
        router.register_commands(open);
        router.register_commands(closed.clone());
        drop(closed_rx);

        // Act
        router.route(packet_from(&digi, b"status\n"));

        // Assert
        assert_eq!(open_rx.try_recv().unwrap(), b"status\n".to_vec());
        assert!(!closed.send(b"late".to_vec()));
    }

    #[test]
    fn test_stalled_client_does_not_block_the_others() {
        // Arrange: a client whose queue is already full
        let router = Router::new();
        let (instrument, _irx) = connect(&router, ConnectionRole::InstrumentData, PacketType::FromInstrument, EndpointType::Instrument);
        let (stalled, _stalled_rx) = connect(&router, ConnectionRole::ClientData, PacketType::FromDriver, EndpointType::Client);
        let (_live, mut live_rx) = connect(&router, ConnectionRole::ClientData, PacketType::FromDriver, EndpointType::Client);
        while stalled.send(b"backlog".to_vec()) {}

        // Act
        router.route(packet_from(&instrument, b"sample"));

        // Assert
        assert_eq!(live_rx.try_recv().unwrap(), b"sample".to_vec());
        assert!(!stalled.is_closed());
    }

    #[test]
    fn test_snapshot_counts_by_endpoint_type() {
        let router = Router::new();
        let _a = connect(&router, ConnectionRole::ClientData, PacketType::FromDriver, EndpointType::Client);
        let _b = connect(&router, ConnectionRole::ClientData, PacketType::FromDriver, EndpointType::Client);
        let _c = connect(&router, ConnectionRole::ClientSniffer, PacketType::Unknown, EndpointType::Logger);

        let snapshot = router.snapshot();

        assert_eq!(snapshot.count(EndpointType::Client), 2);
        assert_eq!(snapshot.count(EndpointType::Logger), 1);
        assert_eq!(snapshot.count(EndpointType::Instrument), 0);
    }
}
