//! Packet metadata and connection identity.
//!
//! [`PacketType`] and [`EndpointType`] are owned by the agent's routing layer.
//! Connectors and listeners receive one [`EndpointConfig`] at construction and
//! stamp it, unchanged, onto every connection they produce.  They never branch
//! on its contents.

use std::fmt;

use uuid::Uuid;

/// What a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Unknown,
    /// Bytes produced by the instrument.
    FromInstrument,
    /// Bytes written by a driver towards the instrument.
    FromDriver,
    /// A port agent command.
    PortAgentCommand,
    /// Port agent status report.
    PortAgentStatus,
    /// Port agent fault report.
    PortAgentFault,
    /// Command addressed to the terminal server.
    DigiCommand,
    /// Response from the terminal server's command port.
    DigiResponse,
    Heartbeat,
}

/// Which kind of endpoint a connection is, from the router's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointType {
    Unknown,
    /// Plain TCP instrument connection.
    Instrument,
    /// Terminal server data port.
    InstrumentData,
    /// Terminal server command port.
    Digi,
    /// Driver data connection.
    Client,
    /// Operator command connection.
    Command,
    /// Passive traffic logger.
    Logger,
}

/// The `(packet_type, endpoint_type)` pair a connector or listener is built
/// with.  Fixed for the lifetime of its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointConfig {
    pub packet_type: PacketType,
    pub endpoint_type: EndpointType,
}

impl EndpointConfig {
    pub const fn new(packet_type: PacketType, endpoint_type: EndpointType) -> Self {
        Self {
            packet_type,
            endpoint_type,
        }
    }
}

/// Unique identity of one live connection.
///
/// A fresh id is drawn for every accepted or dialled connection, so two
/// connections never share one even if they come from the same peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first group of the UUID is plenty to tell connections apart in logs.
        let full = self.0.to_string();
        f.write_str(&full[..8])
    }
}

/// A chunk of bytes read from one connection, tagged with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub endpoint_type: EndpointType,
    pub source: ConnectionId,
    pub payload: Vec<u8>,
    /// The payload is already a framed port agent packet and must be written
    /// downstream exactly as received.
    pub verbatim: bool,
}

impl Packet {
    /// Builds a packet that still needs framing downstream.
    pub fn wrap(config: EndpointConfig, source: ConnectionId, payload: Vec<u8>) -> Self {
        Self {
            packet_type: config.packet_type,
            endpoint_type: config.endpoint_type,
            source,
            payload,
            verbatim: false,
        }
    }

    /// Builds a packet whose payload is already framed.
    pub fn verbatim(config: EndpointConfig, source: ConnectionId, payload: Vec<u8>) -> Self {
        Self {
            verbatim: true,
            ..Self::wrap(config, source, payload)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
