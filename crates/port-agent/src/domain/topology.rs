//! Which connections an agent makes and which it accepts.
//!
//! A [`Topology`] is derived once from [`AgentConfig`].  It fixes, for every
//! connector and listener, the role, the protocol variant and the
//! `(packet_type, endpoint_type)` pair that will be stamped on each connection.
//!
//! | kind   | upstream                                                  |
//! |--------|-----------------------------------------------------------|
//! | `tcp`  | instrument data, `PassThrough`                            |
//! | `digi` | data port `PassThroughUnchanged`, command port `BinaryTimestampSetting` |
//!
//! Both kinds accept data, command and sniffer clients.

use std::net::SocketAddr;

use agent_core::{
    ConnectionRole, EndpointConfig, EndpointType, PacketType, ProtocolVariant, ReconnectPolicy,
};

use super::config::{AgentConfig, AgentKind, ConfigError};

/// One reconnecting outbound connection.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamSpec {
    /// `host:port` to dial.
    pub address: String,
    pub role: ConnectionRole,
    pub variant: ProtocolVariant,
    pub endpoint: EndpointConfig,
    pub policy: ReconnectPolicy,
}

/// One client-facing listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSpec {
    pub bind: SocketAddr,
    pub role: ConnectionRole,
    pub endpoint: EndpointConfig,
}

/// Everything the agent connects to and listens on.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub upstream: Vec<UpstreamSpec>,
    pub listeners: Vec<ListenerSpec>,
}

const INSTRUMENT: EndpointConfig =
    EndpointConfig::new(PacketType::FromInstrument, EndpointType::Instrument);
const INSTRUMENT_DATA: EndpointConfig =
    EndpointConfig::new(PacketType::FromInstrument, EndpointType::InstrumentData);
const DIGI_COMMAND: EndpointConfig =
    EndpointConfig::new(PacketType::DigiResponse, EndpointType::Digi);
const CLIENT_DATA: EndpointConfig =
    EndpointConfig::new(PacketType::FromDriver, EndpointType::Client);
const CLIENT_COMMAND: EndpointConfig =
    EndpointConfig::new(PacketType::PortAgentCommand, EndpointType::Command);
const CLIENT_SNIFFER: EndpointConfig =
    EndpointConfig::new(PacketType::Unknown, EndpointType::Logger);

impl Topology {
    /// Derives the topology for `config`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`AgentConfig::validate`].
    pub fn from_config(config: &AgentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = config.reconnect_policy()?;
        let ip = config.bind_ip()?;

        let upstream = match config.agent.kind {
            AgentKind::Tcp => vec![UpstreamSpec {
                address: config.instrument_address(config.instrument.data_port),
                role: ConnectionRole::InstrumentData,
                variant: ProtocolVariant::PassThrough,
                endpoint: INSTRUMENT,
                policy,
            }],
            AgentKind::Digi => vec![
                UpstreamSpec {
                    address: config.instrument_address(config.instrument.data_port),
                    role: ConnectionRole::InstrumentData,
                    variant: ProtocolVariant::PassThroughUnchanged,
                    endpoint: INSTRUMENT_DATA,
                    policy,
                },
                UpstreamSpec {
                    address: config.instrument_address(config.instrument.command_port),
                    role: ConnectionRole::InstrumentCommand,
                    variant: ProtocolVariant::BinaryTimestampSetting,
                    endpoint: DIGI_COMMAND,
                    policy,
                },
            ],
        };

        let listeners = vec![
            ListenerSpec {
                bind: SocketAddr::new(ip, config.listen.data_port),
                role: ConnectionRole::ClientData,
                endpoint: CLIENT_DATA,
            },
            ListenerSpec {
                bind: SocketAddr::new(ip, config.listen.command_port),
                role: ConnectionRole::ClientCommand,
                endpoint: CLIENT_COMMAND,
            },
            ListenerSpec {
                bind: SocketAddr::new(ip, config.listen.sniffer_port),
                role: ConnectionRole::ClientSniffer,
                endpoint: CLIENT_SNIFFER,
            },
        ];

        Ok(Self {
            upstream,
            listeners,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
