//! Connection roles and the endpoint variants they resolve to.
//!
//! Every connection the agent owns or accepts serves exactly one
//! [`ConnectionRole`].  Before a connector or listener starts, its role (and,
//! for instrument connections, its [`ProtocolVariant`]) is resolved into an
//! [`EndpointKind`].  Resolution is the only place a bad role can be detected,
//! so a connector can never be started with a client role and a listener can
//! never be started with an instrument role.

use std::fmt;

use crate::error::RelayError;

/// The fixed purpose a connection serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    /// Outbound connection to the instrument's command port.
    InstrumentCommand,
    /// Outbound connection to the instrument's data port.
    InstrumentData,
    /// Inbound driver connection exchanging instrument data.
    ClientData,
    /// Inbound connection carrying port agent commands.
    ClientCommand,
    /// Inbound passive connection that observes traffic.
    ClientSniffer,
}

impl ConnectionRole {
    /// Returns `true` for the roles the agent dials out to.
    pub fn is_upstream(self) -> bool {
        matches!(
            self,
            ConnectionRole::InstrumentCommand | ConnectionRole::InstrumentData
        )
    }

    /// Short, stable name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionRole::InstrumentCommand => "instrument-command",
            ConnectionRole::InstrumentData => "instrument-data",
            ConnectionRole::ClientData => "client-data",
            ConnectionRole::ClientCommand => "client-command",
            ConnectionRole::ClientSniffer => "client-sniffer",
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour of an upstream instrument endpoint.
///
/// Chosen once when the connector is built.  All three share the connector's
/// reconnect policy; none of them changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVariant {
    /// Raw instrument bytes are wrapped as packets of the configured type.
    #[default]
    PassThrough,
    /// Like `PassThrough`, but asks the terminal server to emit binary
    /// timestamps as soon as the connection is made.
    BinaryTimestampSetting,
    /// The upstream already speaks port agent packets; bytes are forwarded
    /// verbatim.
    PassThroughUnchanged,
}

/// A role resolved into the endpoint implementation that serves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Upstream instrument connection using the given variant.
    Instrument {
        role: ConnectionRole,
        variant: ProtocolVariant,
    },
    /// Downstream data client.
    ClientData,
    /// Downstream command client.
    ClientCommand,
    /// Downstream passive sniffer.
    ClientSniffer,
}

impl EndpointKind {
    /// Resolves the endpoint for an outbound (reconnecting) connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MisconfiguredRole`] if `role` is a client role.
    pub fn upstream(role: ConnectionRole, variant: ProtocolVariant) -> Result<Self, RelayError> {
        if role.is_upstream() {
            Ok(EndpointKind::Instrument { role, variant })
        } else {
            Err(RelayError::MisconfiguredRole {
                role,
                reason: "client roles cannot be dialled by a reconnecting connector",
            })
        }
    }

    /// Resolves the endpoint for an inbound (accepted) connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MisconfiguredRole`] if `role` is an instrument
    /// role.
    pub fn downstream(role: ConnectionRole) -> Result<Self, RelayError> {
        match role {
            ConnectionRole::ClientData => Ok(EndpointKind::ClientData),
            ConnectionRole::ClientCommand => Ok(EndpointKind::ClientCommand),
            ConnectionRole::ClientSniffer => Ok(EndpointKind::ClientSniffer),
            ConnectionRole::InstrumentCommand | ConnectionRole::InstrumentData => {
                Err(RelayError::MisconfiguredRole {
                    role,
                    reason: "instrument roles are dialled, never accepted",
                })
            }
        }
    }

    /// The role this endpoint serves.
    pub fn role(self) -> ConnectionRole {
        match self {
            EndpointKind::Instrument { role, .. } => role,
            EndpointKind::ClientData => ConnectionRole::ClientData,
            EndpointKind::ClientCommand => ConnectionRole::ClientCommand,
            EndpointKind::ClientSniffer => ConnectionRole::ClientSniffer,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
