//! Construction-time errors.
//!
//! Runtime connection failures are never errors at this level: they are
//! absorbed by the connector (as a retry) or the listener (as readiness for the
//! next client).  What remains are mistakes in how the agent was wired up,
//! which must stop the process before anything starts listening.

use std::time::Duration;

use thiserror::Error;

use crate::domain::role::ConnectionRole;

/// Errors raised while building connectors, listeners or their policies.
#[derive(Debug, Error, PartialEq)]
pub enum RelayError {
    /// A role was handed to a component that has no endpoint for it.
    #[error("misconfigured role {role}: {reason}")]
    MisconfiguredRole {
        role: ConnectionRole,
        reason: &'static str,
    },

    /// The base reconnect delay must be non-zero.
    #[error("reconnect base delay must be greater than zero")]
    ZeroBaseDelay,

    /// The base reconnect delay exceeds the maximum.
    #[error("reconnect base delay {base:?} exceeds maximum delay {max:?}")]
    BaseExceedsMax { base: Duration, max: Duration },

    /// The growth factor would shrink or not be a number.
    #[error("reconnect factor must be a finite number >= 1.0, got {0}")]
    InvalidFactor(f64),
}
