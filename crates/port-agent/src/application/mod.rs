//! Application layer for port-agent.
//!
//! Knows *what* happens to a connection's bytes, never *how* they reach a
//! socket.
//!
//! # Responsibilities
//!
//! - The [`PortAgent`] seam and the [`ConnectionHandle`] passed across it
//! - One endpoint protocol per role / variant
//! - The in-process [`Router`]
//!
//! # What does NOT belong here?
//!
//! - Listening, dialling or reconnect timers (infrastructure)
//! - Reading configuration files (domain + `main.rs`)

pub mod endpoint;
pub mod port_agent;
pub mod router;

pub use endpoint::{build_connection, BinderStats, Connection, EndpointProtocol, BINARY_TIMESTAMP_COMMAND};
pub use port_agent::{ConnectionHandle, PortAgent, WeakConnection, OUTBOUND_QUEUE_CAPACITY};
pub use router::{Router, RouterSnapshot};
