//! Domain layer for port-agent.
//!
//! Plain configuration types and the topology derived from them.  No sockets,
//! no tasks, no environment reads.

pub mod config;
pub mod topology;

pub use config::{AgentConfig, AgentKind, ConfigError};
pub use topology::{ListenerSpec, Topology, UpstreamSpec};
